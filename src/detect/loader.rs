//! Loader inference from server template definitions.
//!
//! The detector builds a haystack from the definition's display strings,
//! install steps and run command, then scans it for known loader tokens
//! longest-first. Matched spans are masked so that `neoforge` cannot also
//! count as a `forge` hit. One distinct hit wins; several distinct hits
//! are a conflict and leave the loader unknown.

use serde_json::Value;
use strum::IntoEnumIterator;

use crate::domain::loader::Loader;

/// Where the winning token was found, for telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
	Display,
	InstallType,
	InstallCommand,
	InstallMove,
	RunCommand,
}

impl DetectionSource {
	pub fn as_str(self) -> &'static str {
		match self {
			DetectionSource::Display => "display",
			DetectionSource::InstallType => "install.type",
			DetectionSource::InstallCommand => "install.command",
			DetectionSource::InstallMove => "install.move",
			DetectionSource::RunCommand => "run.command",
		}
	}
}

/// Outcome of a detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderDetection {
	Detected {
		loader: Loader,
		source: DetectionSource,
	},
	Unknown {
		reasons: Vec<&'static str>,
	},
	Conflict {
		loaders: Vec<Loader>,
	},
}

/// Minimal alias table for template spellings that differ from the
/// canonical loader ids.
const ALIASES: &[(&str, Loader)] = &[
	("fabricdl", Loader::Fabric),
	("neo-forge", Loader::Neoforge),
	("spongeforge", Loader::Forge),
];

fn token_table() -> Vec<(String, Loader)> {
	let mut tokens: Vec<(String, Loader)> = Vec::new();
	for loader in Loader::iter() {
		tokens.push((loader.id().to_string(), loader));
		let display = normalize(loader.display_name());
		if display != loader.id() {
			tokens.push((display, loader));
		}
	}
	for (alias, loader) in ALIASES {
		tokens.push((normalize(alias), *loader));
	}
	// Longest first, so specific tokens win before their substrings.
	tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
	tokens
}

/// Lowercases and strips spaces, hyphens and underscores so display
/// spellings like "Neo Forge" line up with their ids.
fn normalize(s: &str) -> String {
	s.to_lowercase()
		.chars()
		.filter(|c| !matches!(c, ' ' | '-' | '_'))
		.collect()
}

struct Haystack {
	pieces: Vec<(DetectionSource, String)>,
}

impl Haystack {
	fn from_raw(raw: &Value) -> Self {
		let mut pieces = Vec::new();
		let mut push = |source: DetectionSource, text: Option<&str>| {
			if let Some(text) = text.filter(|t| !t.is_empty()) {
				pieces.push((source, normalize(text)));
			}
		};

		push(DetectionSource::Display, raw.get("display").and_then(Value::as_str));
		push(
			DetectionSource::Display,
			raw.pointer("/environment/display").and_then(Value::as_str),
		);
		push(DetectionSource::Display, raw.get("type").and_then(Value::as_str));
		push(
			DetectionSource::Display,
			raw.pointer("/environment/type").and_then(Value::as_str),
		);
		if let Some(vars) = raw.get("data").and_then(Value::as_object) {
			for var in vars.values() {
				push(
					DetectionSource::Display,
					var.get("display").and_then(Value::as_str),
				);
			}
		}

		if let Some(steps) = raw.get("install").and_then(Value::as_array) {
			for step in steps {
				push(
					DetectionSource::InstallType,
					step.get("type").and_then(Value::as_str),
				);
				if let Some(commands) = step.get("commands").and_then(Value::as_array) {
					for command in commands {
						push(DetectionSource::InstallCommand, command.as_str());
					}
				}
				push(
					DetectionSource::InstallMove,
					step.get("target").and_then(Value::as_str),
				);
			}
		}

		match raw.pointer("/run/command") {
			Some(Value::String(command)) => {
				pieces.push((DetectionSource::RunCommand, normalize(command)));
			}
			Some(Value::Array(parts)) => {
				for part in parts {
					push(DetectionSource::RunCommand, part.as_str());
				}
			}
			_ => {}
		}

		Self { pieces }
	}

	fn has(&self, source_filter: fn(DetectionSource) -> bool) -> bool {
		self.pieces.iter().any(|(s, _)| source_filter(*s))
	}
}

/// Scans a raw server definition for loader tokens.
pub fn detect_loader(raw: Option<&Value>) -> LoaderDetection {
	let Some(raw) = raw else {
		return LoaderDetection::Unknown {
			reasons: vec!["no_definition"],
		};
	};
	let haystack = Haystack::from_raw(raw);
	let tokens = token_table();

	let mut hits: Vec<(Loader, DetectionSource)> = Vec::new();
	for (source, piece) in &haystack.pieces {
		let mut masked = piece.clone();
		for (token, loader) in &tokens {
			if masked.contains(token.as_str()) {
				masked = masked.replace(token.as_str(), "\u{0}");
				if !hits.iter().any(|(l, _)| l == loader) {
					hits.push((*loader, *source));
				}
			}
		}
	}

	match hits.len() {
		0 => LoaderDetection::Unknown {
			reasons: unknown_reasons(&haystack),
		},
		1 => LoaderDetection::Detected {
			loader: hits[0].0,
			source: hits[0].1,
		},
		_ => LoaderDetection::Conflict {
			loaders: hits.into_iter().map(|(l, _)| l).collect(),
		},
	}
}

fn unknown_reasons(haystack: &Haystack) -> Vec<&'static str> {
	let mut reasons = Vec::new();
	if haystack.has(|s| s == DetectionSource::Display) {
		reasons.push("no_display_token");
	} else {
		reasons.push("no_display");
	}
	if !haystack.has(|s| {
		matches!(
			s,
			DetectionSource::InstallType
				| DetectionSource::InstallCommand
				| DetectionSource::InstallMove
		)
	}) {
		reasons.push("no_install_hint");
	}
	if haystack.has(|s| s == DetectionSource::RunCommand) {
		reasons.push("no_run_command_hint");
	} else {
		reasons.push("no_run_command");
	}
	reasons
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn install_step_type_wins_when_display_is_generic() {
		let raw = json!({
			"environment": {"display": "Minecraft Java"},
			"install": [{"type": "fabricdl"}]
		});
		let detection = detect_loader(Some(&raw));
		assert_eq!(
			detection,
			LoaderDetection::Detected {
				loader: Loader::Fabric,
				source: DetectionSource::InstallType,
			}
		);
	}

	#[test]
	fn neoforge_display_does_not_double_count_as_forge() {
		let raw = json!({"display": "Neo Forge Server"});
		let detection = detect_loader(Some(&raw));
		assert_eq!(
			detection,
			LoaderDetection::Detected {
				loader: Loader::Neoforge,
				source: DetectionSource::Display,
			}
		);
	}

	#[test]
	fn distinct_tokens_conflict() {
		let raw = json!({
			"display": "Neo Forge Server",
			"install": [{"type": "fabricdl"}]
		});
		match detect_loader(Some(&raw)) {
			LoaderDetection::Conflict { loaders } => {
				assert!(loaders.contains(&Loader::Neoforge));
				assert!(loaders.contains(&Loader::Fabric));
			}
			other => panic!("expected conflict, got {other:?}"),
		}
	}

	#[test]
	fn run_command_is_scanned() {
		let raw = json!({
			"run": {"command": "java -jar paper-1.20.1.jar nogui"}
		});
		let detection = detect_loader(Some(&raw));
		assert_eq!(
			detection,
			LoaderDetection::Detected {
				loader: Loader::Paper,
				source: DetectionSource::RunCommand,
			}
		);
	}

	#[test]
	fn missing_definition_reports_reason() {
		assert_eq!(
			detect_loader(None),
			LoaderDetection::Unknown {
				reasons: vec!["no_definition"]
			}
		);
	}

	#[test]
	fn vanilla_template_reports_all_missing_hints() {
		let raw = json!({"display": "Vanilla Minecraft"});
		match detect_loader(Some(&raw)) {
			LoaderDetection::Unknown { reasons } => {
				assert!(reasons.contains(&"no_display_token"));
				assert!(reasons.contains(&"no_install_hint"));
				assert!(reasons.contains(&"no_run_command"));
			}
			other => panic!("expected unknown, got {other:?}"),
		}
	}

	#[test]
	fn variable_displays_contribute() {
		let raw = json!({
			"data": {"LOADER_VER": {"display": "Quilt Loader Version"}}
		});
		let detection = detect_loader(Some(&raw));
		assert_eq!(
			detection,
			LoaderDetection::Detected {
				loader: Loader::Quilt,
				source: DetectionSource::Display,
			}
		);
	}
}
