//! Minecraft version inference from template variables.
//!
//! Every template variable is scored as a candidate; the best one wins.
//! Structured data (definition variables plus the server's runtime
//! values) is examined first; a raw-data fallback only applies when the
//! structured pass yields no candidate.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::clients::pufferpanel::ServerDefinition;

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^|_)(mc|minecraft)?_?version($|_)").unwrap());
static VALUE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\d+(\.\d+)?([-+][A-Za-z0-9._-]+)?$").unwrap());

/// Fallback keys consulted in raw server data when the structured pass
/// finds nothing.
const RAW_FALLBACK_KEYS: &[&str] = &["game-version", "game_version"];

/// The winning template variable: its key and current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCandidate {
    pub key: String,
    pub value: String,
}

/// Detects the active Minecraft version from a server definition and the
/// optional runtime data document.
pub fn detect_game_version(
    definition: &ServerDefinition,
    data: Option<&Value>,
) -> Option<VersionCandidate> {
    let mut best: Option<(i32, usize, VersionCandidate)> = None;

    for (key, var) in &definition.data {
        let Some(value) = runtime_value(data, key).or_else(|| scalar_ref(&var.value)) else {
            continue;
        };
        if !VALUE_RE.is_match(&value) {
            continue;
        }

        let key_match = KEY_RE.is_match(&key.to_lowercase());
        let text = format!("{} {}", var.display, var.description).to_lowercase();
        let text_match = text.contains("version");
        if !key_match && !text_match {
            continue;
        }

        let options: Vec<String> = var.options.iter().filter_map(scalar_ref).collect();
        let version_shaped_options = options.iter().any(|o| VALUE_RE.is_match(o));
        let value_in_options = options.iter().any(|o| o == &value);

        let mut score = 0;
        if key_match {
            score += 2;
        }
        if text_match {
            score += 1;
        }
        if version_shaped_options {
            score += 2;
        }
        if value_in_options {
            score += 1;
        }

        let candidate = VersionCandidate {
            key: key.clone(),
            value,
        };
        let better = match &best {
            None => true,
            Some((best_score, best_options, _)) => {
                score > *best_score || (score == *best_score && options.len() > *best_options)
            }
        };
        if better {
            best = Some((score, options.len(), candidate));
        }
    }

    if let Some((_, _, candidate)) = best {
        return Some(candidate);
    }
    raw_fallback(data)
}

fn raw_fallback(data: Option<&Value>) -> Option<VersionCandidate> {
    let data = data?;
    let root = data.get("data").unwrap_or(data);
    for key in RAW_FALLBACK_KEYS {
        let Some(entry) = root.get(key) else {
            continue;
        };
        let Some(value) = entry
            .get("value")
            .and_then(scalar_ref)
            .or_else(|| scalar_ref(entry))
        else {
            continue;
        };
        if VALUE_RE.is_match(&value) {
            return Some(VersionCandidate {
                key: key.to_string(),
                value,
            });
        }
    }
    None
}

fn runtime_value(data: Option<&Value>, key: &str) -> Option<String> {
    let data = data?;
    let root = data.get("data").unwrap_or(data);
    let entry = root.get(key)?;
    entry
        .get("value")
        .and_then(scalar_ref)
        .or_else(|| scalar_ref(entry))
}

fn scalar_ref(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use claims::{assert_none, assert_some};
    use serde_json::json;

    use crate::clients::pufferpanel::VariableDef;

    use super::*;

    fn definition_with(vars: Vec<(&str, VariableDef)>) -> ServerDefinition {
        ServerDefinition {
            data: vars
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<HashMap<_, _>>(),
            ..ServerDefinition::default()
        }
    }

    #[test]
    fn picks_the_runtime_value_of_the_version_variable() {
        let definition = definition_with(vec![(
            "MC_VERSION",
            VariableDef {
                display: "Minecraft Version".into(),
                options: vec![json!("1.20.1"), json!("1.21")],
                ..VariableDef::default()
            },
        )]);
        let data = json!({"data": {"MC_VERSION": {"value": "1.20.1"}}});

        let candidate = assert_some!(detect_game_version(&definition, Some(&data)));
        assert_eq!(candidate.key, "MC_VERSION");
        assert_eq!(candidate.value, "1.20.1");
    }

    #[test]
    fn falls_back_to_the_definition_default() {
        let definition = definition_with(vec![(
            "VERSION",
            VariableDef {
                value: json!("1.19.4"),
                ..VariableDef::default()
            },
        )]);
        let candidate = assert_some!(detect_game_version(&definition, None));
        assert_eq!(candidate.key, "VERSION");
        assert_eq!(candidate.value, "1.19.4");
    }

    #[test]
    fn non_version_shaped_values_are_skipped() {
        let definition = definition_with(vec![(
            "VERSION",
            VariableDef {
                value: json!("latest"),
                ..VariableDef::default()
            },
        )]);
        assert_none!(detect_game_version(&definition, None));
    }

    #[test]
    fn key_pattern_beats_text_only_matches() {
        let definition = definition_with(vec![
            (
                "GAME_BUILD",
                VariableDef {
                    display: "Build version".into(),
                    value: json!("17.0"),
                    ..VariableDef::default()
                },
            ),
            (
                "MC_VERSION",
                VariableDef {
                    value: json!("1.20.4"),
                    ..VariableDef::default()
                },
            ),
        ]);
        let candidate = assert_some!(detect_game_version(&definition, None));
        assert_eq!(candidate.key, "MC_VERSION");
    }

    #[test]
    fn ties_break_on_option_count() {
        let definition = definition_with(vec![
            (
                "VERSION",
                VariableDef {
                    value: json!("1.20.1"),
                    options: vec![json!("1.20.1")],
                    ..VariableDef::default()
                },
            ),
            (
                "MC_VERSION",
                VariableDef {
                    value: json!("1.20.1"),
                    options: vec![json!("1.20.1"), json!("1.21"), json!("1.19.4")],
                    ..VariableDef::default()
                },
            ),
        ]);
        let candidate = assert_some!(detect_game_version(&definition, None));
        assert_eq!(candidate.key, "MC_VERSION");
    }

    #[test]
    fn raw_fallback_reads_the_known_key() {
        let definition = definition_with(vec![]);
        let data = json!({"data": {"game-version": {"value": "1.20.1"}}});
        let candidate = assert_some!(detect_game_version(&definition, Some(&data)));
        assert_eq!(candidate.key, "game-version");
        assert_eq!(candidate.value, "1.20.1");
    }
}
