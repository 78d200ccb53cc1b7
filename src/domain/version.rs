//! Version normalization and ordering.
//!
//! Mod version strings in the wild carry decorations that must not affect
//! identity or ordering: a leading `v`, build metadata after `+`, a
//! trailing Minecraft version tag, a trailing loader tag and `-bN` build
//! counters. Comparison happens over the normalized form.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static MC_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(mc)?1\.\d+(\.\d+)?$").unwrap());
static BUILD_TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-b\d+$").unwrap());

const LOADER_TAGS: &[&str] = &[
    "fabric", "forge", "neoforge", "quilt", "paper", "spigot", "bukkit",
];

/// Normalizes a version string for identity checks and comparison.
/// Idempotent: normalizing an already-normalized string is a no-op.
pub fn normalize_version(raw: &str) -> String {
    let mut s = raw.trim().to_lowercase();
    s = s.trim_start_matches('v').to_string();
    if let Some(idx) = s.find('+') {
        s.truncate(idx);
    }
    loop {
        let before = s.clone();
        s = MC_TAG_RE.replace(&s, "").into_owned();
        s = BUILD_TAG_RE.replace(&s, "").into_owned();
        for tag in LOADER_TAGS {
            if let Some(stripped) = s.strip_suffix(&format!("-{tag}")) {
                s = stripped.to_string();
            }
        }
        if s == before {
            break;
        }
    }
    s
}

/// Normalizes a filename-derived slug candidate for alias lookup and
/// catalog search. Idempotent.
pub fn normalize_candidate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_dash = true;
    for c in raw.trim().to_lowercase().chars() {
        let mapped = match c {
            ' ' | '_' | '-' | '+' => '-',
            c if c.is_alphanumeric() || c == '.' => c,
            _ => continue,
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        out.push(mapped);
    }
    out.trim_end_matches('-').to_string()
}

/// Total order over normalized version strings.
///
/// The normalized string is split into segments; segments are compared
/// pairwise by their dot-separated integer components. Missing
/// positions compare as 0, non-numeric components as -1, so a
/// `-rc`-style suffix sorts below the bare release it decorates.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = normalize_version(a);
    let b = normalize_version(b);
    let sa = segments(&a);
    let sb = segments(&b);
    for i in 0..sa.len().max(sb.len()) {
        let ord = compare_segment(sa.get(i).copied().unwrap_or(""), sb.get(i).copied().unwrap_or(""));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// True when `target` is strictly newer than `installed`.
pub fn is_newer(target: &str, installed: &str) -> bool {
    compare_versions(target, installed) == Ordering::Greater
}

// Segments are maximal alphanumeric-or-dot runs. Keeping letter runs as
// segments (rather than treating them as delimiter noise) is what makes
// "1.2.3-rc" compare below "1.2.3": the "rc" segment's component parses
// as -1 against the missing segment's 0.
fn segments(s: &str) -> Vec<&str> {
    s.split(|c: char| !c.is_ascii_alphanumeric() && c != '.')
        .filter(|seg| !seg.is_empty())
        .collect()
}

fn compare_segment(a: &str, b: &str) -> Ordering {
    let ac: Vec<&str> = a.split('.').collect();
    let bc: Vec<&str> = b.split('.').collect();
    for i in 0..ac.len().max(bc.len()) {
        let av = component(ac.get(i).copied());
        let bv = component(bc.get(i).copied());
        if av != bv {
            return av.cmp(&bv);
        }
    }
    Ordering::Equal
}

fn component(c: Option<&str>) -> i64 {
    match c {
        None => 0,
        Some("") => 0,
        Some(c) => c.parse().unwrap_or(-1),
    }
}
