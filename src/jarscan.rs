//! Mod identity extraction from jar files.
//!
//! Two sources, in increasing cost: the filename (token heuristics) and
//! the archive itself (loader manifests). Archive metadata takes
//! precedence over filename guesses when both are available.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::sync::LazyLock;

use regex::Regex;
use zip::ZipArchive;

use crate::domain::loader::Loader;
use crate::domain::mod_entry::Channel;

static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^v?\d+(\.\d+){1,3}.*$").unwrap());
static MC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^1\.\d+(\.\d+)?$").unwrap());
static MOD_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"modId\s*=\s*"([^"]+)""#).unwrap());
static TOML_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"version\s*=\s*"([^"]+)""#).unwrap());

/// Identity guessed from a jar filename.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFilename {
    pub slug: Option<String>,
    pub version: Option<String>,
    pub mc_version: Option<String>,
    pub loader: Option<Loader>,
    pub channel: Option<Channel>,
}

impl ParsedFilename {
    /// First segment of the slug, a decent guess at the project id.
    pub fn id(&self) -> Option<&str> {
        self.slug.as_deref().and_then(|s| s.split('-').next())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenClass {
    Semver,
    McVersion,
    McPrefixed,
    LoaderWord(Loader),
    ChannelWord(Channel),
    Word,
}

fn classify(token: &str) -> TokenClass {
    if MC_RE.is_match(token) {
        return TokenClass::McVersion;
    }
    if let Some(rest) = token.strip_prefix("mc")
        && MC_RE.is_match(rest)
    {
        return TokenClass::McPrefixed;
    }
    if SEMVER_RE.is_match(token) {
        return TokenClass::Semver;
    }
    if let Some(loader) = Loader::parse(token) {
        return TokenClass::LoaderWord(loader);
    }
    if let Some(channel) = Channel::parse(token) {
        return TokenClass::ChannelWord(channel);
    }
    TokenClass::Word
}

/// Parses a jar filename into slug, version, Minecraft version, loader
/// and channel guesses.
pub fn parse_filename(name: &str) -> ParsedFilename {
    let lowered = name.to_lowercase();
    let stem = lowered.strip_suffix(".jar").unwrap_or(&lowered);
    let cleaned: String = stem.chars().filter(|c| !"[](){}".contains(*c)).collect();
    let parts: Vec<&str> = cleaned
        .split(['-', '_', '+'])
        .filter(|p| !p.is_empty())
        .collect();
    let classes: Vec<TokenClass> = parts.iter().map(|p| classify(p)).collect();

    let mut parsed = ParsedFilename::default();
    for class in &classes {
        match class {
            TokenClass::LoaderWord(l) if parsed.loader.is_none() => parsed.loader = Some(*l),
            TokenClass::ChannelWord(c) if parsed.channel.is_none() => parsed.channel = Some(*c),
            _ => {}
        }
    }

    // Version candidates: anything semver-shaped, including plain MC
    // versions. The chosen version is the last candidate unless it reads
    // as a Minecraft version, in which case the previous one wins.
    let candidates: Vec<usize> = classes
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            matches!(
                c,
                TokenClass::Semver | TokenClass::McVersion | TokenClass::McPrefixed
            )
        })
        .map(|(i, _)| i)
        .collect();

    let is_mc = |idx: usize| {
        matches!(
            classes[idx],
            TokenClass::McVersion | TokenClass::McPrefixed
        )
    };

    let version_idx = match candidates.last() {
        Some(&last) if !is_mc(last) => Some(last),
        Some(_) => candidates
            .iter()
            .rev()
            .skip(1)
            .copied()
            .find(|&idx| !is_mc(idx)),
        None => None,
    };
    parsed.version = version_idx.map(|idx| parts[idx].to_string());

    parsed.mc_version = candidates
        .iter()
        .filter(|&&idx| Some(idx) != version_idx && is_mc(idx))
        .map(|&idx| match classes[idx] {
            TokenClass::McPrefixed => parts[idx].trim_start_matches("mc").to_string(),
            _ => parts[idx].to_string(),
        })
        .next();

    let boundary = version_idx
        .or_else(|| candidates.first().copied())
        .unwrap_or(parts.len());
    let slug_parts: Vec<&str> = parts[..boundary]
        .iter()
        .zip(&classes[..boundary])
        .filter(|(_, class)| matches!(class, TokenClass::Word))
        .map(|(part, _)| *part)
        .collect();
    if !slug_parts.is_empty() {
        parsed.slug = Some(slug_parts.join("-"));
    }

    parsed
}

/// Identity read from the archive's loader manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMeta {
    pub slug: Option<String>,
    pub version: Option<String>,
    pub loader: Option<Loader>,
}

/// Deep scan: opens the jar as a zip and reads whichever loader manifest
/// is present. Returns `None` when the bytes are not a readable archive
/// or no manifest was recognized.
pub fn scan_archive(bytes: &[u8]) -> Option<ArchiveMeta> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).ok()?;

    for (entry, loader) in [
        ("fabric.mod.json", Loader::Fabric),
        ("quilt.mod.json", Loader::Quilt),
    ] {
        if let Some(text) = read_entry(&mut archive, entry) {
            let json: serde_json::Value = serde_json::from_str(&text).ok()?;
            // Quilt nests its identity under `quilt_loader`.
            let root = json.get("quilt_loader").unwrap_or(&json);
            return Some(ArchiveMeta {
                slug: root.get("id").and_then(|v| v.as_str()).map(str::to_string),
                version: root
                    .get("version")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                loader: Some(loader),
            });
        }
    }

    for (entry, loader) in [
        ("META-INF/mods.toml", Loader::Forge),
        ("META-INF/neoforge.mods.toml", Loader::Neoforge),
    ] {
        if let Some(text) = read_entry(&mut archive, entry) {
            let slug = MOD_ID_RE
                .captures(&text)
                .map(|c| c[1].to_string());
            let version = TOML_VERSION_RE
                .captures(&text)
                .map(|c| c[1].to_string())
                // Unexpanded build placeholders are not versions.
                .filter(|v| !v.contains("${"));
            return Some(ArchiveMeta {
                slug,
                version,
                loader: Some(loader),
            });
        }
    }

    if read_entry(&mut archive, "pack.mcmeta").is_some() {
        return Some(ArchiveMeta {
            slug: None,
            version: None,
            loader: Some(Loader::Resourcepack),
        });
    }

    None
}

fn read_entry(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Option<String> {
    let mut file = archive.by_name(name).ok()?;
    let mut text = String::new();
    file.read_to_string(&mut text).ok()?;
    Some(text)
}

/// Alphanumeric token set of a filename, for similarity scoring.
pub fn alnum_tokens(s: &str) -> HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Jaccard similarity of two token sets.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use claims::{assert_none, assert_some, assert_some_eq};
    use zip::write::SimpleFileOptions;

    use super::*;

    #[test]
    fn filename_with_version_and_mc_tag() {
        let parsed = parse_filename("NoChatReports-1.20.1-v2.2.2.jar");
        assert_some_eq!(parsed.slug.as_deref(), "nochatreports");
        assert_some_eq!(parsed.version.as_deref(), "v2.2.2");
        assert_some_eq!(parsed.mc_version.as_deref(), "1.20.1");
    }

    #[test]
    fn filename_with_only_mc_version_has_no_version() {
        let parsed = parse_filename("pandaantispam-1.20.1-fabric.jar");
        assert_some_eq!(parsed.slug.as_deref(), "pandaantispam");
        assert_none!(parsed.version);
        assert_some_eq!(parsed.mc_version.as_deref(), "1.20.1");
        assert_some_eq!(parsed.loader, Loader::Fabric);
    }

    #[test]
    fn mc_prefixed_tags_are_recognized() {
        let parsed = parse_filename("sodium-fabric-0.5.8+mc1.20.1.jar");
        assert_some_eq!(parsed.slug.as_deref(), "sodium");
        assert_some_eq!(parsed.version.as_deref(), "0.5.8");
        assert_some_eq!(parsed.mc_version.as_deref(), "1.20.1");
        assert_some_eq!(parsed.loader, Loader::Fabric);
    }

    #[test]
    fn channel_words_are_captured() {
        let parsed = parse_filename("create-beta-0.5.1.jar");
        assert_some_eq!(parsed.slug.as_deref(), "create");
        assert_some_eq!(parsed.channel, Channel::Beta);
        assert_some_eq!(parsed.version.as_deref(), "0.5.1");
    }

    #[test]
    fn brackets_are_dropped() {
        let parsed = parse_filename("[1.20.1]-BetterF3-7.0.2.jar");
        assert_some_eq!(parsed.slug.as_deref(), "betterf3");
        assert_some_eq!(parsed.version.as_deref(), "7.0.2");
    }

    #[test]
    fn id_is_the_first_slug_segment() {
        let parsed = parse_filename("panda-anti-spam-2.0.jar");
        assert_some_eq!(parsed.slug.as_deref(), "panda-anti-spam");
        assert_some_eq!(parsed.id(), "panda");
    }

    fn jar_with(entry: &str, content: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        let mut writer = zip::ZipWriter::new(&mut buf);
        writer
            .start_file(entry, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(content.as_bytes()).unwrap();
        writer.finish().unwrap();
        buf.into_inner()
    }

    #[test]
    fn fabric_manifest_yields_identity() {
        let bytes = jar_with(
            "fabric.mod.json",
            r#"{"id": "nochatreports", "version": "2.2.2"}"#,
        );
        let meta = assert_some!(scan_archive(&bytes));
        assert_some_eq!(meta.slug.as_deref(), "nochatreports");
        assert_some_eq!(meta.version.as_deref(), "2.2.2");
        assert_some_eq!(meta.loader, Loader::Fabric);
    }

    #[test]
    fn quilt_manifest_reads_nested_identity() {
        let bytes = jar_with(
            "quilt.mod.json",
            r#"{"quilt_loader": {"id": "ok-zoomer", "version": "5.0.0"}}"#,
        );
        let meta = assert_some!(scan_archive(&bytes));
        assert_some_eq!(meta.slug.as_deref(), "ok-zoomer");
        assert_some_eq!(meta.loader, Loader::Quilt);
    }

    #[test]
    fn forge_toml_is_regex_extracted() {
        let toml = "\n[[mods]]\nmodId = \"jei\"\nversion = \"15.2.0.27\"\n";
        let bytes = jar_with("META-INF/mods.toml", toml);
        let meta = assert_some!(scan_archive(&bytes));
        assert_some_eq!(meta.slug.as_deref(), "jei");
        assert_some_eq!(meta.version.as_deref(), "15.2.0.27");
        assert_some_eq!(meta.loader, Loader::Forge);
    }

    #[test]
    fn jar_version_placeholder_is_not_a_version() {
        let toml = "modId = \"examplemod\"\nversion = \"${file.jarVersion}\"\n";
        let bytes = jar_with("META-INF/mods.toml", toml);
        let meta = assert_some!(scan_archive(&bytes));
        assert_none!(meta.version);
    }

    #[test]
    fn pack_mcmeta_marks_resourcepack() {
        let bytes = jar_with("pack.mcmeta", r#"{"pack": {"pack_format": 15}}"#);
        let meta = assert_some!(scan_archive(&bytes));
        assert_some_eq!(meta.loader, Loader::Resourcepack);
        assert_none!(meta.slug);
    }

    #[test]
    fn garbage_bytes_are_not_an_archive() {
        assert_none!(scan_archive(b"not a zip at all"));
    }

    #[test]
    fn jaccard_similarity() {
        let a = alnum_tokens("NoChatReports-1.20.1-v2.2.2.jar");
        let b = alnum_tokens("nochatreports-fabric-1.20.1-v2.2.2.jar");
        assert!(jaccard(&a, &b) >= 0.3);

        let c = alnum_tokens("totally-different.jar");
        assert!(jaccard(&a, &c) < 0.3);
    }
}
