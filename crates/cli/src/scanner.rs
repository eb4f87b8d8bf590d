//! Source discovery.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use wide_core::Result;

/// Which files in the input tree are melody decks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRules {
    /// Substring the file name must contain.
    pub marker: String,
    /// Accepted extensions, compared case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for ScanRules {
    fn default() -> Self {
        Self {
            marker: "Melody".to_string(),
            extensions: vec!["ppt".to_string(), "pptx".to_string()],
        }
    }
}

impl ScanRules {
    /// Create rules matching `*Melody*.ppt` and `*Melody*.pptx`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a different file name marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    /// Whether `path` names an eligible source file.
    pub fn is_eligible(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        name.contains(&self.marker) && self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Walk `input` and map item identifiers (file stems) to source paths.
///
/// When two files share a stem, the first one in walk order is kept.
pub fn scan(input: &Path, rules: &ScanRules) -> Result<BTreeMap<String, PathBuf>> {
    let mut sources: BTreeMap<String, PathBuf> = BTreeMap::new();

    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() || !rules.is_eligible(entry.path()) {
            continue;
        }
        let Some(id) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            log::warn!("Skipping non UTF-8 file name: {}", entry.path().display());
            continue;
        };

        if let Some(existing) = sources.get(id) {
            log::warn!(
                "Ignoring {}: '{}' already found at {}",
                entry.path().display(),
                id,
                existing.display()
            );
            continue;
        }
        log::debug!("Found {}", entry.path().display());
        sources.insert(id.to_string(), entry.path().to_path_buf());
    }

    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_is_eligible() {
        let rules = ScanRules::default();
        assert!(rules.is_eligible(Path::new("hymns/001 Holy Melody.ppt")));
        assert!(rules.is_eligible(Path::new("hymns/001 Holy Melody.PPTX")));
        assert!(!rules.is_eligible(Path::new("hymns/001 Holy Lyrics.ppt")));
        assert!(!rules.is_eligible(Path::new("hymns/001 Holy Melody.pdf")));
        assert!(!rules.is_eligible(Path::new("hymns/Melody")));
    }

    #[test]
    fn test_scan_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("A-M");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("002 Be Still Melody.ppt"), b"").unwrap();
        fs::write(nested.join("001 Amazing Grace Melody.pptx"), b"").unwrap();
        fs::write(nested.join("001 Amazing Grace Lyrics.pptx"), b"").unwrap();
        fs::write(nested.join("notes.txt"), b"").unwrap();

        let found = scan(dir.path(), &ScanRules::default()).unwrap();
        let ids: Vec<&str> = found.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["001 Amazing Grace Melody", "002 Be Still Melody"]);
        assert_eq!(
            found["001 Amazing Grace Melody"],
            nested.join("001 Amazing Grace Melody.pptx")
        );
    }

    #[test]
    fn test_scan_duplicate_stem_keeps_first() {
        let dir = tempfile::tempdir().unwrap();
        for sub in ["a", "b"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        fs::write(dir.path().join("a/010 Rock of Ages Melody.ppt"), b"").unwrap();
        fs::write(dir.path().join("b/010 Rock of Ages Melody.pptx"), b"").unwrap();

        let found = scan(dir.path(), &ScanRules::default()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(
            found["010 Rock of Ages Melody"],
            dir.path().join("a/010 Rock of Ages Melody.ppt")
        );
    }

    #[test]
    fn test_scan_custom_marker() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Hymn Tune.pptx"), b"").unwrap();
        fs::write(dir.path().join("Hymn Melody.pptx"), b"").unwrap();

        let found = scan(dir.path(), &ScanRules::new().with_marker("Tune")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("Hymn Tune"));
    }

    #[test]
    fn test_scan_missing_directory_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(&dir.path().join("nope"), &ScanRules::default()).is_err());
    }
}
