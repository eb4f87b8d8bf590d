//! Domain types for items moving through the conversion pipeline.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Image files are named by their slide index, e.g. `3.png`.
static IMAGE_INDEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)$").unwrap());

/// The container format of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Office Open XML package (ZIP).
    Pptx,
    /// Legacy binary presentation (OLE/CFB).
    Ppt,
}

impl SourceFormat {
    /// Detect format from file magic bytes.
    ///
    /// Melody decks often carry a `.ppt` name while being ZIP packages,
    /// so the content wins over the extension.
    pub fn from_magic(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 4 {
            return None;
        }

        // PPTX is a ZIP file (PK\x03\x04)
        if bytes.starts_with(&[0x50, 0x4B, 0x03, 0x04]) {
            return Some(Self::Pptx);
        }

        // PPT is an OLE/CFB file (D0 CF 11 E0 A1 B1 1A E1)
        if bytes.len() >= 8
            && bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1])
        {
            return Some(Self::Ppt);
        }

        None
    }
}

/// Title slide fields read from a melody deck.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Hymn name.
    pub name: String,
    /// Hymn number as printed in the hymnal.
    pub number: String,
    /// Author, composer and copyright line.
    pub credits: String,
}

impl Metadata {
    /// Build a record from raw shape text.
    ///
    /// Each field is normalized and must be non-empty afterwards.
    pub fn new(name: &str, number: &str, credits: &str) -> Result<Self> {
        let record = Self {
            name: crate::normalize::clean_field(name),
            number: crate::normalize::clean_field(number),
            credits: crate::normalize::clean_field(credits),
        };
        record.validate()?;
        Ok(record)
    }

    /// Check that every field carries text.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::MissingField("name"));
        }
        if self.number.is_empty() {
            return Err(Error::MissingField("number"));
        }
        if self.credits.is_empty() {
            return Err(Error::MissingField("credits"));
        }
        Ok(())
    }

    /// Load a record previously written with [`Metadata::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&content)?;
        record.validate()?;
        Ok(record)
    }

    /// Persist the record as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// A slide image extracted into an item's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAsset {
    /// Position of the image among the deck's image slides (1-based).
    pub index: u32,
    /// Location of the image file.
    pub path: PathBuf,
    /// Whether the cropper already rewrote this file during the run.
    pub cropped: bool,
}

impl ImageAsset {
    /// Create an asset for a freshly extracted image.
    pub fn new(index: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
            cropped: false,
        }
    }

    /// Recover an asset from a file whose stem is its slide index.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let index = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(parse_image_index)?;
        Some(Self::new(index, path))
    }
}

/// Parse the slide index encoded in an image file stem.
pub fn parse_image_index(stem: &str) -> Option<u32> {
    IMAGE_INDEX_REGEX
        .captures(stem)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Sort assets by numeric index (`1, 2, 10`, never `1, 10, 2`).
pub fn sort_images(images: &mut [ImageAsset]) {
    images.sort_by_key(|a| a.index);
}

/// How far an item has progressed through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Found by the scanner.
    Discovered,
    /// Images written to the working directory.
    Extracted,
    /// Title metadata read and persisted.
    Described,
    /// Every image cropped.
    Cropped,
    /// Output presentation written (or deliberately skipped).
    Built,
    /// A phase failed for this item; later phases ignore it.
    Failed,
}

/// One source melody deck and its intermediate state.
#[derive(Debug, Clone)]
pub struct Item {
    /// Identifier derived from the file name.
    pub id: String,
    /// Path of the source deck.
    pub source: PathBuf,
    /// Exclusive working directory inside the working root.
    pub work_dir: PathBuf,
    /// Extracted images, kept in ascending index order.
    pub images: Vec<ImageAsset>,
    /// Title fields once read.
    pub metadata: Option<Metadata>,
    /// Current pipeline stage.
    pub stage: Stage,
    /// Reason the item failed, if it did.
    pub failure: Option<String>,
}

impl Item {
    /// Create a freshly discovered item.
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            work_dir: work_dir.into(),
            images: Vec::new(),
            metadata: None,
            stage: Stage::Discovered,
            failure: None,
        }
    }

    /// Directory holding the extracted images.
    pub fn images_dir(&self) -> PathBuf {
        self.work_dir.join("images")
    }

    /// Location of the persisted metadata record.
    pub fn metadata_path(&self) -> PathBuf {
        self.work_dir.join("metadata.json")
    }

    /// Record a failure; the item drops out of later phases.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.stage = Stage::Failed;
        self.failure = Some(reason.into());
    }

    /// Whether a phase expecting `stage` should process this item.
    pub fn is_at(&self, stage: Stage) -> bool {
        self.stage == stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_magic() {
        assert_eq!(
            SourceFormat::from_magic(&[0x50, 0x4B, 0x03, 0x04, 0, 0, 0, 0]),
            Some(SourceFormat::Pptx)
        );
        assert_eq!(
            SourceFormat::from_magic(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]),
            Some(SourceFormat::Ppt)
        );
        assert_eq!(SourceFormat::from_magic(b"GIF8"), None);
        assert_eq!(SourceFormat::from_magic(b"PK"), None);
    }

    #[test]
    fn test_metadata_trims_fields() {
        let meta = Metadata::new("  Amazing Grace \n", "\t123", "John Newton  ").unwrap();
        assert_eq!(meta.name, "Amazing Grace");
        assert_eq!(meta.number, "123");
        assert_eq!(meta.credits, "John Newton");
    }

    #[test]
    fn test_metadata_rejects_blank_field() {
        let err = Metadata::new("Amazing Grace", "   ", "John Newton").unwrap_err();
        assert!(matches!(err, Error::MissingField("number")));
    }

    #[test]
    fn test_metadata_json_keys() {
        let meta = Metadata::new("Name", "1", "Credits").unwrap();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["name"], "Name");
        assert_eq!(json["number"], "1");
        assert_eq!(json["credits"], "Credits");
    }

    #[test]
    fn test_metadata_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let meta = Metadata::new("Be Thou My Vision", "450", "Irish hymn").unwrap();
        meta.save(&path).unwrap();
        assert_eq!(Metadata::load(&path).unwrap(), meta);
    }

    #[test]
    fn test_parse_image_index() {
        assert_eq!(parse_image_index("1"), Some(1));
        assert_eq!(parse_image_index("42"), Some(42));
        assert_eq!(parse_image_index("image1"), None);
        assert_eq!(parse_image_index(""), None);
    }

    #[test]
    fn test_sort_images_numeric() {
        let mut images: Vec<ImageAsset> = ["10.png", "1.png", "2.png"]
            .iter()
            .filter_map(|p| ImageAsset::from_path(*p))
            .collect();
        sort_images(&mut images);
        let order: Vec<u32> = images.iter().map(|a| a.index).collect();
        assert_eq!(order, vec![1, 2, 10]);
    }

    #[test]
    fn test_item_fail_marks_stage() {
        let mut item = Item::new("Hymn Melody", "hymns/Hymn Melody.ppt", "temp/Hymn Melody");
        assert!(item.is_at(Stage::Discovered));
        item.fail("broken");
        assert_eq!(item.stage, Stage::Failed);
        assert_eq!(item.failure.as_deref(), Some("broken"));
        assert_eq!(item.images_dir(), PathBuf::from("temp/Hymn Melody/images"));
    }
}
