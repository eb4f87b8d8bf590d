//! Run-scoped scratch directory.

use std::path::{Path, PathBuf};
use wide_core::Result;

/// Working root holding one exclusive directory per item.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create an empty working root, discarding whatever a previous
    /// (possibly interrupted) run left behind.
    pub fn fresh(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() {
            log::info!("Removing stale working directory {}", root.display());
            std::fs::remove_dir_all(&root)?;
        }
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Location of the working root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory reserved for `id`.
    pub fn item_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Remove the directory of one item, if it exists.
    pub fn remove_item(&self, id: &str) -> Result<()> {
        let dir = self.item_dir(id);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Delete the working root and everything in it.
    pub fn remove(self) -> Result<()> {
        if self.root.exists() {
            std::fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_discards_stale_state() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("temp");
        std::fs::create_dir_all(root.join("old item/images")).unwrap();
        std::fs::write(root.join("old item/images/1.png"), b"stale").unwrap();

        let workspace = Workspace::fresh(&root).unwrap();
        assert!(workspace.root().exists());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::fresh(dir.path().join("temp")).unwrap();
        let item = workspace.item_dir("Hymn Melody");
        std::fs::create_dir_all(&item).unwrap();

        workspace.remove_item("Hymn Melody").unwrap();
        assert!(!item.exists());
        workspace.remove_item("never created").unwrap();

        let root = workspace.root().to_path_buf();
        workspace.remove().unwrap();
        assert!(!root.exists());
    }
}
