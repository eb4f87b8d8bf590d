//! Batch orchestration.
//!
//! Every phase runs over the whole batch before the next one starts. Items
//! carry their stage, so a phase only picks up items the previous phase
//! finished, and an item that failed drops out of the rest of the run.

use crate::progress::phase_bar;
use crate::scanner::{scan, ScanRules};
use crate::workspace::Workspace;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use wide_core::{crop_image, CropConfig, CropOutcome, Error, Item, Metadata, Result, Stage};
use wide_pptx::{PptxReader, PresentationBuilder, TitleLayout};

/// Suffix appended to the item id for output files.
pub const OUTPUT_SUFFIX: &str = "_wide.pptx";

/// What to do when an output file already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OverwritePolicy {
    /// Replace the existing file.
    #[default]
    Overwrite,
    /// Keep the existing file and skip the item.
    Skip,
    /// Fail the item.
    Error,
}

/// What to do when an item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure, skip the item, finish the batch.
    #[default]
    Continue,
    /// Stop the batch at the first failure.
    Abort,
}

/// Everything a run needs to know.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub work_dir: PathBuf,
    pub scan: ScanRules,
    pub crop: CropConfig,
    pub layout: TitleLayout,
    pub overwrite: OverwritePolicy,
    pub failure: FailurePolicy,
    /// Leave the working root in place after the run.
    pub keep_work: bool,
    /// Hide progress bars.
    pub quiet: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("hymns"),
            output_dir: PathBuf::from("out"),
            work_dir: PathBuf::from("temp"),
            scan: ScanRules::default(),
            crop: CropConfig::default(),
            layout: TitleLayout::default(),
            overwrite: OverwritePolicy::default(),
            failure: FailurePolicy::default(),
            keep_work: false,
            quiet: false,
        }
    }
}

impl PipelineConfig {
    /// Config with all directories below `base`.
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            input_dir: base.join("hymns"),
            output_dir: base.join("out"),
            work_dir: base.join("temp"),
            ..Self::default()
        }
    }
}

/// Outcome of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Output files written.
    pub converted: Vec<PathBuf>,
    /// Items left alone because their output already existed.
    pub skipped: Vec<String>,
    /// Items that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    /// Whether every item was converted or deliberately skipped.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Output location for an item.
pub fn output_path(output_dir: &Path, id: &str) -> PathBuf {
    output_dir.join(format!("{}{}", id, OUTPUT_SUFFIX))
}

/// Check the run's directories.
///
/// Creates the output directory. A missing input directory is created
/// empty and reported as [`Error::MissingInputDirectory`], since there is
/// nothing to convert yet.
pub fn prepare_directories(config: &PipelineConfig) -> Result<()> {
    std::fs::create_dir_all(&config.output_dir)?;
    if !config.input_dir.is_dir() {
        std::fs::create_dir_all(&config.input_dir)?;
        return Err(Error::MissingInputDirectory(config.input_dir.clone()));
    }
    Ok(())
}

/// Run the whole conversion.
pub fn run(config: &PipelineConfig) -> Result<BatchReport> {
    prepare_directories(config)?;

    let sources = scan(&config.input_dir, &config.scan)?;
    log::info!(
        "Found {} melody files in {}",
        sources.len(),
        config.input_dir.display()
    );

    let workspace = Workspace::fresh(&config.work_dir)?;
    let items = sources
        .into_iter()
        .map(|(id, source)| {
            let work_dir = workspace.item_dir(&id);
            Item::new(id, source, work_dir)
        })
        .collect();

    let mut pipeline = Pipeline::new(config.clone(), workspace, items);
    pipeline.run()
}

/// The batch and its per-item state.
pub struct Pipeline {
    config: PipelineConfig,
    workspace: Option<Workspace>,
    builder: PresentationBuilder,
    items: Vec<Item>,
    report: BatchReport,
}

impl Pipeline {
    /// Create a pipeline over already discovered items.
    pub fn new(config: PipelineConfig, workspace: Workspace, items: Vec<Item>) -> Self {
        let builder = PresentationBuilder::new().with_layout(config.layout.clone());
        Self {
            config,
            workspace: Some(workspace),
            builder,
            items,
            report: BatchReport::default(),
        }
    }

    /// Run every phase in order, then clean up.
    pub fn run(&mut self) -> Result<BatchReport> {
        self.extract()?;
        self.describe()?;
        self.crop()?;
        self.build()?;

        self.report.failed = self
            .items
            .iter()
            .filter(|item| item.stage == Stage::Failed)
            .map(|item| {
                let reason = item.failure.clone().unwrap_or_default();
                (item.id.clone(), reason)
            })
            .collect();

        if self.config.keep_work {
            if let Some(workspace) = &self.workspace {
                log::info!("Keeping working directory {}", workspace.root().display());
            }
        } else {
            self.cleanup()?;
        }

        Ok(std::mem::take(&mut self.report))
    }

    /// Phase 1: unpack the slide images of every item.
    pub fn extract(&mut self) -> Result<()> {
        self.run_phase("1. Extracting images.", Stage::Discovered, Stage::Extracted, |item, _, _| {
            std::fs::create_dir_all(&item.work_dir)?;
            let mut reader = PptxReader::open(&item.source)?;
            let mut images = reader.extract_images(&item.images_dir())?;
            wide_core::types::sort_images(&mut images);
            log::debug!("{}: extracted {} images", item.id, images.len());
            item.images = images;
            Ok(())
        })
    }

    /// Phase 2: read and persist the title fields of every item.
    pub fn describe(&mut self) -> Result<()> {
        self.run_phase("2. Reading metadata.", Stage::Extracted, Stage::Described, |item, _, _| {
            let mut reader = PptxReader::open(&item.source)?;
            let metadata = reader.read_metadata()?;
            metadata.save(&item.metadata_path())?;
            item.metadata = Some(metadata);
            Ok(())
        })
    }

    /// Phase 3: crop every image not yet cropped in this run.
    pub fn crop(&mut self) -> Result<()> {
        self.run_phase("3. Cropping melody images.", Stage::Described, Stage::Cropped, |item, config, _| {
            for asset in item.images.iter_mut().filter(|a| !a.cropped) {
                if let CropOutcome::Blank = crop_image(&asset.path, &config.crop)? {
                    log::warn!("{}: image {} is blank", item.id, asset.index);
                }
                asset.cropped = true;
            }
            Ok(())
        })
    }

    /// Phase 4: write the wide presentation of every item.
    pub fn build(&mut self) -> Result<()> {
        let mut converted = Vec::new();
        let mut skipped = Vec::new();

        self.run_phase("4. Generating wide presentations.", Stage::Cropped, Stage::Built, |item, config, builder| {
            let output = output_path(&config.output_dir, &item.id);
            if output.exists() {
                match config.overwrite {
                    OverwritePolicy::Overwrite => {
                        log::debug!("Overwriting {}", output.display());
                    }
                    OverwritePolicy::Skip => {
                        log::info!("{} exists, skipping {}", output.display(), item.id);
                        skipped.push(item.id.clone());
                        return Ok(());
                    }
                    OverwritePolicy::Error => return Err(Error::OutputExists(output)),
                }
            }

            let metadata = match &item.metadata {
                Some(metadata) => metadata.clone(),
                None => Metadata::load(&item.metadata_path())?,
            };
            builder.write_to(&output, &metadata, &item.images)?;
            converted.push(output);
            Ok(())
        })?;

        self.report.converted.extend(converted);
        self.report.skipped.extend(skipped);
        Ok(())
    }

    /// Phase 5: delete per-item directories and the working root.
    pub fn cleanup(&mut self) -> Result<()> {
        let Some(workspace) = self.workspace.take() else {
            return Ok(());
        };

        let bar = phase_bar("5. Cleaning up.", self.items.len(), self.config.quiet);
        for item in &self.items {
            bar.set_message(item.id.clone());
            workspace.remove_item(&item.id)?;
            bar.inc(1);
        }
        bar.finish();

        workspace.remove()
    }

    /// Apply `op` to every item at `from`, moving successes to `to`.
    fn run_phase<F>(&mut self, heading: &str, from: Stage, to: Stage, mut op: F) -> Result<()>
    where
        F: FnMut(&mut Item, &PipelineConfig, &PresentationBuilder) -> Result<()>,
    {
        let Self {
            config,
            builder,
            items,
            ..
        } = self;

        let pending = items.iter().filter(|item| item.is_at(from)).count();
        let bar = phase_bar(heading, pending, config.quiet);
        log::info!("{} ({} items)", heading, pending);

        for item in items.iter_mut().filter(|item| item.is_at(from)) {
            bar.set_message(item.id.clone());
            match op(item, config, builder) {
                Ok(()) => item.stage = to,
                Err(e) => {
                    if config.failure == FailurePolicy::Abort {
                        bar.abandon();
                        log::error!("{}: {}", item.id, e);
                        return Err(e);
                    }
                    log::error!("{}: {}", item.id, e);
                    item.fail(e.to_string());
                }
            }
            bar.inc(1);
        }

        bar.finish();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        assert_eq!(
            output_path(Path::new("out"), "138 Holy Melody"),
            PathBuf::from("out/138 Holy Melody_wide.pptx")
        );
    }

    #[test]
    fn test_prepare_directories_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::rooted_at(dir.path());

        let err = prepare_directories(&config).unwrap_err();
        assert!(matches!(err, Error::MissingInputDirectory(_)));
        assert!(config.input_dir.is_dir());
        assert!(config.output_dir.is_dir());

        prepare_directories(&config).unwrap();
    }

    #[test]
    fn test_failed_item_leaves_batch_running() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            quiet: true,
            ..PipelineConfig::rooted_at(dir.path())
        };
        std::fs::create_dir_all(&config.input_dir).unwrap();
        let bogus = config.input_dir.join("Broken Melody.ppt");
        std::fs::write(&bogus, b"not a presentation").unwrap();

        let workspace = Workspace::fresh(&config.work_dir).unwrap();
        let items = vec![Item::new("Broken Melody", &bogus, workspace.item_dir("Broken Melody"))];
        let mut pipeline = Pipeline::new(config.clone(), workspace, items);

        let report = pipeline.run().unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Broken Melody");
        assert!(report.converted.is_empty());
        assert!(!config.work_dir.exists());
    }

    #[test]
    fn test_abort_policy_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            quiet: true,
            failure: FailurePolicy::Abort,
            ..PipelineConfig::rooted_at(dir.path())
        };
        std::fs::create_dir_all(&config.input_dir).unwrap();
        let bogus = config.input_dir.join("Broken Melody.ppt");
        std::fs::write(&bogus, b"not a presentation").unwrap();

        let workspace = Workspace::fresh(&config.work_dir).unwrap();
        let items = vec![Item::new("Broken Melody", &bogus, workspace.item_dir("Broken Melody"))];
        let mut pipeline = Pipeline::new(config, workspace, items);

        assert!(matches!(pipeline.run(), Err(Error::UnsupportedFormat(_))));
    }
}
