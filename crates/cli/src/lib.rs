//! Batch conversion of 4:3 melody decks into 16:9 presentations.

pub mod pipeline;
pub mod progress;
pub mod scanner;
pub mod workspace;

pub use pipeline::{
    output_path, prepare_directories, run, BatchReport, FailurePolicy, OverwritePolicy, Pipeline,
    PipelineConfig,
};
pub use scanner::{scan, ScanRules};
pub use workspace::Workspace;
