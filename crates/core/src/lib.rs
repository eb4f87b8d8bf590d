//! Core domain types, metadata normalization, and the bounding-box image
//! cropper for converting melody decks to wide presentations.

pub mod crop;
pub mod error;
pub mod normalize;
pub mod types;

pub use crop::{crop_image, CropConfig, CropOutcome, CropRect};
pub use error::{Error, Result};
pub use types::{ImageAsset, Item, Metadata, SourceFormat, Stage};
