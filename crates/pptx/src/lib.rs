//! PPTX (Office Open XML) backend for melody deck conversion.
//!
//! Reads title fields and slide images out of source decks, and writes the
//! generated 16:9 presentations.

pub mod reader;
pub mod template;
pub mod writer;

pub use reader::{PptxReader, Shape, SlideContent, Transform};
pub use writer::{place_image, Placement, PresentationBuilder, TextBox, TextStyle, TitleLayout, WIDE_HEIGHT, WIDE_WIDTH};
