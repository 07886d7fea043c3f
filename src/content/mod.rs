//! HTML to Markdown / reStructuredText conversion through external tools.

mod convert;

pub use convert::{Backend, ConversionError, ConvertedContent, Converter, Markup};
