//! `{key}` placeholder substitution through layered lookup sources.

mod context;

pub use context::{FormatContext, FormatLayer, FormatSource, ProcessFormatSource};
