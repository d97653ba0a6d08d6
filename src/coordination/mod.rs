//! Writer rotation: routing row batches into one output per source

pub mod converter;

pub use converter::{ConversionResult, Converter, ConverterConfigBuilder, OutputFile};
