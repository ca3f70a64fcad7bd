//! Image intake: size check, decode, format allow-list, normalization and
//! classification of a single upload.

pub mod decode;
pub mod error;
pub mod normalize;
pub mod pipeline;

pub use error::AnalyzeError;
pub use pipeline::IntakePipeline;

#[cfg(test)]
pub(crate) mod fixtures;
