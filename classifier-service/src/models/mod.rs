pub mod classification;

pub use classification::{Category, ClassificationResult};
