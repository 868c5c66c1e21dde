pub mod classifier;
pub mod providers;

pub use classifier::{ClassifyError, EmailClassifier};
