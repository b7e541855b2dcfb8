pub mod bert_mlm;
pub mod bertram;

use crate::error::Result;
use ndarray::Array1;
use std::path::Path;

// Common model traits and utilities
/// Model configuration trait for querying a loaded model's shape
pub trait ModelConfig {
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
    fn vocab_size(&self) -> usize;
}

/// A pretrained model plus tokenizer that new token vectors are spliced into.
pub trait ModelArtifact: ModelConfig {
    /// Registers `token` and sets its embedding row to `vector`, returning
    /// the token id.
    fn add_vector(&mut self, token: &str, vector: &Array1<f32>) -> Result<i64>;

    /// Writes the model and tokenizer into `dir`, which must exist.
    fn save(&self, dir: &Path) -> Result<()>;
}
