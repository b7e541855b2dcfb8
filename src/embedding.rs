use crate::error::Result;
use ndarray::Array1;

/// The VectorGenerator trait derives an embedding for a new token from
/// sentences that use it.
pub trait VectorGenerator {
    /// Computes one vector for `idiom` from its example sentences.
    fn generate(&self, idiom: &str, contexts: &[String]) -> Result<Array1<f32>>;

    /// Dimension of the generated vectors.
    fn dimension(&self) -> usize;
}

/// An idiom token and the vector injected for it.
#[derive(Debug, Clone, PartialEq)]
pub struct IdiomVector {
    pub idiom: String,
    pub token_id: i64,
    pub vector: Array1<f32>,
}
