pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod utils;

// Define the protobuf module
pub mod proto {
    // Include the generated rust code from the protobuf compiler
    include!(concat!(env!("OUT_DIR"), "/idiom_vectors.rs"));
}

// Re-export commonly used items
pub use config::{DeviceChoice, PipelineConfig};
pub use embedding::{IdiomVector, VectorGenerator};
pub use error::{EmbedError, Result};
pub use models::bert_mlm::BertMaskedLm;
pub use models::bertram::ContextualEmbedder;
pub use models::{ModelArtifact, ModelConfig};
pub use pipeline::{train_embeddings, Backend, RunOutcome, TorchBackend};

/// Version of the idiom_embed library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
