//! The injection run: guard the output directory, sample examples,
//! generate and splice idiom vectors, persist the augmented model.

use crate::config::PipelineConfig;
use crate::corpus::{self, SkippedIdiom};
use crate::embedding::{IdiomVector, VectorGenerator};
use crate::error::{EmbedError, Result};
use crate::models::bert_mlm::BertMaskedLm;
use crate::models::bertram::ContextualEmbedder;
use crate::models::{ModelArtifact, ModelConfig};
use crate::utils::{self, ModelFiles};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::BTreeMap;
use std::fs;

/// Sidecar file listing every injected idiom vector.
pub const IDIOM_VECTORS_FILE: &str = "idiom_vectors.pb";

/// Loads the model being augmented and the vector generator.
pub trait Backend {
    type Artifact: ModelArtifact;
    type Generator: VectorGenerator;

    fn load_artifact(&self, config: &PipelineConfig) -> Result<Self::Artifact>;
    fn load_generator(&self, config: &PipelineConfig) -> Result<Self::Generator>;
}

/// rust-bert / libtorch backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct TorchBackend;

impl Backend for TorchBackend {
    type Artifact = BertMaskedLm;
    type Generator = ContextualEmbedder;

    fn load_artifact(&self, config: &PipelineConfig) -> Result<BertMaskedLm> {
        let files = ModelFiles::resolve(&config.bert_model)?;
        BertMaskedLm::load(&config.bert_model, &files)
    }

    fn load_generator(&self, config: &PipelineConfig) -> Result<ContextualEmbedder> {
        let device = utils::resolve_device(config.device_choice()?)?;
        let files = ModelFiles::resolve(&config.bertram_model)?;
        ContextualEmbedder::load(&config.bertram_model, &files, device)
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The output directory existed; nothing was loaded or written.
    AlreadyExists,
    Completed(RunSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub idioms_found: usize,
    pub vectors: Vec<IdiomVector>,
    pub skipped: Vec<SkippedIdiom>,
}

/// Generates a vector for every idiom and splices it into `artifact`.
pub fn add_word_vectors<G, A>(
    generator: &G,
    artifact: &mut A,
    examples: &BTreeMap<String, Vec<String>>,
) -> Result<Vec<IdiomVector>>
where
    G: VectorGenerator + ?Sized,
    A: ModelArtifact + ?Sized,
{
    let mut vectors = Vec::with_capacity(examples.len());
    for (idiom, contexts) in examples {
        let vector = generator.generate(idiom, contexts)?;
        let token_id = artifact.add_vector(idiom, &vector)?;
        log::debug!("{} -> token {}", idiom, token_id);
        vectors.push(IdiomVector {
            idiom: idiom.clone(),
            token_id,
            vector,
        });
    }
    Ok(vectors)
}

/// Runs the whole injection.
///
/// An existing `output_dir` makes the run a no-op. Otherwise the directory
/// is created up front and left behind if a later stage fails.
pub fn train_embeddings<B: Backend>(config: &PipelineConfig, backend: &B) -> Result<RunOutcome> {
    let output_dir = &config.output_dir;
    if output_dir.is_dir() {
        log::warn!(
            "Output directory {} already exists. Will not overwrite.",
            output_dir.display()
        );
        return Ok(RunOutcome::AlreadyExists);
    }

    config.validate()?;
    fs::create_dir_all(output_dir).map_err(|e| EmbedError::io(output_dir, e))?;

    let mut artifact = backend.load_artifact(config)?;
    let generator = backend.load_generator(config)?;
    if generator.dimension() != artifact.dimension() {
        return Err(EmbedError::DimensionMismatch {
            expected: artifact.dimension(),
            actual: generator.dimension(),
        });
    }

    let idioms = corpus::discover_idioms(&config.examples_folder)?;
    log::info!(
        "Found {} idioms in {}",
        idioms.len(),
        config.examples_folder.display()
    );

    let mut rng: Box<dyn RngCore> = match config.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(rand::thread_rng()),
    };
    let sampled = corpus::sample_examples(
        &idioms,
        &config.examples_folder,
        config.no_examples,
        config.lower,
        &mut *rng,
    )?;
    log::info!(
        "Fetched examples for {} idioms ({} skipped)",
        sampled.len(),
        sampled.skipped.len()
    );
    if let Some((idiom, lines)) = sampled.examples.iter().next() {
        log::debug!("Examples for {}: {:?}", idiom, lines);
    }

    let vectors = add_word_vectors(&generator, &mut artifact, &sampled.examples)?;
    log::info!(
        "Added {} idioms and embeddings to {} (vocabulary now {})",
        vectors.len(),
        artifact.model_name(),
        artifact.vocab_size()
    );

    artifact.save(output_dir)?;
    utils::save_idiom_vectors(
        &vectors,
        &config.bert_model,
        &config.bertram_model,
        output_dir.join(IDIOM_VECTORS_FILE),
    )?;
    log::info!("Saved model and tokenizer to {}", output_dir.display());

    Ok(RunOutcome::Completed(RunSummary {
        idioms_found: idioms.len(),
        vectors,
        skipped: sampled.skipped,
    }))
}
