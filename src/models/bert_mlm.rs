use crate::error::{EmbedError, Result};
use crate::models::{ModelArtifact, ModelConfig};
use crate::utils::{ModelFiles, CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tch::{Kind, Tensor};
use tokenizers::{AddedToken, Tokenizer};

/// Input embedding matrix, `[vocab_size, hidden_size]`.
pub const WORD_EMBEDDINGS: &str = "bert.embeddings.word_embeddings.weight";
/// MLM decoder weight, tied to the input embeddings.
pub const DECODER_WEIGHT: &str = "cls.predictions.decoder.weight";
/// Per-token output biases, `[vocab_size]`.
pub const OUTPUT_BIASES: [&str; 2] = ["cls.predictions.bias", "cls.predictions.decoder.bias"];

pub const ADDED_TOKENS_FILE: &str = "added_tokens.json";

/// The fields of a BERT `config.json` this crate touches. Everything else
/// is kept as is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BertArtifactConfig {
    pub vocab_size: i64,
    pub hidden_size: i64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A BERT masked-language model checkpoint in rust-bert layout, held as
/// named tensors so its vocabulary can grow.
pub struct BertMaskedLm {
    name: String,
    config: BertArtifactConfig,
    tensors: Vec<(String, Tensor)>,
    tokenizer: Tokenizer,
    added: BTreeMap<String, i64>,
    rows: i64,
}

impl BertMaskedLm {
    /// Load config, tokenizer and weights of a masked-LM.
    pub fn load(name: &str, files: &ModelFiles) -> Result<Self> {
        let raw = fs::read_to_string(&files.config).map_err(|e| EmbedError::io(&files.config, e))?;
        let config: BertArtifactConfig = serde_json::from_str(&raw)?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(EmbedError::tokenizer)?;
        let tensors = Tensor::load_multi(&files.weights)?;

        let embeddings = tensors
            .iter()
            .find(|(n, _)| n == WORD_EMBEDDINGS)
            .map(|(_, t)| t.size())
            .ok_or_else(|| EmbedError::MissingTensor(WORD_EMBEDDINGS.to_string()))?;
        if embeddings.len() != 2 || embeddings[1] != config.hidden_size {
            return Err(EmbedError::DimensionMismatch {
                expected: config.hidden_size as usize,
                actual: embeddings.get(1).copied().unwrap_or(0) as usize,
            });
        }

        log::info!(
            "Loaded {} ({} tokens, hidden size {})",
            name,
            embeddings[0],
            config.hidden_size
        );

        Ok(Self {
            name: name.to_string(),
            config,
            tensors,
            tokenizer,
            added: BTreeMap::new(),
            rows: embeddings[0],
        })
    }

    fn token_id(&self, token: &str) -> Option<i64> {
        self.tokenizer.token_to_id(token).map(i64::from)
    }

    /// Returns a copy of the embedding row of `token_id`.
    #[cfg(test)]
    fn embedding(&self, token_id: i64) -> Result<Array1<f32>> {
        let weights = self.tensor(WORD_EMBEDDINGS)?;
        let row = weights.get(token_id).to_kind(Kind::Float);
        let values = Vec::<f32>::try_from(&row)?;
        Ok(Array1::from(values))
    }

    fn tensor(&self, name: &str) -> Result<&Tensor> {
        self.tensors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
            .ok_or_else(|| EmbedError::MissingTensor(name.to_string()))
    }

    fn overwrite_row(&mut self, token_id: i64, row: &Tensor) {
        tch::no_grad(|| {
            for (name, tensor) in self.tensors.iter_mut() {
                if name == WORD_EMBEDDINGS || name == DECODER_WEIGHT {
                    let mut slot = tensor.get(token_id);
                    slot.copy_(row);
                }
            }
        });
    }

    fn append_row(&mut self, row: &Tensor) {
        let rows = self.rows;
        tch::no_grad(|| {
            for (name, tensor) in self.tensors.iter_mut() {
                let size = tensor.size();
                if (name == WORD_EMBEDDINGS || name == DECODER_WEIGHT) && size.first() == Some(&rows) {
                    let grown = Tensor::cat(&[&*tensor, &row.unsqueeze(0)], 0);
                    *tensor = grown;
                } else if OUTPUT_BIASES.contains(&name.as_str()) && size == [rows] {
                    let zero = Tensor::zeros(&[1], (tensor.kind(), tensor.device()));
                    let grown = Tensor::cat(&[&*tensor, &zero], 0);
                    *tensor = grown;
                }
            }
        });
        self.rows += 1;
        self.config.vocab_size = self.rows;
    }
}

impl ModelConfig for BertMaskedLm {
    fn dimension(&self) -> usize {
        self.config.hidden_size as usize
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> usize {
        self.rows as usize
    }
}

impl ModelArtifact for BertMaskedLm {
    fn add_vector(&mut self, token: &str, vector: &Array1<f32>) -> Result<i64> {
        if vector.len() != self.dimension() {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension(),
                actual: vector.len(),
            });
        }

        let kind = self.tensor(WORD_EMBEDDINGS)?.kind();
        let values: Vec<f32> = vector.iter().copied().collect();
        let row = Tensor::from_slice(&values).to_kind(kind);

        if let Some(existing) = self.token_id(token) {
            if existing >= self.rows {
                return Err(EmbedError::VocabMismatch {
                    token: token.to_string(),
                    expected: self.rows,
                    actual: existing,
                });
            }
            log::debug!("{} already in vocabulary as {}, overwriting its embedding", token, existing);
            self.overwrite_row(existing, &row);
            self.added.insert(token.to_string(), existing);
            return Ok(existing);
        }

        // Matched against raw text so idiom tokens keep their casing on
        // uncased models.
        self.tokenizer
            .add_tokens(&[AddedToken::from(token, false).normalized(false)]);
        let token_id = self
            .token_id(token)
            .ok_or_else(|| EmbedError::MissingToken(token.to_string()))?;
        if token_id != self.rows {
            return Err(EmbedError::VocabMismatch {
                token: token.to_string(),
                expected: self.rows,
                actual: token_id,
            });
        }

        self.append_row(&row);
        self.added.insert(token.to_string(), token_id);
        Ok(token_id)
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let weights = dir.join(WEIGHTS_FILE);
        Tensor::save_multi(&self.tensors, &weights)?;

        let config = dir.join(CONFIG_FILE);
        fs::write(&config, serde_json::to_string_pretty(&self.config)?)
            .map_err(|e| EmbedError::io(&config, e))?;

        self.tokenizer
            .save(dir.join(TOKENIZER_FILE), true)
            .map_err(EmbedError::tokenizer)?;

        let added = dir.join(ADDED_TOKENS_FILE);
        fs::write(&added, serde_json::to_string_pretty(&self.added)?)
            .map_err(|e| EmbedError::io(&added, e))?;

        Ok(())
    }
}
