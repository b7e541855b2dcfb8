//! Context-based vector generation in the spirit of BERTRAM.
//!
//! Each example sentence is fed through a BERT encoder with the idiom
//! replaced by `[MASK]`. The hidden states at the mask positions are
//! averaged and, when the checkpoint carries one, projected into the
//! target model's embedding space.

use crate::embedding::VectorGenerator;
use crate::error::{EmbedError, Result};
use crate::utils::ModelFiles;
use ndarray::{Array1, Array2};
use rust_bert::bert::{BertConfig, BertEmbeddings, BertModel};
use std::collections::HashMap;
use std::fs;
use tch::nn::VarStore;
use tch::{Device, Kind, Tensor};
use tokenizers::Tokenizer;

pub const MASK_TOKEN: &str = "[MASK]";
pub const SEP_TOKEN: &str = "[SEP]";

/// Optional output projection stored next to the encoder weights.
pub const PROJECTION_WEIGHT: &str = "projection.weight";
pub const PROJECTION_BIAS: &str = "projection.bias";

struct Projection {
    weight: Array2<f32>,
    bias: Option<Array1<f32>>,
}

/// BERT encoder turning idiom contexts into one embedding vector.
pub struct ContextualEmbedder {
    encoder: BertModel<BertEmbeddings>,
    // owns the encoder's variables
    _vs: VarStore,
    tokenizer: Tokenizer,
    device: Device,
    mask_id: i64,
    sep_id: Option<i64>,
    max_len: usize,
    hidden_size: usize,
    projection: Option<Projection>,
}

impl ContextualEmbedder {
    /// Load the encoder, its tokenizer and the optional projection.
    pub fn load(name: &str, files: &ModelFiles, device: Device) -> Result<Self> {
        let raw = fs::read_to_string(&files.config).map_err(|e| EmbedError::io(&files.config, e))?;
        let config: BertConfig = serde_json::from_str(&raw)?;

        let vs = VarStore::new(device);
        let encoder =
            BertModel::<BertEmbeddings>::new_with_optional_pooler(vs.root() / "bert", &config, false);

        // one read of the checkpoint serves the encoder and the projection
        let named = Tensor::load_multi_with_device(&files.weights, device)?;
        let named: HashMap<String, Tensor> = named.into_iter().collect();
        copy_variables(&vs, &named)?;

        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(EmbedError::tokenizer)?;
        let mask_id = tokenizer
            .token_to_id(MASK_TOKEN)
            .map(i64::from)
            .ok_or_else(|| EmbedError::MissingToken(MASK_TOKEN.to_string()))?;
        let sep_id = tokenizer.token_to_id(SEP_TOKEN).map(i64::from);

        let hidden_size = config.hidden_size as usize;
        let projection = load_projection(&named, hidden_size)?;
        drop(named);
        if let Some(projection) = &projection {
            log::info!(
                "Projecting {} context vectors to dimension {}",
                name,
                projection.weight.nrows()
            );
        }

        Ok(Self {
            encoder,
            _vs: vs,
            tokenizer,
            device,
            mask_id,
            sep_id,
            max_len: config.max_position_embeddings as usize,
            hidden_size,
            projection,
        })
    }

    /// Token ids of `text`, truncated to the encoder's maximum length.
    fn encode(&self, text: &str) -> Result<Vec<i64>> {
        let encoding = self.tokenizer.encode(text, true).map_err(EmbedError::tokenizer)?;
        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();

        if ids.len() > self.max_len {
            match self.sep_id {
                Some(sep) => {
                    ids.truncate(self.max_len - 1);
                    ids.push(sep);
                }
                None => ids.truncate(self.max_len),
            }
        }
        Ok(ids)
    }

    /// Hidden states at the mask positions of one context, `None` if the
    /// idiom does not occur in it.
    fn mask_states(&self, idiom: &str, context: &str) -> Result<Option<Vec<Array1<f32>>>> {
        let masked = context.replace(idiom, MASK_TOKEN);
        let ids = self.encode(&masked)?;
        let positions: Vec<i64> = ids
            .iter()
            .enumerate()
            .filter(|(_, id)| **id == self.mask_id)
            .map(|(i, _)| i as i64)
            .collect();
        if positions.is_empty() {
            return Ok(None);
        }

        let input = Tensor::from_slice(&ids).view([1, -1]).to_device(self.device);
        let index = Tensor::from_slice(&positions).to_device(self.device);
        let states = tch::no_grad(|| -> Result<Tensor> {
            let output = self
                .encoder
                .forward_t(Some(&input), None, None, None, None, None, None, false)?;
            Ok(output
                .hidden_state
                .get(0)
                .index_select(0, &index)
                .to_kind(Kind::Float)
                .to_device(Device::Cpu)
                .view([-1]))
        })?;

        let flat = Vec::<f32>::try_from(&states)?;
        Ok(Some(
            flat.chunks(self.hidden_size)
                .map(|chunk| Array1::from(chunk.to_vec()))
                .collect(),
        ))
    }
}

impl VectorGenerator for ContextualEmbedder {
    fn generate(&self, idiom: &str, contexts: &[String]) -> Result<Array1<f32>> {
        let mut sum = Array1::<f32>::zeros(self.hidden_size);
        let mut count = 0usize;

        for context in contexts {
            match self.mask_states(idiom, context)? {
                Some(states) => {
                    for state in states {
                        sum += &state;
                        count += 1;
                    }
                }
                None => log::debug!("{} does not occur in context {:?}", idiom, context),
            }
        }

        if count == 0 {
            return Err(EmbedError::NoUsableContext(idiom.to_string()));
        }

        let mean = sum / count as f32;
        Ok(match &self.projection {
            Some(projection) => {
                let projected = projection.weight.dot(&mean);
                match &projection.bias {
                    Some(bias) => projected + bias,
                    None => projected,
                }
            }
            None => mean,
        })
    }

    fn dimension(&self) -> usize {
        self.projection
            .as_ref()
            .map(|p| p.weight.nrows())
            .unwrap_or(self.hidden_size)
    }
}

fn tensor_to_vec(tensor: &Tensor) -> Result<Vec<f32>> {
    let flat = tensor.to_kind(Kind::Float).to_device(Device::Cpu).view([-1]);
    Ok(Vec::<f32>::try_from(&flat)?)
}

/// Fills every encoder variable from the checkpoint tensors.
fn copy_variables(vs: &VarStore, named: &HashMap<String, Tensor>) -> Result<()> {
    let mut variables = vs.variables();
    tch::no_grad(|| -> Result<()> {
        for (name, variable) in variables.iter_mut() {
            let source = named
                .get(name)
                .ok_or_else(|| EmbedError::MissingTensor(name.clone()))?;
            variable.f_copy_(source)?;
        }
        Ok(())
    })
}

fn load_projection(
    named: &HashMap<String, Tensor>,
    hidden_size: usize,
) -> Result<Option<Projection>> {
    let weight = match named.get(PROJECTION_WEIGHT) {
        Some(weight) => weight,
        None => return Ok(None),
    };
    let size = weight.size();
    if size.len() != 2 || size[1] as usize != hidden_size {
        return Err(EmbedError::DimensionMismatch {
            expected: hidden_size,
            actual: size.get(1).copied().unwrap_or(0) as usize,
        });
    }

    let out_dim = size[0] as usize;
    let weight = Array2::from_shape_vec((out_dim, hidden_size), tensor_to_vec(weight)?)
        .map_err(|e| EmbedError::InvalidConfig(format!("{}: {}", PROJECTION_WEIGHT, e)))?;

    let bias = match named.get(PROJECTION_BIAS) {
        Some(bias) => {
            let bias = Array1::from(tensor_to_vec(bias)?);
            if bias.len() != out_dim {
                return Err(EmbedError::DimensionMismatch {
                    expected: out_dim,
                    actual: bias.len(),
                });
            }
            Some(bias)
        }
        None => None,
    };

    Ok(Some(Projection { weight, bias }))
}
