use crate::config::DeviceChoice;
use crate::embedding::IdiomVector;
use crate::error::{EmbedError, Result};
use crate::proto;
use bytes::{Bytes, BytesMut};
use ndarray::Array1;
use prost::Message;
use rust_bert::resources::{RemoteResource, ResourceProvider};
use std::fs;
use std::path::{Path, PathBuf};
use tch::Device;

/// File names of a model directory in rust-bert layout.
pub const CONFIG_FILE: &str = "config.json";
pub const TOKENIZER_FILE: &str = "tokenizer.json";
pub const WEIGHTS_FILE: &str = "rust_model.ot";

const HF_RESOLVE_URL: &str = "https://huggingface.co";

/// Cache home directory for model storage
pub fn cache_home() -> PathBuf {
    if let Some(cache_dir) = dirs::cache_dir() {
        cache_dir.join("idiom_embed")
    } else {
        std::env::temp_dir().join("idiom_embed")
    }
}

/// Local paths of the files making up one model.
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    /// Files inside a local model directory.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            config: dir.join(CONFIG_FILE),
            tokenizer: dir.join(TOKENIZER_FILE),
            weights: dir.join(WEIGHTS_FILE),
        }
    }

    /// Resolves a model given as a directory, a cached id or a Hugging Face id.
    ///
    /// Lookup order: `model` as a directory, `<cache_home>/models/<model>`,
    /// then download through the rust-bert resource cache.
    pub fn resolve(model: &str) -> Result<Self> {
        let local = Path::new(model);
        if local.is_dir() {
            return Ok(Self::in_dir(local));
        }

        let cached = cache_home().join("models").join(model);
        if cached.is_dir() {
            log::info!("Using cached model {} from {}", model, cached.display());
            return Ok(Self::in_dir(cached));
        }

        log::info!("Fetching {} from {}", model, HF_RESOLVE_URL);
        let subdir = model.replace('/', "_");
        let fetch = |file: &str| -> Result<PathBuf> {
            let url = format!("{}/{}/resolve/main/{}", HF_RESOLVE_URL, model, file);
            Ok(RemoteResource::new(&url, &subdir).get_local_path()?)
        };

        Ok(Self {
            config: fetch(CONFIG_FILE)?,
            tokenizer: fetch(TOKENIZER_FILE)?,
            weights: fetch(WEIGHTS_FILE)?,
        })
    }
}

/// Maps the requested device onto a libtorch device.
pub fn resolve_device(choice: DeviceChoice) -> Result<Device> {
    let cuda = tch::Cuda::is_available();
    let mps = tch::utils::has_mps();

    let device = match choice {
        DeviceChoice::Cpu => Device::Cpu,
        DeviceChoice::Cuda if cuda => Device::Cuda(0),
        DeviceChoice::Mps if mps => Device::Mps,
        DeviceChoice::Cuda | DeviceChoice::Mps => {
            return Err(EmbedError::DeviceUnavailable(choice.to_string()))
        }
        DeviceChoice::Auto if cuda => Device::Cuda(0),
        DeviceChoice::Auto if mps => Device::Mps,
        DeviceChoice::Auto => Device::Cpu,
    };

    log::info!("Running vector generation on {:?}", device);
    Ok(device)
}

/// Collapses runs of whitespace into single spaces and trims the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Computes the cosine similarity between two vectors.
pub fn cosine_similarity(vec1: &Array1<f32>, vec2: &Array1<f32>) -> f32 {
    let dot_product = vec1.dot(vec2);
    let norm1 = vec1.dot(vec1).sqrt();
    let norm2 = vec2.dot(vec2).sqrt();

    if norm1 * norm2 == 0.0 {
        return 0.0;
    }

    dot_product / (norm1 * norm2)
}

/// Writes injected idiom vectors to a Protobuf file
pub fn save_idiom_vectors<P: AsRef<Path>>(
    vectors: &[IdiomVector],
    base_model: &str,
    generator_model: &str,
    path: P,
) -> Result<()> {
    let timestamp = chrono::Utc::now().timestamp();
    let dimension = vectors.first().map(|v| v.vector.len()).unwrap_or(0);

    let collection = proto::IdiomVectorCollection {
        vectors: vectors
            .iter()
            .map(|v| proto::IdiomVector {
                idiom: v.idiom.clone(),
                token_id: v.token_id,
                values: v.vector.iter().copied().collect(),
                timestamp,
            })
            .collect(),
        base_model: base_model.to_string(),
        generator_model: generator_model.to_string(),
        dimension: dimension as i32,
    };

    let mut buf = BytesMut::with_capacity(collection.encoded_len());
    collection.encode(&mut buf)?;

    let path = path.as_ref();
    fs::write(path, buf.freeze()).map_err(|e| EmbedError::io(path, e))?;
    Ok(())
}

/// Reads idiom vectors written by [`save_idiom_vectors`].
pub fn load_idiom_vectors<P: AsRef<Path>>(path: P) -> Result<(Vec<IdiomVector>, proto::IdiomVectorCollection)> {
    let path = path.as_ref();
    let data = fs::read(path).map_err(|e| EmbedError::io(path, e))?;
    let mut collection = proto::IdiomVectorCollection::decode(Bytes::from(data))?;

    let vectors = std::mem::take(&mut collection.vectors)
        .into_iter()
        .map(|v| IdiomVector {
            idiom: v.idiom,
            token_id: v.token_id,
            vector: Array1::from(v.values),
        })
        .collect();

    Ok((vectors, collection))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  a \t b\n\nc  "), "a b c");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = Array1::from(vec![1.0f32, 0.0]);
        let b = Array1::from(vec![0.0f32, 2.0]);
        let zero = Array1::from(vec![0.0f32, 0.0]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[test]
    fn test_model_files_in_local_dir() {
        let tmp = tempdir().expect("create temp dir");
        let files = ModelFiles::resolve(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(files.weights, tmp.path().join(WEIGHTS_FILE));
        assert_eq!(files.tokenizer, tmp.path().join(TOKENIZER_FILE));
    }

    #[test]
    fn test_idiom_vectors_file() {
        let tmp = tempdir().expect("create temp dir");
        let path = tmp.path().join("idiom_vectors.pb");
        let vectors = vec![
            IdiomVector {
                idiom: "BITE*THE*BULLET".to_string(),
                token_id: 30522,
                vector: Array1::from(vec![0.5, -1.0, 2.0]),
            },
            IdiomVector {
                idiom: "SPILL*THE*BEANS".to_string(),
                token_id: 30523,
                vector: Array1::from(vec![1.0, 0.0, 0.25]),
            },
        ];

        save_idiom_vectors(&vectors, "bert-base-uncased", "bertram", &path).unwrap();
        let (loaded, meta) = load_idiom_vectors(&path).unwrap();

        assert_eq!(meta.dimension, 3);
        assert_eq!(meta.base_model, "bert-base-uncased");
        assert_eq!(loaded, vectors);
    }

    #[test]
    fn test_cpu_device_always_resolves() {
        assert_eq!(resolve_device(DeviceChoice::Cpu).unwrap(), Device::Cpu);
    }
}
