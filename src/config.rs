use crate::error::{EmbedError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Default base model when `--bert_model` is not given.
pub const DEFAULT_BERT_MODEL: &str = "bert-base-uncased";

/// Which compute device to run the vector generator on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceChoice {
    /// CUDA if available, then MPS, then CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Mps,
}

impl FromStr for DeviceChoice {
    type Err = EmbedError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceChoice::Auto),
            "cpu" => Ok(DeviceChoice::Cpu),
            "cuda" | "gpu" => Ok(DeviceChoice::Cuda),
            "mps" => Ok(DeviceChoice::Mps),
            other => Err(EmbedError::InvalidConfig(format!(
                "unknown device `{}` (expected auto, cpu, cuda or mps)",
                other
            ))),
        }
    }
}

impl fmt::Display for DeviceChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceChoice::Auto => "auto",
            DeviceChoice::Cpu => "cpu",
            DeviceChoice::Cuda => "cuda",
            DeviceChoice::Mps => "mps",
        };
        f.write_str(name)
    }
}

/// Resolved parameters of one injection run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base masked-LM: local directory or model id
    pub bert_model: String,
    /// Vector-generation model: local directory or model id
    pub bertram_model: String,
    pub output_dir: PathBuf,
    pub examples_folder: PathBuf,
    /// Maximum number of example sentences sampled per idiom
    pub no_examples: usize,
    /// Lower-case examples (idiom tokens keep their casing)
    pub lower: bool,
    /// Requested device name, parsed by [`PipelineConfig::device_choice`]
    pub device: String,
    /// Fixed sampling seed; `None` samples from the thread RNG
    pub seed: Option<u64>,
}

impl PipelineConfig {
    pub fn new(
        bertram_model: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        examples_folder: impl Into<PathBuf>,
        no_examples: usize,
    ) -> Self {
        Self {
            bert_model: DEFAULT_BERT_MODEL.to_string(),
            bertram_model: bertram_model.into(),
            output_dir: output_dir.into(),
            examples_folder: examples_folder.into(),
            no_examples,
            lower: true,
            device: DeviceChoice::Auto.to_string(),
            seed: None,
        }
    }

    pub fn device_choice(&self) -> Result<DeviceChoice> {
        self.device.parse()
    }

    pub fn validate(&self) -> Result<()> {
        if self.no_examples == 0 {
            return Err(EmbedError::InvalidConfig(
                "no_examples must be at least 1".to_string(),
            ));
        }
        if self.bertram_model.trim().is_empty() {
            return Err(EmbedError::InvalidConfig(
                "bertram_model must not be empty".to_string(),
            ));
        }
        self.device_choice()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_choice_parsing() {
        assert_eq!("auto".parse::<DeviceChoice>().unwrap(), DeviceChoice::Auto);
        assert_eq!("CUDA".parse::<DeviceChoice>().unwrap(), DeviceChoice::Cuda);
        assert_eq!("cpu".parse::<DeviceChoice>().unwrap(), DeviceChoice::Cpu);
        assert!("tpu".parse::<DeviceChoice>().is_err());
    }

    #[test]
    fn test_defaults_and_validation() {
        let config = PipelineConfig::new("bertram", "out", "examples", 10);
        assert_eq!(config.bert_model, DEFAULT_BERT_MODEL);
        assert!(config.lower);
        assert!(config.validate().is_ok());

        let zero = PipelineConfig::new("bertram", "out", "examples", 0);
        assert!(matches!(zero.validate(), Err(EmbedError::InvalidConfig(_))));

        let mut tpu = PipelineConfig::new("bertram", "out", "examples", 10);
        tpu.device = "tpu".to_string();
        assert!(matches!(tpu.validate(), Err(EmbedError::InvalidConfig(_))));
        tpu.device = "cpu".to_string();
        assert_eq!(tpu.device_choice().unwrap(), DeviceChoice::Cpu);
    }
}
