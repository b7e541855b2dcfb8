use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use idiom_embed::config::{PipelineConfig, DEFAULT_BERT_MODEL};
use idiom_embed::{train_embeddings, RunOutcome, TorchBackend};
use std::path::PathBuf;

/// Train idiom embeddings from a bertram model and add them to a BERT model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The underlying bert model (directory or model id)
    #[arg(long = "bert_model", default_value = DEFAULT_BERT_MODEL)]
    bert_model: String,

    /// The bertram model that will generate the embeddings
    #[arg(long = "bertram_model")]
    bertram_model: String,

    /// The directory where the final model and tokenizer will be saved
    #[arg(long = "output_dir")]
    output_dir: PathBuf,

    /// The folder containing one <IDIOM>.txt example file per idiom
    #[arg(long = "examples_folder")]
    examples_folder: PathBuf,

    /// Number of examples used to train each idiom embedding
    #[arg(long = "no_examples")]
    no_examples: usize,

    /// Whether to lower case all examples, for uncased models
    #[arg(
        long,
        num_args = 0..=1,
        default_value_t = true,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    lower: bool,

    /// Device for vector generation: auto, cpu, cuda or mps
    #[arg(long, default_value = "auto")]
    device: String,

    /// Seed for sampling examples
    #[arg(long)]
    seed: Option<u64>,
}

impl Args {
    // The device is checked by the pipeline, after the output-directory guard.
    fn into_config(self) -> PipelineConfig {
        PipelineConfig {
            bert_model: self.bert_model,
            bertram_model: self.bertram_model,
            output_dir: self.output_dir,
            examples_folder: self.examples_folder,
            no_examples: self.no_examples,
            lower: self.lower,
            device: self.device,
            seed: self.seed,
        }
    }
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    // Parse command line arguments
    let config = Args::parse().into_config();

    let outcome = train_embeddings(&config, &TorchBackend).with_context(|| {
        format!(
            "failed to add idiom embeddings from {} to {}",
            config.bertram_model, config.bert_model
        )
    })?;

    match outcome {
        RunOutcome::AlreadyExists => {}
        RunOutcome::Completed(summary) => println!(
            "Added {} of {} idioms ({} skipped) to {}",
            summary.vectors.len(),
            summary.idioms_found,
            summary.skipped.len(),
            config.output_dir.display()
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 9] = [
        "idiom_embed",
        "--bertram_model",
        "bertram-add",
        "--output_dir",
        "out",
        "--examples_folder",
        "examples",
        "--no_examples",
        "10",
    ];

    #[test]
    fn test_defaults() -> Result<()> {
        let config = Args::try_parse_from(REQUIRED)?.into_config();
        assert_eq!(config.bert_model, "bert-base-uncased");
        assert_eq!(config.no_examples, 10);
        assert!(config.lower);
        assert_eq!(config.device, "auto");
        assert_eq!(config.seed, None);
        Ok(())
    }

    #[test]
    fn test_lower_flag_forms() -> Result<()> {
        let bare = Args::try_parse_from(REQUIRED.iter().copied().chain(["--lower"]))?;
        assert!(bare.lower);

        let off = Args::try_parse_from(REQUIRED.iter().copied().chain(["--lower", "false"]))?;
        assert!(!off.lower);
        Ok(())
    }

    #[test]
    fn test_required_arguments() {
        assert!(Args::try_parse_from(["idiom_embed", "--output_dir", "out"]).is_err());
        let config = Args::try_parse_from(REQUIRED.iter().copied().chain(["--device", "tpu"]))
            .unwrap()
            .into_config();
        assert!(config.validate().is_err());
    }
}
