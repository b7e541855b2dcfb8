use anyhow::{bail, Result};
use clap::Parser;
use idiom_embed::utils;
use std::path::PathBuf;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// idiom_vectors.pb written next to an augmented model
    #[arg(short = 'v', long)]
    vectors: PathBuf,

    /// Idiom to find neighbours for (all idioms if omitted)
    #[arg(short, long)]
    idiom: Option<String>,

    /// Number of neighbours to print
    #[arg(short = 'k', long, default_value_t = 5)]
    top_k: usize,
}

fn main() -> Result<()> {
    // Initialize logging
    env_logger::init();

    let args = Args::parse();

    let (vectors, meta) = utils::load_idiom_vectors(&args.vectors)?;
    if vectors.is_empty() {
        println!("No idiom vectors found in {:?}", args.vectors);
        return Ok(());
    }
    println!(
        "{} idioms, dimension {} (base {}, generator {})",
        vectors.len(),
        meta.dimension,
        meta.base_model,
        meta.generator_model
    );

    let queries: Vec<_> = match &args.idiom {
        Some(idiom) => match vectors.iter().find(|v| &v.idiom == idiom) {
            Some(query) => vec![query],
            None => bail!("{} not found in {:?}", idiom, args.vectors),
        },
        None => vectors.iter().collect(),
    };

    for query in queries {
        let mut scored: Vec<(f32, &str)> = vectors
            .iter()
            .filter(|v| v.idiom != query.idiom)
            .map(|v| (utils::cosine_similarity(&query.vector, &v.vector), v.idiom.as_str()))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        println!("{} (token {})", query.idiom, query.token_id);
        for (similarity, idiom) in scored.into_iter().take(args.top_k) {
            println!("  {:.6}  {}", similarity, idiom);
        }
    }

    Ok(())
}
