use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use applens::search::{HttpImageFetcher, JsonCandidateSearch};
use applens::{Category, ClassificationResult, EngineConfig, Lexicon, RecognitionPipeline};

#[derive(Parser)]
#[command(name = "applens")]
#[command(about = "Identify the home appliance shown in a photo")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Engine configuration (TOML)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Replacement keyword tables (TOML)
    #[arg(long, value_name = "FILE")]
    lexicon: Option<PathBuf>,

    /// JSON array of candidate products to match against
    #[arg(long, value_name = "JSON")]
    candidates: Option<PathBuf>,

    /// Skip OCR (classification from image features only)
    #[arg(long)]
    no_ocr: bool,

    /// Directory holding text-detection.rten and text-recognition.rten
    #[arg(long, value_name = "DIR")]
    ocr_models: Option<PathBuf>,

    /// Overall time limit for one classification
    #[arg(long, value_name = "SECS")]
    deadline_secs: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_level = if args.verbose { "applens=debug" } else { "applens=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if args.no_ocr {
        config.ocr.enabled = false;
    }
    if let Some(dir) = args.ocr_models {
        config.ocr.model_dir = Some(dir);
    }
    if let Some(secs) = args.deadline_secs {
        config.pipeline.deadline_secs = secs;
    }
    config.validate()?;

    let lexicon = match &args.lexicon {
        Some(path) => Arc::new(Lexicon::load(path)?),
        None => Lexicon::builtin(),
    };

    let fetch_timeout = Duration::from_secs(config.similarity.fetch_timeout_secs);
    let mut pipeline = RecognitionPipeline::new(config, lexicon);

    if let Some(path) = args.candidates {
        pipeline = pipeline.with_candidates(
            Arc::new(JsonCandidateSearch::new(path)),
            Arc::new(HttpImageFetcher::new(fetch_timeout)?),
        );
    }

    if let Some(debug_dir) = args.debug_out {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let result = pipeline.classify_path(&args.image_path).await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_result(&result, args.verbose);
    }

    Ok(())
}

fn print_result(result: &ClassificationResult, verbose: bool) {
    println!("\n=== Classification Result ===");
    println!("Outcome:    {:?}", result.outcome);
    match Category::from_label(&result.category) {
        Some(category) => println!("Category:   {} ({})", result.category, category.english()),
        None => println!("Category:   {}", result.category),
    }
    println!("Brand:      {}", result.brand);
    if !result.model.is_empty() {
        println!("Model:      {}", result.model);
    }
    println!("Confidence: {:.2}", result.confidence);

    if let Some(title) = &result.product_title {
        let similarity = result.similarity.unwrap_or(0.0);
        println!("Match:      {} (similarity {:.2})", title, similarity);
    }
    if let Some(source) = &result.source {
        println!("Source:     {}", source);
    }

    println!("\n{}", result.message);

    for note in &result.notes {
        println!("  note: {}", note);
    }

    if verbose {
        if let Some(verdict) = &result.verdict {
            println!(
                "\nAppliance gate: {:?} ({:.2}) - {}",
                verdict.state, verdict.confidence, verdict.reason
            );
        }
        if result.extracted_texts.is_empty() {
            println!("No text recognized.");
        } else {
            println!("Recognized text:");
            for text in &result.extracted_texts {
                println!("  {}", text);
            }
        }
    }
}
