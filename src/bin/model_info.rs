//! Prints what a model artifact contains, plus its metadata side file.

use anyhow::Context;
use cardio_risk::core::scorer::LoadedModel;
use cardio_risk::domain::model::Feature;
use cardio_risk::utils::logger;
use cardio_risk::FileArtifactSource;
use clap::Parser;
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "model-info")]
#[command(about = "Summarize a cardio-risk model artifact")]
struct Args {
    #[arg(long, default_value = cardio_risk::config::DEFAULT_ARTIFACT_PATH)]
    model: String,

    #[arg(long)]
    metadata: Option<String>,

    #[arg(long, help = "Enable verbose output")]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init_cli_logger(args.verbose);

    let mut source = FileArtifactSource::new(&args.model);
    if let Some(metadata) = &args.metadata {
        source = source.with_metadata(metadata);
    }
    let model = LoadedModel::load(&source)
        .with_context(|| format!("failed to load model artifact {}", args.model))?;

    let ensemble = model.scorer().model();
    let metadata = model.metadata();
    let summary = json!({
        "model_type": "gradient_boosted_trees",
        "model_version": model.model_version(),
        "artifact": model.origin(),
        "trees": ensemble.trees().len(),
        "nodes": ensemble.node_count(),
        "max_depth": ensemble.max_depth(),
        "base_margin": ensemble.base_margin(),
        "features": Feature::ALL.iter().map(|f| f.key()).collect::<Vec<_>>(),
        "explainer_available": model.explainer().is_available(),
        "accuracy": metadata.and_then(|m| m.accuracy),
        "trained_at": metadata.and_then(|m| m.trained_at.clone()),
        "best_params": metadata.and_then(|m| m.best_params.clone()),
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
