use cardio_risk::domain::ports::ConfigProvider;
use cardio_risk::utils::error::{ErrorSeverity, RiskError};
use cardio_risk::utils::{logger, validation::Validate};
use cardio_risk::{
    AppConfig, AssessmentEngine, BatchPipeline, CliConfig, FileArtifactSource, LocalStorage,
    ModelRegistry, RiskService,
};
use clap::Parser;

fn exit_code(e: &RiskError) -> i32 {
    match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    }
}

fn report_failure(context: &str, e: &RiskError) -> ! {
    tracing::error!(
        "❌ {}: {} (Category: {:?}, Severity: {:?})",
        context,
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());
    std::process::exit(exit_code(e).max(1));
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let config = match AppConfig::resolve(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 {}", e.recovery_suggestion());
            std::process::exit(exit_code(&e).max(1));
        }
    };

    logger::init_logger(config.verbose, config.json_logs);
    tracing::info!("Starting cardio-risk batch assessment");
    tracing::debug!("Resolved config: {:?}", config);

    if let Err(e) = config.validate() {
        report_failure("Configuration validation failed", &e);
    }

    let mut source = FileArtifactSource::new(config.artifact_path());
    if let Some(metadata) = config.metadata_path() {
        source = source.with_metadata(metadata);
    }

    // load before reading any input so a bad artifact fails fast
    let model = match ModelRegistry::eager(source).and_then(|registry| registry.acquire()) {
        Ok(model) => model,
        Err(e) => report_failure("Model load failed", &e),
    };
    if !model.explainer().is_available() {
        tracing::warn!("⚠️ Attributions disabled; reports will carry empty shap_values");
    }

    let service = RiskService::with_threshold(model, config.threshold());
    let pipeline = BatchPipeline::new(LocalStorage::new(""), config, service);
    let engine = AssessmentEngine::new(pipeline);

    match engine.run().await {
        Ok(output_path) => {
            println!("✅ Assessment batch completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            let code = exit_code(&e);
            if code == 0 {
                tracing::warn!("⚠️ Batch finished with a warning: {}", e);
            } else {
                report_failure("Assessment batch failed", &e);
            }
        }
    }
}
