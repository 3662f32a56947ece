pub mod api;
pub mod config;
pub mod dispute;
pub mod pins;
pub mod pipeline;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::api::types::AnalyzeResponse;
use crate::api::ApiContext;
use crate::config::AppConfig;
use crate::pipeline::analysis::{AnalysisError, BillAnalyzer, DocumentPayload, GeminiClient};

#[derive(Parser, Debug)]
#[command(name = "billcheck", version, about = "Audit utility bills with a hosted vision model")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the JSON API
    Serve {
        /// Listen address, overrides BILLCHECK_BIND
        #[arg(long)]
        bind: Option<String>,
    },
    /// Analyze one bill and print the record as JSON
    Analyze { file: PathBuf },
    /// Extract headline metrics from one bill and print them as JSON
    Metrics { file: PathBuf },
}

pub fn run() -> Result<(), String> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command {
        Commands::Serve { bind } => serve(config, bind),
        Commands::Analyze { file } => {
            let document = load_document(&file).map_err(|e| e.to_string())?;
            let analyzer = BillAnalyzer::new(build_client(&config)?);
            let report = analyzer.analyze(&document).map_err(describe_failure)?;
            print_json(&AnalyzeResponse::from(report))
        }
        Commands::Metrics { file } => {
            let document = load_document(&file).map_err(|e| e.to_string())?;
            let analyzer = BillAnalyzer::new(build_client(&config)?);
            let metrics = analyzer
                .extract_metrics(&document)
                .map_err(describe_failure)?;
            print_json(&metrics)
        }
    }
}

fn serve(config: AppConfig, bind: Option<String>) -> Result<(), String> {
    let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
    if config.api_key.is_none() {
        tracing::warn!("No model API key configured; analysis requests will be refused");
    }

    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("Failed to start runtime: {e}"))?;

    runtime.block_on(async move {
        let mut server = api::start_api_server(ApiContext::new(config), &bind).await?;
        tracing::info!(addr = %server.session.server_addr, "Listening, Ctrl-C to stop");

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;

        server.shutdown();
        server.wait().await;
        Ok(())
    })
}

fn build_client(config: &AppConfig) -> Result<Arc<GeminiClient>, String> {
    let key = config
        .api_key
        .as_deref()
        .ok_or_else(|| AnalysisError::MissingApiKey.to_string())?;
    GeminiClient::new(&config.api_base, key, &config.model, config.timeout_secs)
        .map(Arc::new)
        .map_err(|e| e.to_string())
}

/// Read a local bill. MIME comes from the extension, then magic bytes.
pub fn load_document(path: &Path) -> Result<DocumentPayload, AnalysisError> {
    let bytes = std::fs::read(path)?;
    let mime = mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
        .unwrap_or_default();
    DocumentPayload::from_bytes(&bytes, &mime)
}

fn describe_failure(err: AnalysisError) -> String {
    match err.raw_response() {
        Some(raw) => format!("{err} (last response was {} chars)", raw.len()),
        None => err.to_string(),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| format!("Serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}
