use anyhow::Result;
use screenpilot::grid::GridRenderer;
use screenpilot::llm::{LlmClient, LlmConfig};
use screenpilot::pipeline::{Pipeline, PipelineConfig};
use screenpilot::server;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let client = LlmClient::new(LlmConfig::default())?;
    let pipeline = Arc::new(Pipeline::new(
        client.clone(),
        client,
        PipelineConfig::default(),
    ));
    let renderer = Arc::new(GridRenderer::from_env());

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8765".into());
    server::serve(&addr, pipeline, renderer).await
}
