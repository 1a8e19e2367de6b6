//! GovSQL MCP server
//!
//! Model Context Protocol server that accepts natural language
//! questions, translates them to SQL through the governed workflow,
//! and executes them against DuckDB.

use std::sync::Arc;

use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use tokio::sync::Mutex;
use tracing::info;

use govsql_duck::DatabaseConfig;
use govsql_history::{HistoryStore, OpenAiEmbedder};
use govsql_workflow::{DuckBackend, OpenAiModel, Workflow, WorkflowSettings};

mod config;
mod logging;
mod mcp;

use config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config_path =
        std::env::var("GOVSQL_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load_or_default(&config_path)?;

    config.apply_logging_env();
    logging::init();

    let api_key = Config::openai_api_key()?;

    let mut openai_config = async_openai::config::OpenAIConfig::new().with_api_key(api_key);
    if let Some(api_base) = &config.llm.api_base {
        openai_config = openai_config.with_api_base(api_base);
    }
    let openai_client = async_openai::Client::with_config(openai_config);

    info!("Translation model: {}", config.llm.translation_model);
    info!("Rendering model: {}", config.llm.rendering_model);
    info!("Database: {}", config.database.path);

    // The history store must be reachable before the server starts.
    let embedder = Arc::new(OpenAiEmbedder::new(
        openai_client.clone(),
        config.llm.embedding_model.clone(),
    ));
    let history = HistoryStore::open(
        &config.history.directory,
        &config.history.collection,
        embedder,
    )?;
    let history = Arc::new(Mutex::new(history));

    let translator = Arc::new(OpenAiModel::new(
        openai_client.clone(),
        config.llm.translation_model.clone(),
    ));
    let renderer = Arc::new(OpenAiModel::new(
        openai_client,
        config.llm.rendering_model.clone(),
    ));
    let backend = Arc::new(DuckBackend::new(DatabaseConfig {
        path: config.database.path.clone(),
    }));

    let settings = WorkflowSettings {
        similarity_distance: config.history.similarity_distance,
        near_duplicate_epsilon: config.history.near_duplicate_epsilon,
        user: config.database.user.to_lowercase(),
    };
    let workflow = Arc::new(Workflow::new(
        translator, renderer, backend, history, settings,
    ));

    // Create MCP server handler
    let handler = mcp::GovSqlServerHandler::new(workflow);
    let server_info = mcp::GovSqlServerHandler::server_info();

    info!(
        "Starting GovSQL MCP server on {}:{}",
        config.server.host, config.server.port
    );
    info!("Protocol: MCP with SSE (Server-Sent Events) support");

    // Create MCP server with SSE support
    let server = hyper_server::create_server(
        server_info,
        handler,
        HyperServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            sse_support: true,
            ..Default::default()
        },
    );

    // Start the server
    server.start().await?;

    Ok(())
}
