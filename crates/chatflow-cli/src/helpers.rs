//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, configuration loading, executor wiring,
//! and rendering of streamed events.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use chatflow_agent::llm::sim::describe_arguments;
use chatflow_agent::{
    CheckpointStore, GraphConfig, GraphExecutor, SimModel, StreamEvent, ToolRegistry,
};

use crate::tools::BuiltinTools;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load `.env`, the configuration file, and `CHATFLOW_*` overrides.
pub fn load_config(path: &Path) -> Result<GraphConfig> {
    if let Ok(env_path) = dotenvy::dotenv() {
        info!(path = %env_path.display(), "loaded .env");
    }

    let mut config = GraphConfig::load(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    config
        .apply_env()
        .context("invalid CHATFLOW_* environment override")?;
    config.validate().context("invalid configuration")?;

    info!(
        model = %config.model,
        max_steps = config.max_steps,
        trim_max_units = config.trim.max_units,
        "configuration ready"
    );
    Ok(config)
}

/// Wire the offline model, the built-in tools and a fresh checkpoint store.
pub fn build_executor(config: GraphConfig) -> GraphExecutor {
    let checkpoints = Arc::new(CheckpointStore::from_config(&config.checkpoint));
    let tools = ToolRegistry::new().with_adapter(Arc::new(BuiltinTools));
    GraphExecutor::new(Arc::new(SimModel::new()), tools, checkpoints, config)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Print one streamed event for a terminal user.
pub fn render_event(event: &StreamEvent, out: &mut impl Write) -> io::Result<()> {
    match event {
        StreamEvent::Connected => Ok(()),
        StreamEvent::Token { token } => {
            write!(out, "{token}")?;
            out.flush()
        }
        StreamEvent::ToolStart { tool, input } => {
            writeln!(out, "  [tool] {tool} {}", describe_arguments(input))
        }
        StreamEvent::ToolEnd { tool, output } => {
            let output = output.as_str().map_or_else(|| output.to_string(), str::to_owned);
            writeln!(out, "  [tool] {tool} -> {output}")
        }
        StreamEvent::Error { error } => writeln!(out, "\n  error: {error}"),
        StreamEvent::Done => writeln!(out),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
