
use console::style;
use std::fmt::Write as _;
use std::path::Path;

use super::settings::{ApiKey, Config};

fn secret_state(key: Option<&ApiKey>) -> String {
    match key {
        Some(_) => style("set").green().to_string(),
        None => style("not set").red().to_string(),
    }
}

/// Human-readable summary of the effective configuration. Secrets are
/// reported as set or not set, never printed.
#[inline]
pub fn render_config(config: &Config, source: Option<&Path>) -> String {
    let mut out = String::new();
    let embedding = &config.embedding;
    let store = &config.store;
    let generation = &config.generation;
    let secrets = &config.secrets;

    let _ = writeln!(out, "{}", style("Current Configuration").bold().cyan());
    let _ = writeln!(out);

    let _ = writeln!(out, "{}", style("Embedding:").bold().yellow());
    let _ = writeln!(out, "  Provider: {}", style(embedding.provider).cyan());
    let _ = writeln!(
        out,
        "  Model: {}",
        style(embedding.model().unwrap_or_else(|| "(provider default)".to_string())).cyan()
    );
    let _ = writeln!(out, "  Dimension: {}", style(embedding.dimension()).cyan());
    if let Some(var) = embedding.provider.api_key_var() {
        let _ = writeln!(
            out,
            "  {}: {}",
            var,
            secret_state(secrets.embedding_key(embedding.provider))
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style("Vector Store:").bold().yellow());
    let _ = writeln!(out, "  Endpoint: {}", style(&store.endpoint).cyan());
    let _ = writeln!(out, "  Index: {}", style(&store.index).cyan());
    let _ = writeln!(out, "  Namespace: {}", style(&store.namespace).cyan());
    let _ = writeln!(out, "  Metric: {}", style(store.metric).cyan());
    let _ = writeln!(out, "  Top K: {}", style(store.top_k).cyan());
    let _ = writeln!(
        out,
        "  PINECONE_API_KEY: {}",
        secret_state(secrets.pinecone.as_ref())
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style("Generation:").bold().yellow());
    let _ = writeln!(out, "  Endpoint: {}", style(&generation.endpoint).cyan());
    let _ = writeln!(
        out,
        "  Model: {}",
        style(generation.model.as_deref().unwrap_or("(endpoint default)")).cyan()
    );
    let _ = writeln!(
        out,
        "  SEGMIND_API_KEY: {}",
        secret_state(secrets.segmind.as_ref())
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style("Chunking:").bold().yellow());
    let _ = writeln!(
        out,
        "  Size / Overlap: {} / {}",
        style(config.chunking.chunk_size).cyan(),
        style(config.chunking.chunk_overlap).cyan()
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "{}", style("Server:").bold().yellow());
    let _ = writeln!(
        out,
        "  Listen: {}",
        style(format!("{}:{}", config.server.host, config.server.port)).cyan()
    );
    let _ = writeln!(
        out,
        "  Allowed origins: {}",
        style(config.server.allowed_origins.join(", ")).cyan()
    );

    let _ = writeln!(out);
    match source {
        Some(path) => {
            let _ = writeln!(out, "Config file: {}", style(path.display()).dim());
        }
        None => {
            let _ = writeln!(out, "Config file: {}", style("(defaults)").dim());
        }
    }

    out
}

#[inline]
pub fn show_config(config: &Config, source: Option<&Path>) {
    print!("{}", render_config(config, source));
}
