//! Graph serialization and HTML embedding.

use crate::config::OutputConfig;
use crate::schemas::Graph;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Line in the template that loads the graph at view time.
pub const DATA_PLACEHOLDER: &str = "const data = await fetch('./bubblemap.json').then(r => r.json());";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Template does not contain the data placeholder")]
    MissingPlaceholder,
}

/// Pretty-printed JSON as embedded in the page.
pub fn graph_json(graph: &Graph) -> Result<String, OutputError> {
    Ok(serde_json::to_string_pretty(graph)?)
}

/// Replace the template's data-loading line with an inline literal.
pub fn embed_graph(template: &str, graph: &Graph) -> Result<String, OutputError> {
    if !template.contains(DATA_PLACEHOLDER) {
        return Err(OutputError::MissingPlaceholder);
    }
    let json = graph_json(graph)?;
    Ok(template.replacen(DATA_PLACEHOLDER, &format!("const data = {};", json), 1))
}

/// Write the rendered HTML and, if configured, the raw JSON.
pub fn write_outputs(graph: &Graph, config: &OutputConfig) -> Result<(), OutputError> {
    info!("Reading template {:?}", config.template_path);
    let template = std::fs::read_to_string(&config.template_path).map_err(|source| OutputError::Io {
        path: config.template_path.clone(),
        source,
    })?;

    info!("Embedding data into HTML");
    let html = embed_graph(&template, graph)?;

    std::fs::write(&config.html_path, html).map_err(|source| OutputError::Io {
        path: config.html_path.clone(),
        source,
    })?;
    info!(
        "Wrote {:?} with {} nodes and {} links",
        config.html_path,
        graph.nodes.len(),
        graph.edges.len()
    );

    if let Some(json_path) = &config.json_path {
        std::fs::write(json_path, graph_json(graph)?).map_err(|source| OutputError::Io {
            path: json_path.clone(),
            source,
        })?;
        info!("Wrote {:?}", json_path);
    }

    Ok(())
}
