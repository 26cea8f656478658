//! Page-graph export from an instrumented Chromium build
//!
//! `Page.generatePageGraph` is not part of the published protocol, so the
//! command is declared here by hand. The returned blob is handed on verbatim.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use chromiumoxide_types::{Command, Method, MethodId};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const GENERATE_PAGE_GRAPH: &str = "Page.generatePageGraph";

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratePageGraphParams {}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneratePageGraphReturns {
    pub data: String,
}

impl Method for GeneratePageGraphParams {
    fn identifier(&self) -> MethodId {
        GENERATE_PAGE_GRAPH.into()
    }
}

impl Command for GeneratePageGraphParams {
    type Response = GeneratePageGraphReturns;
}

/// Ask the browser for the page graph of `page`
pub async fn generate_page_graph(page: &Page) -> Result<String> {
    let graph = page
        .execute(GeneratePageGraphParams::default())
        .await
        .context("Page.generatePageGraph failed; is this a page-graph enabled browser?")?
        .result
        .data;
    debug!(target: "pagegraph::session", "Received page graph ({} bytes)", graph.len());
    Ok(graph)
}
