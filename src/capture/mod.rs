pub mod browserless;
pub mod har;

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

static GRAPHQL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/api/graphql/?(\?|$)").unwrap());

/// A network response seen by the browser, body undecoded.
#[derive(Debug, Clone)]
pub struct InterceptedResponse {
    pub url: String,
    pub status: u16,
    pub body: Option<String>,
}

impl InterceptedResponse {
    pub fn is_graphql(&self) -> bool {
        GRAPHQL_RE.is_match(&self.url)
    }
}

/// What a capture collaborator pushes to the sync engine.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Response(InterceptedResponse),
    /// Result of one scroll attempt: did the page load anything new?
    Probe { new_content: bool },
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Browserless error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Could not decode capture output: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::Network(err.to_string())
    }
}
