use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use tracing::{info, warn};

use super::InterceptedResponse;

#[derive(Deserialize)]
struct Har {
    log: HarLog,
}

#[derive(Deserialize)]
struct HarLog {
    #[serde(default)]
    entries: Vec<HarEntry>,
}

#[derive(Deserialize)]
struct HarEntry {
    request: HarRequest,
    response: HarResponse,
}

#[derive(Deserialize)]
struct HarRequest {
    url: String,
}

#[derive(Deserialize)]
struct HarResponse {
    status: u16,
    #[serde(default)]
    content: HarContent,
}

#[derive(Deserialize, Default)]
struct HarContent {
    text: Option<String>,
    encoding: Option<String>,
}

/// Load a browser HAR export, keeping only GraphQL responses, in file order.
pub fn read_responses(path: &Path) -> Result<Vec<InterceptedResponse>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read HAR file {}", path.display()))?;
    let responses = parse(&raw).with_context(|| format!("Invalid HAR file {}", path.display()))?;
    info!(path = %path.display(), responses = responses.len(), "Loaded GraphQL responses from HAR");
    Ok(responses)
}

fn parse(raw: &str) -> Result<Vec<InterceptedResponse>> {
    let har: Har = serde_json::from_str(raw)?;
    let responses = har
        .log
        .entries
        .into_iter()
        .map(|e| InterceptedResponse {
            body: decode_content(&e.request.url, e.response.content),
            url: e.request.url,
            status: e.response.status,
        })
        .filter(InterceptedResponse::is_graphql)
        .collect();
    Ok(responses)
}

fn decode_content(url: &str, content: HarContent) -> Option<String> {
    let text = content.text?;
    if content.encoding.as_deref() != Some("base64") {
        return Some(text);
    }
    match base64::engine::general_purpose::STANDARD.decode(text.as_bytes()) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            warn!(url, error = %e, "Undecodable base64 body in HAR entry");
            None
        }
    }
}
