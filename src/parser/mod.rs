pub mod lookup;
pub mod normalize;
pub mod payload;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::capture::InterceptedResponse;
use crate::record::AdRecord;

/// Records recovered from one intercepted response.
#[derive(Debug, Default)]
pub struct ParsedResponse {
    pub records: Vec<AdRecord>,
    pub rejected: usize,
}

/// Decode → extract → normalize for a single response.
///
/// Never fails: bad status codes, undecodable bodies and drifted schemas
/// all come back as an empty result.
pub fn process_response(resp: &InterceptedResponse, fetched_at: DateTime<Utc>) -> ParsedResponse {
    let mut out = ParsedResponse::default();

    if !(200..=299).contains(&resp.status) {
        debug!(url = %resp.url, status = resp.status, "Skipping non-success response");
        return out;
    }
    let Some(body) = resp.body.as_deref() else {
        debug!(url = %resp.url, "Response has no body");
        return out;
    };

    let documents = payload::decode_body(body);
    if documents.is_empty() {
        debug!(url = %resp.url, bytes = body.len(), "Response body is not JSON");
        return out;
    }

    for doc in &documents {
        let extraction = payload::extract(doc);
        if !extraction.anchor_found {
            debug!(url = %resp.url, "No search results path in payload (schema drift?)");
            continue;
        }
        for raw in &extraction.ads {
            match normalize::normalize(raw, fetched_at) {
                Ok(record) => out.records.push(record),
                Err(reason) => {
                    out.rejected += 1;
                    debug!(url = %resp.url, ?reason, "Rejected ad-like element");
                }
            }
        }
    }

    out
}
