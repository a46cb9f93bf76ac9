use std::time::Duration;

use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{CaptureError, CaptureEvent, InterceptedResponse};

const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;
const LIBRARY_URL: &str = "https://www.facebook.com/ads/library/";

/// Puppeteer function run inside Browserless. Opens the page, records every
/// GraphQL response, and scrolls until the page stops producing new ones.
const CAPTURE_SCRIPT: &str = r#"
export default async function ({ page, context }) {
  const events = [];
  let fresh = 0;
  page.on('response', async (res) => {
    if (!res.url().includes('/api/graphql')) return;
    let body = null;
    try { body = await res.text(); } catch (e) {}
    events.push({ kind: 'response', url: res.url(), status: res.status(), body });
    fresh += 1;
  });
  try {
    await page.goto(context.url, { waitUntil: 'networkidle2', timeout: context.navTimeoutMs });
  } catch (e) {
    return { data: { navigated: false, error: String(e), events }, type: 'application/json' };
  }
  let idle = 0;
  for (let i = 0; i < context.scrollLimit && idle < context.maxIdleProbes; i++) {
    fresh = 0;
    await page.evaluate(() => window.scrollTo(0, document.body.scrollHeight));
    await new Promise((r) => setTimeout(r, context.scrollPauseMs));
    const grew = fresh > 0;
    idle = grew ? 0 : idle + 1;
    events.push({ kind: 'probe', new_content: grew });
  }
  return { data: { navigated: true, error: null, events }, type: 'application/json' };
}
"#;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub country: String,
    pub scroll_limit: usize,
    pub max_idle_probes: usize,
    pub scroll_pause: Duration,
    pub nav_timeout: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            country: "ALL".into(),
            scroll_limit: 200,
            max_idle_probes: 3,
            scroll_pause: Duration::from_millis(2500),
            nav_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
struct ScriptOutput {
    navigated: bool,
    error: Option<String>,
    #[serde(default)]
    events: Vec<ScriptEvent>,
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ScriptEvent {
    Response {
        url: String,
        status: u16,
        body: Option<String>,
    },
    Probe {
        new_content: bool,
    },
}

impl From<ScriptEvent> for CaptureEvent {
    fn from(ev: ScriptEvent) -> Self {
        match ev {
            ScriptEvent::Response { url, status, body } => {
                CaptureEvent::Response(InterceptedResponse { url, status, body })
            }
            ScriptEvent::Probe { new_content } => CaptureEvent::Probe { new_content },
        }
    }
}

/// Ads Library listing for every ad a page has run.
pub fn library_url(page_id: &str, country: &str) -> String {
    format!(
        "{LIBRARY_URL}?active_status=all&ad_type=all&country={country}&view_all_page_id={page_id}&search_type=page&media_type=all"
    )
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>, timeout: Duration) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    /// Capture one page and push its events into `tx`. A closed channel means
    /// the consumer has enough and is not an error.
    pub async fn capture_page(
        &self,
        page_id: &str,
        opts: &CaptureOptions,
        tx: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), CaptureError> {
        let url = library_url(page_id, &opts.country);
        info!(page_id, url = %url, "Starting browser capture");

        let output = self.run_with_retry(&url, opts).await?;
        if !output.navigated {
            return Err(CaptureError::Navigation {
                url,
                message: output.error.unwrap_or_default(),
            });
        }

        let total = output.events.len();
        for ev in output.events {
            if tx.send(ev.into()).await.is_err() {
                info!(page_id, "Consumer stopped, discarding remaining capture events");
                break;
            }
        }
        info!(page_id, events = total, "Browser capture finished");
        Ok(())
    }

    async fn run_with_retry(&self, url: &str, opts: &CaptureOptions) -> Result<ScriptOutput, CaptureError> {
        let mut attempt = 0;
        loop {
            match self.run_script(url, opts).await {
                Err(CaptureError::Api { status, message })
                    if attempt < MAX_RETRIES && (status == 429 || status >= 500) =>
                {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        status,
                        attempt = attempt + 1,
                        "Browserless returned {}, backing off {:.1}s: {}",
                        status,
                        backoff.as_secs_f64(),
                        message
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn run_script(&self, url: &str, opts: &CaptureOptions) -> Result<ScriptOutput, CaptureError> {
        let mut endpoint = format!("{}/function", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }

        let body = serde_json::json!({
            "code": CAPTURE_SCRIPT,
            "context": {
                "url": url,
                "scrollLimit": opts.scroll_limit,
                "maxIdleProbes": opts.max_idle_probes,
                "scrollPauseMs": opts.scroll_pause.as_millis() as u64,
                "navTimeoutMs": opts.nav_timeout.as_millis() as u64,
            }
        });

        let resp = self.client.post(&endpoint).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(CaptureError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        parse_output(&text)
    }
}

fn parse_output(text: &str) -> Result<ScriptOutput, CaptureError> {
    serde_json::from_str(text).map_err(|e| CaptureError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_url_targets_page() {
        let url = library_url("12345", "US");
        assert!(url.starts_with("https://www.facebook.com/ads/library/?"));
        assert!(url.contains("view_all_page_id=12345"));
        assert!(url.contains("country=US"));
    }

    #[test]
    fn script_output_keeps_event_order() {
        let text = r#"{"navigated":true,"error":null,"events":[
            {"kind":"response","url":"https://www.facebook.com/api/graphql/","status":200,"body":"{}"},
            {"kind":"probe","new_content":true},
            {"kind":"probe","new_content":false}
        ]}"#;
        let out = parse_output(text).unwrap();
        let events: Vec<CaptureEvent> = out.events.into_iter().map(Into::into).collect();
        assert!(matches!(&events[0], CaptureEvent::Response(r) if r.status == 200));
        assert!(matches!(events[1], CaptureEvent::Probe { new_content: true }));
        assert!(matches!(events[2], CaptureEvent::Probe { new_content: false }));
    }

    #[test]
    fn garbage_output_is_decode_error() {
        assert!(matches!(parse_output("<html>"), Err(CaptureError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let client = BrowserlessClient::new("http://127.0.0.1:9", None, Duration::from_secs(2)).unwrap();
        let (tx, _rx) = mpsc::channel(4);
        let err = client
            .capture_page("1", &CaptureOptions::default(), tx)
            .await
            .unwrap_err();
        assert!(matches!(err, CaptureError::Network(_)));
    }
}
