use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::capture::{CaptureError, CaptureEvent, InterceptedResponse};
use crate::change::{classify, Change};
use crate::parser::{self, ParsedResponse};
use crate::record::PageMetadata;
use crate::session::{Accept, Session};
use crate::store::AdStore;

/// Whether the capture loop should keep feeding events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct FullOptions {
    pub max_ads: Option<usize>,
    /// Consecutive "nothing new" probes before giving up on the page.
    pub max_idle_probes: usize,
}

impl Default for FullOptions {
    fn default() -> Self {
        Self {
            max_ads: None,
            max_idle_probes: 3,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub total: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub rejected: usize,
    pub pages: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncSummary {
    pub page_id: String,
    pub seen: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl SyncSummary {
    pub fn updated(&self) -> usize {
        self.new + self.changed
    }
}

// ── Full capture ──

/// Collects every ad seen during one browsing session.
pub struct FullCapture {
    session: Session,
    opts: FullOptions,
    idle_probes: usize,
    rejected: usize,
    stopped: bool,
}

impl FullCapture {
    pub fn new(opts: FullOptions) -> Self {
        Self {
            session: Session::new(opts.max_ads),
            opts,
            idle_probes: 0,
            rejected: 0,
            stopped: false,
        }
    }

    pub fn handle(&mut self, event: CaptureEvent) -> Control {
        match event {
            CaptureEvent::Response(resp) => self.handle_response(&resp),
            CaptureEvent::Probe { new_content } => self.probe(new_content),
        }
    }

    pub fn handle_response(&mut self, resp: &InterceptedResponse) -> Control {
        if !resp.is_graphql() {
            return self.control();
        }
        self.ingest(parser::process_response(resp, Utc::now()))
    }

    pub fn ingest(&mut self, parsed: ParsedResponse) -> Control {
        self.rejected += parsed.rejected;
        for record in parsed.records {
            if self.stopped {
                break;
            }
            let id = record.id.clone();
            let outcome = self.session.accept(record);
            if !outcome.accepted() {
                info!(id = %id, cap = ?self.opts.max_ads, "Capture cap reached");
                self.stopped = true;
            } else if outcome == Accept::Replaced {
                debug!(id = %id, "Replaced earlier capture");
            }
        }
        if self.session.is_full() {
            self.stopped = true;
        }
        self.control()
    }

    pub fn probe(&mut self, new_content: bool) -> Control {
        if new_content {
            self.idle_probes = 0;
        } else {
            self.idle_probes += 1;
            if self.idle_probes >= self.opts.max_idle_probes {
                info!(probes = self.idle_probes, "No more content, ending capture");
                self.stopped = true;
            }
        }
        self.control()
    }

    pub fn size(&self) -> usize {
        self.session.size()
    }

    fn control(&self) -> Control {
        if self.stopped {
            Control::Stop
        } else {
            Control::Continue
        }
    }

    /// Persist new and changed records, then rewrite metadata for every page seen.
    pub fn finish(self, store: &mut dyn AdStore, now: DateTime<Utc>) -> Result<CaptureSummary> {
        let mut summary = CaptureSummary {
            rejected: self.rejected,
            ..Default::default()
        };
        let mut per_page: BTreeMap<String, usize> = BTreeMap::new();

        for record in self.session.into_records() {
            summary.total += 1;
            *per_page.entry(record.page_id.clone()).or_default() += 1;

            let previous = store.load(&record.page_id, &record.id)?;
            let change = classify(previous.as_ref(), &record);
            match change {
                Change::New => summary.new += 1,
                Change::Changed => summary.changed += 1,
                Change::Unchanged => summary.unchanged += 1,
            }
            if change.needs_save() {
                store.save(&record)?;
            }
        }

        summary.pages = per_page.len();
        for (page_id, total_ads) in per_page {
            store.save_metadata(&PageMetadata {
                page_id,
                last_synced: now,
                total_ads,
            })?;
        }

        info!(
            total = summary.total,
            new = summary.new,
            changed = summary.changed,
            pages = summary.pages,
            "Full capture saved"
        );
        Ok(summary)
    }
}

// ── Incremental ──

/// Refreshes one page against what is already stored, writing only differences.
pub struct IncrementalSync<'s> {
    store: &'s mut dyn AdStore,
    summary: SyncSummary,
}

impl<'s> IncrementalSync<'s> {
    pub fn new(store: &'s mut dyn AdStore, page_id: &str) -> Self {
        Self {
            store,
            summary: SyncSummary {
                page_id: page_id.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn handle(&mut self, event: CaptureEvent) -> Result<()> {
        match event {
            CaptureEvent::Response(resp) if resp.is_graphql() => {
                self.ingest(parser::process_response(&resp, Utc::now()))
            }
            _ => Ok(()),
        }
    }

    pub fn ingest(&mut self, parsed: ParsedResponse) -> Result<()> {
        self.summary.rejected += parsed.rejected;
        for record in parsed.records {
            if record.page_id != self.summary.page_id {
                continue;
            }
            self.summary.seen += 1;

            let previous = self.store.load(&record.page_id, &record.id)?;
            let change = classify(previous.as_ref(), &record);
            match change {
                Change::New => self.summary.new += 1,
                Change::Changed => self.summary.changed += 1,
                Change::Unchanged => {
                    self.summary.unchanged += 1;
                    continue;
                }
            }
            debug!(id = %record.id, ?change, "Saving ad");
            self.store.save(&record)?;
        }
        Ok(())
    }

    pub fn finish(self, now: DateTime<Utc>) -> Result<SyncSummary> {
        let previous_total = self
            .store
            .load_metadata(&self.summary.page_id)?
            .map(|m| m.total_ads)
            .unwrap_or(0);
        self.store.save_metadata(&PageMetadata {
            page_id: self.summary.page_id.clone(),
            last_synced: now,
            total_ads: previous_total + self.summary.new,
        })?;

        info!(
            page_id = %self.summary.page_id,
            new = self.summary.new,
            changed = self.summary.changed,
            unchanged = self.summary.unchanged,
            "Incremental sync saved"
        );
        Ok(self.summary)
    }
}

// ── Drivers ──

/// Task pushing capture events; resolves once the page is exhausted or the
/// receiver was closed.
pub type Producer = JoinHandle<std::result::Result<(), CaptureError>>;

/// Consume capture events until the stream ends or the capture asks to stop.
/// A failed producer fails the run before anything is written.
pub async fn run_full(
    mut rx: mpsc::Receiver<CaptureEvent>,
    producer: Producer,
    store: &mut dyn AdStore,
    opts: FullOptions,
) -> Result<CaptureSummary> {
    let mut capture = FullCapture::new(opts);
    while let Some(event) = rx.recv().await {
        if capture.handle(event) == Control::Stop {
            break;
        }
    }
    // Tell the producer nobody is listening any more.
    rx.close();
    info!(ads = capture.size(), "Capture stream ended");
    producer.await.context("Capture task panicked")??;
    capture.finish(store, Utc::now())
}

/// Incremental counterpart of [`run_full`]. Records are written as they are
/// classified, so a later failure keeps what was already saved.
pub async fn run_incremental(
    mut rx: mpsc::Receiver<CaptureEvent>,
    producer: Producer,
    store: &mut dyn AdStore,
    page_id: &str,
) -> Result<SyncSummary> {
    let mut sync = IncrementalSync::new(store, page_id);
    while let Some(event) = rx.recv().await {
        sync.handle(event)?;
    }
    producer.await.context("Capture task panicked")??;
    sync.finish(Utc::now())
}
