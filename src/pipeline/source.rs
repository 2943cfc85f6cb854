//! Event source abstraction.
//!
//! Provides a unified trait for reading raw events from different inputs:
//! the seeded synthetic generator, JSONL replay files, and JSONL on stdin.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::acquisition::SyntheticGenerator;
use crate::types::RawEvent;

/// Events produced by a source.
#[derive(Debug)]
pub enum SourceEvent {
    Event(RawEvent),
    /// No more data
    Eof,
}

/// Where raw events come from.
///
/// The processing loop calls [`next_event`](EventSource::next_event) in a
/// `select!` with cancellation and injected control events.
#[async_trait]
pub trait EventSource: Send + 'static {
    async fn next_event(&mut self) -> Result<SourceEvent>;

    fn source_name(&self) -> &str;

    /// Observe an injected fault or clear before it is routed.
    ///
    /// Sources that model the physical plant react to it; replays ignore it.
    fn on_control(&mut self, _event: &RawEvent) {}
}

/// Parse one JSONL line. Blank lines yield `None`; bad lines are logged and skipped.
fn parse_line(line: &str, source: &str, line_no: usize) -> Option<RawEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<RawEvent>(line) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(source, line = line_no, error = %e, "[Source] Skipping malformed event");
            None
        }
    }
}

// ============================================================================
// Replay Source (JSONL file)
// ============================================================================

/// Replays a JSONL event file with optional inter-event delay.
pub struct ReplaySource {
    events: std::vec::IntoIter<RawEvent>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(events: Vec<RawEvent>, delay_ms: u64) -> Self {
        Self {
            events: events.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Load every well-formed line of a JSONL file.
    pub async fn from_file(path: &Path, delay_ms: u64) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let events: Vec<RawEvent> = contents
            .lines()
            .enumerate()
            .filter_map(|(i, line)| parse_line(line, "replay", i + 1))
            .collect();
        tracing::info!(path = %path.display(), events = events.len(), "[Source] Replay file loaded");
        Ok(Self::new(events, delay_ms))
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.events.next() {
            Some(event) => {
                self.yielded_first = true;
                Ok(SourceEvent::Event(event))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// Stdin Source (JSONL, one event per line)
// ============================================================================

/// Reads JSONL raw events from stdin.
///
/// `cat events.jsonl | renewcast --source stdin`
///
/// A partially read line survives a cancelled `next_event`; the buffer is
/// only cleared once a complete line has been taken.
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
    line_no: usize,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(1024),
            line_no: 0,
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for StdinSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 && self.line_buffer.is_empty() {
                return Ok(SourceEvent::Eof);
            }
            self.line_no += 1;
            let parsed = parse_line(&self.line_buffer, "stdin", self.line_no);
            self.line_buffer.clear();
            if let Some(event) = parsed {
                return Ok(SourceEvent::Event(event));
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}

// ============================================================================
// Synthetic Source
// ============================================================================

/// Paces the synthetic generator in wall-clock time.
///
/// One batch (weather first, then telemetry for every plant) is produced per
/// simulated tick; `speed` compresses the tick interval. Injected faults and
/// clears are forwarded to the generator so the simulated plants react.
pub struct SyntheticSource {
    generator: SyntheticGenerator,
    pending: VecDeque<RawEvent>,
    tick_delay_ms: u64,
    max_ticks: Option<u64>,
    ticks: u64,
}

impl SyntheticSource {
    pub fn new(generator: SyntheticGenerator, tick_delay_ms: u64, max_ticks: Option<u64>) -> Self {
        Self {
            generator,
            pending: VecDeque::new(),
            tick_delay_ms,
            max_ticks,
            ticks: 0,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[async_trait]
impl EventSource for SyntheticSource {
    async fn next_event(&mut self) -> Result<SourceEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(SourceEvent::Event(event));
        }
        if self.max_ticks.is_some_and(|max| self.ticks >= max) {
            return Ok(SourceEvent::Eof);
        }
        if self.ticks > 0 && self.tick_delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.tick_delay_ms)).await;
        }
        self.ticks += 1;
        self.pending.extend(self.generator.next_batch());
        match self.pending.pop_front() {
            Some(event) => Ok(SourceEvent::Event(event)),
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }

    fn on_control(&mut self, event: &RawEvent) {
        match event {
            RawEvent::Fault(fault) => self.generator.apply_fault(fault),
            RawEvent::Clear(clear) => self.generator.clear(clear.plant_id.as_deref()),
            RawEvent::Telemetry(_) | RawEvent::Weather(_) => {}
        }
    }
}
