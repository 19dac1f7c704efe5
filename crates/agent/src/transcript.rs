//! Session transcripts — one plain-text audit file per analyzed post.
//!
//! Transcripts are write-only. A failed write is logged with `tracing` and
//! otherwise ignored; it never affects the analysis.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use calsync_core::analysis::AnalysisContext;
use calsync_core::message::{ContentPart, ToolResultContent};
use calsync_core::provider::ProviderResponse;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

const RULE_WIDTH: usize = 60;

/// Append-only log of one post's session.
#[async_trait]
pub trait Transcript: Send {
    async fn log_user_message(&mut self, text: &str);
    async fn log_turn(&mut self, turn: u32, response: &ProviderResponse, tool_results: &[ToolResultContent]);
    async fn log_final(&mut self, ctx: &AnalysisContext);
    async fn log_error(&mut self, message: &str);

    /// Where the transcript is written, if anywhere.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Opens a transcript for each post.
#[async_trait]
pub trait TranscriptFactory: Send + Sync {
    async fn open(&self, post_id: &str, now: DateTime<Utc>) -> Box<dyn Transcript>;
}

/// Discards everything.
pub struct NullTranscript;

#[async_trait]
impl Transcript for NullTranscript {
    async fn log_user_message(&mut self, _text: &str) {}
    async fn log_turn(&mut self, _turn: u32, _response: &ProviderResponse, _tool_results: &[ToolResultContent]) {}
    async fn log_final(&mut self, _ctx: &AnalysisContext) {}
    async fn log_error(&mut self, _message: &str) {}
}

#[async_trait]
impl TranscriptFactory for NullTranscript {
    async fn open(&self, _post_id: &str, _now: DateTime<Utc>) -> Box<dyn Transcript> {
        Box::new(NullTranscript)
    }
}

/// Writes `<dir>/<YYYYmmdd-HHMMSS>-<id tail>.log` per post.
pub struct FileTranscripts {
    dir: PathBuf,
}

impl FileTranscripts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl TranscriptFactory for FileTranscripts {
    async fn open(&self, post_id: &str, now: DateTime<Utc>) -> Box<dyn Transcript> {
        match FileTranscript::create(&self.dir, post_id, now).await {
            Ok(transcript) => Box::new(transcript),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Could not open session transcript");
                Box::new(NullTranscript)
            }
        }
    }
}

pub struct FileTranscript {
    path: PathBuf,
    file: File,
}

impl FileTranscript {
    pub async fn create(dir: &Path, post_id: &str, now: DateTime<Utc>) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}-{}.log", now.format("%Y%m%d-%H%M%S"), file_stem(post_id)));
        let file = OpenOptions::new().create(true).append(true).open(&path).await?;

        let mut transcript = Self { path, file };
        transcript
            .write(&format!(
                "Session started: {}\nPost ID: {post_id}\n{}\n\n",
                now.to_rfc3339(),
                "=".repeat(RULE_WIDTH)
            ))
            .await;
        Ok(transcript)
    }

    async fn write(&mut self, text: &str) {
        // tokio buffers file writes; flush so each section lands before the next call.
        let written = match self.file.write_all(text.as_bytes()).await {
            Ok(()) => self.file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "Transcript write failed");
        }
    }
}

#[async_trait]
impl Transcript for FileTranscript {
    async fn log_user_message(&mut self, text: &str) {
        self.write(&format!("=== USER MESSAGE ===\n{text}\n\n")).await;
    }

    async fn log_turn(&mut self, turn: u32, response: &ProviderResponse, tool_results: &[ToolResultContent]) {
        let usage = response.usage_or_default();
        let mut out = format!(
            "=== TURN {turn} ===\nStop reason: {}\nTokens: {} in / {} out\n\n--- Assistant ---\n",
            response.stop_reason, usage.prompt_tokens, usage.completion_tokens
        );
        if !response.message.content.is_empty() {
            out.push_str(&response.message.content);
            out.push('\n');
        }
        for call in &response.message.tool_calls {
            out.push_str(&format!("[TOOL CALL: {}]\n{}\n", call.name, pretty(&call.arguments)));
        }
        out.push('\n');

        if !tool_results.is_empty() {
            out.push_str("--- Tool Results ---\n");
            for result in tool_results {
                out.push_str(&format!("[{}]{}\n", result.tool_call_id, if result.is_error { " (error)" } else { "" }));
                for part in &result.parts {
                    match part {
                        ContentPart::Text { text } => out.push_str(&pretty(text)),
                        ContentPart::Image { media_type, .. } => out.push_str(&format!("[IMAGE: {media_type}]")),
                    }
                    out.push('\n');
                }
            }
            out.push('\n');
        }
        self.write(&out).await;
    }

    async fn log_final(&mut self, ctx: &AnalysisContext) {
        let usage = ctx.usage();
        let mut out = format!(
            "{}\n=== SESSION COMPLETE ===\nTurns: {}\nTotal tokens: {} in / {} out\nCost: ${:.4}\n",
            "=".repeat(RULE_WIDTH),
            ctx.turns(),
            usage.input_tokens,
            usage.output_tokens,
            usage.cost_usd
        );
        for (i, entry) in ctx.ledger().entries().iter().enumerate() {
            let decision = &entry.decision;
            out.push_str(&format!("Decision {}: {}\nReasoning: {}\n", i + 1, decision.action, decision.reasoning));
            if let Some(event) = &decision.event {
                out.push_str(&format!("Event: {} on {}\n", event.title, event.date));
            }
            if let Some(id) = &entry.calendar_event_id {
                out.push_str(&format!("Calendar event ID: {id}\n"));
            }
        }
        self.write(&out).await;
    }

    async fn log_error(&mut self, message: &str) {
        self.write(&format!("\n!!! ERROR !!!\n{message}\n")).await;
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Pretty-print JSON text; anything else passes through unchanged.
fn pretty(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .filter(|v| v.is_object() || v.is_array())
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| text.to_string())
}

/// The last 12 filename-safe characters of a post id. Feed ids are often
/// URLs, which share a prefix and differ at the end.
fn file_stem(post_id: &str) -> String {
    let safe: Vec<char> = post_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    let tail: String = safe[safe.len().saturating_sub(12)..].iter().collect();
    if tail.is_empty() { "post".into() } else { tail }
}
