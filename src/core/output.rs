// src/core/output.rs

use crate::constants::TRUNCATION_MARKER;
use serde::{Deserialize, Serialize};

/// One piece of child output, tagged with the stream it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputChunk {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

impl OutputChunk {
    /// Raw bytes of the chunk.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Stdout(bytes) | Self::Stderr(bytes) => bytes,
        }
    }

    /// Lossy UTF-8 view of the chunk.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }
}

/// Accumulates stdout, stderr and their receipt-ordered interleaving.
#[derive(Debug, Default)]
pub struct OutputCapture {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    combined: Vec<u8>,
}

/// Decoded and size-bounded output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub combined: String,
    pub truncated: bool,
}

impl OutputCapture {
    /// Appends `chunk` to its own stream and to the combined buffer.
    pub fn push(&mut self, chunk: &OutputChunk) {
        match chunk {
            OutputChunk::Stdout(bytes) => self.stdout.extend_from_slice(bytes),
            OutputChunk::Stderr(bytes) => self.stderr.extend_from_slice(bytes),
        }
        self.combined.extend_from_slice(chunk.bytes());
    }

    /// Decodes the buffers and applies head/tail truncation to each one independently.
    pub fn finish(self, max_output_size: usize) -> CapturedOutput {
        let (stdout, stdout_cut) = truncate_middle(&String::from_utf8_lossy(&self.stdout), max_output_size);
        let (stderr, stderr_cut) = truncate_middle(&String::from_utf8_lossy(&self.stderr), max_output_size);
        let (combined, combined_cut) =
            truncate_middle(&String::from_utf8_lossy(&self.combined), max_output_size);
        CapturedOutput {
            stdout,
            stderr,
            combined,
            truncated: stdout_cut || stderr_cut || combined_cut,
        }
    }
}

/// Keeps the head and tail halves of `text` around a marker so the result never exceeds
/// `max_bytes`. Returns the (possibly unchanged) text and whether anything was dropped.
///
/// Cuts only land on UTF-8 character boundaries. When `max_bytes` cannot even hold the
/// marker, only the head is kept.
pub fn truncate_middle(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }

    // Size the marker for the worst case so the final text cannot overshoot.
    let worst_marker = render_marker(text.len());
    let Some(budget) = max_bytes.checked_sub(worst_marker.len()).filter(|b| *b > 0) else {
        let head_end = floor_char_boundary(text, max_bytes);
        return (text.get(..head_end).unwrap_or_default().to_string(), true);
    };

    let head_end = floor_char_boundary(text, budget / 2);
    let tail_len = budget - budget / 2;
    let tail_start = ceil_char_boundary(text, text.len() - tail_len);
    let omitted = tail_start.saturating_sub(head_end);

    let head = text.get(..head_end).unwrap_or_default();
    let tail = text.get(tail_start..).unwrap_or_default();
    let marker = render_marker(omitted);

    let mut out = String::with_capacity(head.len() + marker.len() + tail.len());
    out.push_str(head);
    out.push_str(&marker);
    out.push_str(tail);
    (out, true)
}

fn render_marker(omitted: usize) -> String {
    TRUNCATION_MARKER.replace("{omitted}", &omitted.to_string())
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while i < text.len() && !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
