use crate::domain::model::{Reading, Unit};
use crate::domain::ports::FrameParser;
use crate::utils::error::DecodeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Crlf,
    Lf,
    Cr,
}

impl LineEnding {
    /// Byte that completes a frame. For CRLF the CR is trimmed off the line afterwards.
    pub fn terminator(&self) -> u8 {
        match self {
            LineEnding::Crlf | LineEnding::Lf => b'\n',
            LineEnding::Cr => b'\r',
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub readings: u64,
    pub decode_errors: u64,
    pub resets: u64,
}

/// Turns a byte stream into readings, one line at a time.
///
/// Only the partial line survives between `feed` calls. `reset` drops it, which the
/// acquisition loop does on every disconnect so a frame split by a disconnect is never
/// decoded.
pub struct FrameDecoder {
    parser: Arc<dyn FrameParser>,
    terminator: u8,
    // CRLF frames may hold one CR past the limit, trimmed when the LF arrives
    crlf: bool,
    max_line_length: usize,
    default_unit: Option<Unit>,
    buffer: Vec<u8>,
    // inside an oversize line: drop everything up to the next terminator
    discarding: bool,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new(parser: Arc<dyn FrameParser>, line_ending: LineEnding, max_line_length: usize) -> Self {
        Self {
            parser,
            terminator: line_ending.terminator(),
            crlf: line_ending == LineEnding::Crlf,
            max_line_length: max_line_length.max(1),
            default_unit: None,
            buffer: Vec::with_capacity(64),
            discarding: false,
            stats: DecoderStats::default(),
        }
    }

    /// Unit used when a frame does not carry one.
    pub fn with_default_unit(mut self, unit: Option<Unit>) -> Self {
        self.default_unit = unit;
        self
    }

    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// Bytes of an incomplete frame currently buffered.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Result<Reading, DecodeError>> {
        self.feed_at(bytes, Utc::now())
    }

    /// Like [`feed`](Self::feed) with an explicit timestamp for the completed frames.
    pub fn feed_at(&mut self, bytes: &[u8], timestamp: DateTime<Utc>) -> Vec<Result<Reading, DecodeError>> {
        let mut out = Vec::new();

        for &byte in bytes {
            if self.discarding {
                if byte == self.terminator {
                    self.discarding = false;
                }
                continue;
            }

            if byte == self.terminator {
                let line = std::mem::take(&mut self.buffer);
                let text = String::from_utf8_lossy(&line);
                if let Some(result) = self.decode_line(&text, timestamp) {
                    out.push(result);
                }
                continue;
            }

            let cr_of_crlf = self.crlf && byte == b'\r' && self.buffer.len() == self.max_line_length;
            if self.buffer.len() >= self.max_line_length && !cr_of_crlf {
                let length = self.buffer.len() + 1;
                self.buffer.clear();
                self.discarding = true;
                self.stats.decode_errors += 1;
                tracing::debug!(
                    "Dropping oversize frame ({} bytes, limit {})",
                    length,
                    self.max_line_length
                );
                out.push(Err(DecodeError::FrameTooLong {
                    length,
                    limit: self.max_line_length,
                }));
                continue;
            }

            self.buffer.push(byte);
        }

        out
    }

    /// Decodes one complete line. Blank lines yield `None`.
    pub fn decode_line(&mut self, line: &str, timestamp: DateTime<Utc>) -> Option<Result<Reading, DecodeError>> {
        let text = line.trim();
        if text.is_empty() {
            return None;
        }
        tracing::trace!("Frame: {:?}", text);

        let result = self.parser.parse(text).map(|frame| Reading {
            value: frame.value,
            unit: frame.unit.or(self.default_unit),
            timestamp,
            raw_line: text.to_string(),
        });

        match result {
            Ok(_) => self.stats.readings += 1,
            Err(_) => self.stats.decode_errors += 1,
        }
        Some(result)
    }

    /// Discards any partial frame and returns how many bytes were dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.discarding = false;
        self.stats.resets += 1;
        dropped
    }
}
