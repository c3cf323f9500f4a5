use crate::domain::decimal::Decimal;
use crate::domain::model::Unit;
use crate::domain::ports::{FrameParser, ParsedFrame};
use crate::utils::error::DecodeError;
use regex::Regex;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d+)?").expect("number pattern is valid"));

static TRAILING_UNIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-zµμ]+)\s*$").expect("unit pattern is valid"));

/// Trailing alphabetic token of a frame, if it names a known unit.
pub(crate) fn trailing_unit(line: &str) -> Option<Unit> {
    TRAILING_UNIT_RE
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| Unit::from_token(m.as_str()))
}

/// Tolerant parser for plain numeric output: the first signed decimal in the line is the
/// value, whatever surrounds it.
#[derive(Debug, Clone, Default)]
pub struct FirstNumberParser;

impl FirstNumberParser {
    pub fn new() -> Self {
        Self
    }
}

impl FrameParser for FirstNumberParser {
    fn name(&self) -> &'static str {
        "first_number"
    }

    fn parse(&self, line: &str) -> Result<ParsedFrame, DecodeError> {
        let token = NUMBER_RE
            .find(line)
            .ok_or_else(|| DecodeError::UnparseableFrame {
                line: line.to_string(),
                reason: "no numeric token".to_string(),
            })?;

        let value = Decimal::parse(token.as_str()).map_err(|e| DecodeError::UnparseableFrame {
            line: line.to_string(),
            reason: e.to_string(),
        })?;

        Ok(ParsedFrame {
            value,
            unit: trailing_unit(line),
        })
    }
}
