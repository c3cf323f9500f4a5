use crate::app::protocols::first_number::trailing_unit;
use crate::domain::decimal::Decimal;
use crate::domain::ports::{FrameParser, ParsedFrame};
use crate::utils::error::DecodeError;
use regex::Regex;
use std::sync::LazyLock;

static BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([-+]?\d+(?:\.\d+)?)\s*([A-Za-zµμ]+)?$").expect("body pattern is valid")
});

/// Strict parser for instruments that tag each frame with a fixed code (e.g. `01A+0.110`).
///
/// The body after the prefix must be exactly one number and an optional known unit.
#[derive(Debug, Clone)]
pub struct PrefixedParser {
    prefix: String,
}

impl PrefixedParser {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn unparseable(line: &str, reason: impl Into<String>) -> DecodeError {
        DecodeError::UnparseableFrame {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

impl FrameParser for PrefixedParser {
    fn name(&self) -> &'static str {
        "prefixed"
    }

    fn parse(&self, line: &str) -> Result<ParsedFrame, DecodeError> {
        let body = line
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| Self::unparseable(line, format!("missing prefix {:?}", self.prefix)))?
            .trim();

        let caps = BODY_RE
            .captures(body)
            .ok_or_else(|| Self::unparseable(line, "body is not a single number"))?;

        let value = caps
            .get(1)
            .map(|m| Decimal::parse(m.as_str()))
            .ok_or_else(|| Self::unparseable(line, "no numeric token"))?
            .map_err(|e| Self::unparseable(line, e.to_string()))?;

        let unit = match caps.get(2) {
            Some(token) => Some(
                trailing_unit(token.as_str())
                    .ok_or_else(|| Self::unparseable(line, format!("unknown unit {:?}", token.as_str())))?,
            ),
            None => None,
        };

        Ok(ParsedFrame { value, unit })
    }
}
