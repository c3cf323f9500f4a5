mod first_number;
mod prefixed;

pub use first_number::FirstNumberParser;
pub use prefixed::PrefixedParser;

use crate::config::toml_config::{ProtocolConfig, ProtocolKind};
use crate::domain::ports::FrameParser;
use crate::utils::error::ConfigError;
use std::sync::Arc;

/// Parser strategy for the configured instrument output mode.
pub fn build_parser(config: &ProtocolConfig) -> Result<Arc<dyn FrameParser>, ConfigError> {
    match config.kind {
        ProtocolKind::FirstNumber => Ok(Arc::new(FirstNumberParser::new())),
        ProtocolKind::Prefixed => {
            let prefix = config
                .prefix
                .as_deref()
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ConfigError::Missing {
                    field: "protocol.prefix".to_string(),
                })?;
            Ok(Arc::new(PrefixedParser::new(prefix)))
        }
    }
}
