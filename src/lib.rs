pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;
pub use config::AppConfig;

pub use adapters::{CsvReadingSink, SerialOpener, SerialPortEnumerator};
pub use app::runner::{run_session, SessionOptions};
pub use core::acquisition::{AcquisitionLoop, AcquisitionSummary, StopSignal};
pub use utils::error::{LsmError, Result};
