use crate::app::console::{self, ConsoleFormat};
use crate::app::protocols::build_parser;
use crate::config::toml_config::AppConfig;
use crate::core::acquisition::{AcquisitionLoop, AcquisitionSummary, StatusReporter, StopSignal};
use crate::core::classifier::Classifier;
use crate::core::decoder::FrameDecoder;
use crate::core::port_resolver::PortResolver;
use crate::domain::ports::{DeviceOpener, PortEnumerator, ReadingSink};
use crate::domain::rules::RuleSetHandle;
use crate::utils::error::{LsmError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Exit code when a second interrupt cuts shutdown short (128 + SIGINT).
pub const FORCED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub console: ConsoleFormat,
    /// Bounded capacity of the status channel.
    pub status_capacity: usize,
    /// File the rules are reloaded from on SIGHUP.
    pub config_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            console: ConsoleFormat::Human,
            status_capacity: 256,
            config_path: None,
        }
    }
}

/// Runs one acquisition session until `stop` is set (also set by Ctrl-C) or the log fails
/// for good.
///
/// The acquisition loop gets its own blocking thread; console output and signal handling
/// stay on the runtime.
pub async fn run_session<E, O, S>(
    config: &AppConfig,
    enumerator: E,
    opener: O,
    sink: S,
    stop: StopSignal,
    options: SessionOptions,
) -> Result<AcquisitionSummary>
where
    E: PortEnumerator + 'static,
    O: DeviceOpener + 'static,
    S: ReadingSink + 'static,
{
    let rules = RuleSetHandle::new(config.build_rule_set()?);
    let decoder = FrameDecoder::new(
        build_parser(&config.protocol)?,
        config.protocol.line_ending,
        config.protocol.max_line_length,
    )
    .with_default_unit(config.protocol.unit()?);
    let resolver = PortResolver::new(enumerator, &config.port_patterns())?
        .force_hint(config.serial.force_port);
    let settings = config.acquisition_settings()?;

    let (tx, rx) = mpsc::channel(options.status_capacity.max(1));
    let console = tokio::spawn(console::render_events(rx, options.console));

    let ctrl_c = tokio::spawn(handle_interrupts(tokio::signal::ctrl_c, stop.clone(), || {
        std::process::exit(FORCED_EXIT_CODE)
    }));
    let reload = spawn_reload_listener(options.config_path.clone(), rules.clone());

    let mut acquisition = AcquisitionLoop::new(
        resolver,
        opener,
        decoder,
        Classifier::new(rules),
        sink,
        StatusReporter::new(tx),
        settings,
    );

    let loop_stop = stop.clone();
    let joined = tokio::task::spawn_blocking(move || acquisition.run(&loop_stop)).await;

    ctrl_c.abort();
    if let Some(reload) = reload {
        reload.abort();
    }
    // the loop and its sender are gone, so the console drains and ends
    if let Err(e) = console.await {
        tracing::warn!("Console task ended abnormally: {}", e);
    }

    joined.map_err(|e| LsmError::IoError(std::io::Error::other(e.to_string())))?
}

/// The first interrupt asks the loop to stop. A second one while shutdown is still running
/// calls `force`.
async fn handle_interrupts<S, F>(mut next_signal: S, stop: StopSignal, force: impl FnOnce())
where
    S: FnMut() -> F,
    F: Future<Output = std::io::Result<()>>,
{
    if next_signal().await.is_err() {
        return;
    }
    tracing::info!("🛑 Interrupt received, stopping");
    stop.stop();

    if next_signal().await.is_ok() {
        tracing::warn!("🛑 Second interrupt, exiting without waiting for shutdown");
        force();
    }
}

/// Re-reads the configuration and swaps in its rule set. The old rules stay active when the
/// new ones do not load.
pub fn reload_rules(path: Option<&Path>, handle: &RuleSetHandle) -> Result<()> {
    let config = AppConfig::load(path)?;
    let rules = config.build_rule_set()?;
    let count = rules.rules().len();
    handle.replace(rules);
    tracing::info!("🔄 Classification rules reloaded ({} rules)", count);
    Ok(())
}

#[cfg(unix)]
fn spawn_reload_listener(
    path: Option<PathBuf>,
    handle: RuleSetHandle,
) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Rule reload on SIGHUP unavailable: {}", e);
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            if let Err(e) = reload_rules(path.as_deref(), &handle) {
                tracing::error!("❌ Rule reload failed, keeping current rules: {}", e);
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_listener(
    _path: Option<PathBuf>,
    _handle: RuleSetHandle,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}
