use crate::domain::model::{ConnectionState, StatusEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    #[default]
    Human,
    /// One JSON object per event, for a GUI or another process reading stdout.
    Json,
}

/// Prints events until the acquisition side closes the channel. Returns how many were shown.
pub async fn render_events(mut rx: mpsc::Receiver<StatusEvent>, format: ConsoleFormat) -> u64 {
    let mut shown = 0;
    while let Some(event) = rx.recv().await {
        match format {
            ConsoleFormat::Human => println!("{}", format_event(&event)),
            ConsoleFormat::Json => match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!("Could not encode status event: {}", e),
            },
        }
        shown += 1;
    }
    shown
}

pub fn format_event(event: &StatusEvent) -> String {
    match event {
        StatusEvent::StateChanged { to, port, detail, .. } => {
            let icon = match to {
                ConnectionState::Connecting => "🔌",
                ConnectionState::Connected => "✅",
                ConnectionState::Disconnected => "⏸️",
                ConnectionState::Error => "❌",
            };
            let mut line = format!("{} {}", icon, to);
            if let Some(port) = port {
                line.push_str(&format!(" {}", port));
            }
            if let Some(detail) = detail {
                line.push_str(&format!(" ({})", detail));
            }
            line
        }
        StatusEvent::Measured {
            sequence,
            reading,
            verdict,
        } => {
            let sequence = sequence.map_or_else(|| "-".to_string(), |s| s.to_string());
            let unit = reading.unit.map(|u| format!(" {}", u)).unwrap_or_default();
            let mut line = format!(
                "#{} {}{} {} {}",
                sequence,
                reading.value,
                unit,
                verdict.status,
                verdict.rule_id.as_deref().unwrap_or("-")
            );
            if let Some(margin) = verdict.margin {
                line.push_str(&format!(" (margin {})", margin));
            }
            line
        }
        StatusEvent::BacklogWritten { sequence, reading } => {
            format!("💾 #{} {} written from backlog", sequence, reading.value)
        }
        StatusEvent::DecodeFailed { error } => format!("⚠️ {}", error),
        StatusEvent::SinkFailed {
            error,
            consecutive_failures,
            pending,
        } => format!(
            "💾 Log write failed ({} in a row, {} pending): {}",
            consecutive_failures, pending, error
        ),
    }
}
