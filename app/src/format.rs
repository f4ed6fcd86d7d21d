//! Human-readable rendering for the CLI.

use crate::models::{DownloadStatus, ModelState};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Decimal units, one fractional digit above bytes
pub fn bytes(n: u64) -> String {
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", n, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn eta(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h {:02}m", h, m)
    } else if m > 0 {
        format!("{}m {:02}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// One status line for a model, e.g. `downloading 42% 12.3 MB/s eta 1m 05s`
pub fn status_line(state: &ModelState) -> String {
    let mut line = state.status.to_string().to_lowercase();

    match state.status {
        DownloadStatus::Downloading => {
            if state.progress_indeterminate {
                line.push_str(" (size unknown)");
            } else {
                line.push_str(&format!(" {:>3.0}%", state.progress * 100.0));
            }
            if let Some(bps) = state.bytes_per_second {
                line.push_str(&format!(" {}/s", bytes(bps)));
            }
            if let Some(secs) = state.eta_seconds {
                line.push_str(&format!(" eta {}", eta(secs)));
            }
        }
        DownloadStatus::Error => {
            if let Some(message) = &state.error_message {
                line.push_str(&format!(": {}", message));
            }
        }
        _ => {}
    }

    if state.has_partial_file && state.status != DownloadStatus::Downloading {
        line.push_str(" [partial file]");
    }
    line
}
