//! Output formatting for sensor events, as text or JSON lines.

use anyhow::Result;
use colorsensor_core::{ColorValue, ConnectionState, DeviceEvent, ErrorKind, SensorEvent};
use owo_colors::OwoColorize;

/// Block drawn in the sensor's color next to the hex value.
const SWATCH: &str = "\u{2588}\u{2588}\u{2588}\u{2588}";

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self { no_color }
    }
}

/// Human-readable name of a connection milestone.
pub fn state_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Scanning => "scanning",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
        ConnectionState::SetupFinished => "ready",
        ConnectionState::Disconnected => "disconnected",
    }
}

/// Render a color as `#RRGGBB`, followed by a truecolor swatch unless colors
/// are disabled.
pub fn format_color(value: &ColorValue, opts: &FormatOptions) -> String {
    let hex = format!("#{}", value.hex_string());
    if opts.no_color {
        hex
    } else {
        let [r, g, b] = *value.as_bytes();
        format!("{} {}", hex.bold(), SWATCH.truecolor(r, g, b))
    }
}

fn format_state(state: ConnectionState, opts: &FormatOptions) -> String {
    let label = state_label(state);
    if opts.no_color {
        return label.to_string();
    }
    match state {
        ConnectionState::SetupFinished => label.green().to_string(),
        ConnectionState::Disconnected => label.yellow().to_string(),
        _ => label.dimmed().to_string(),
    }
}

fn format_error(kind: ErrorKind, opts: &FormatOptions) -> String {
    let text = format!("error: {}", kind);
    if opts.no_color {
        text
    } else if kind.is_terminal() {
        text.red().to_string()
    } else {
        text.yellow().to_string()
    }
}

/// Format one event as a text line: `HH:MM:SS  <device>  <payload>`.
pub fn format_event_text(event: &DeviceEvent, opts: &FormatOptions) -> String {
    let time = event.received_at.time();
    let timestamp = format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    );
    let payload = match event.event {
        SensorEvent::StateChanged(state) => format_state(state, opts),
        SensorEvent::ValueReceived(ref value) => format_color(value, opts),
        SensorEvent::Error(kind) => format_error(kind, opts),
    };
    if opts.no_color {
        format!("{}  {}  {}", timestamp, event.device, payload)
    } else {
        format!("{}  {}  {}", timestamp.dimmed(), event.device.cyan(), payload)
    }
}

/// Format one event as a single JSON line.
pub fn format_event_json(event: &DeviceEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
