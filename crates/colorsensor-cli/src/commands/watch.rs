//! Watch command implementation.
//!
//! Starts one central per sensor through a [`Monitor`] and prints every event
//! the centrals report. Nothing is retried: a sensor that fails or disconnects
//! stays closed, and the command ends once every sensor is closed, after
//! `--count` values, or on Ctrl-C.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use colorsensor_core::btle::default_adapter;
use colorsensor_core::radio::Radio;
use colorsensor_core::{
    BtleRadio, ConnectionState, DeviceEvent, Monitor, MonitorConfig, SensorEvent,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::cli::{OutputFormat, WatchArgs};
use crate::config::{Directory, resolve_stagger, resolve_timeout, validate_name};
use crate::format::{FormatOptions, format_event_json, format_event_text};

/// Output options for the watch loop.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    /// Stop after this many values; 0 for unlimited.
    pub count: u64,
    pub format: OutputFormat,
    pub format_opts: FormatOptions,
    /// Print only values and errors in text mode.
    pub quiet: bool,
}

/// Why the watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupted,
    CountReached,
    AllClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchSummary {
    pub values: u64,
    pub reason: StopReason,
}

pub async fn cmd_watch(
    directory: &Directory,
    args: WatchArgs,
    format_opts: FormatOptions,
    quiet: bool,
) -> Result<()> {
    let names: Vec<String> = if args.sensors.is_empty() {
        directory.list().iter().cloned().collect()
    } else {
        args.sensors.clone()
    };

    if names.is_empty() {
        if !quiet {
            println!("No sensors to watch.");
            println!();
            println!("Register a sensor with: colorsensor add <name>");
        }
        return Ok(());
    }
    for name in &names {
        validate_name(name)?;
    }

    let mut config =
        MonitorConfig::new().stagger(resolve_stagger(args.stagger_ms, directory.config()));
    if let Some(deadline) = resolve_timeout(args.timeout, directory.config()) {
        config = config.connect_deadline(deadline);
    }

    let adapter = default_adapter()
        .await
        .context("Failed to get Bluetooth adapter")?;
    let radio = BtleRadio::new(adapter)?;
    let monitor = Monitor::new(names, config, |_| Arc::new(radio.sibling()))?;

    if !quiet {
        eprintln!(
            "Watching {} sensor(s) | Press Ctrl+C to stop",
            monitor.len()
        );
    }

    let opts = WatchOptions {
        count: args.count,
        format: args.format,
        format_opts,
        quiet,
    };
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let result = run_watch(&monitor, &opts, &mut io::stdout(), shutdown).await;
    monitor.close_all();

    let summary = result?;
    if !quiet {
        match summary.reason {
            StopReason::Interrupted => eprintln!("\nShutting down..."),
            StopReason::CountReached => eprintln!("Completed {} readings.", summary.values),
            StopReason::AllClosed => eprintln!("All sensors closed."),
        }
    }
    Ok(())
}

/// Start every central of `monitor` and print its events to `out` until a
/// stop condition is met.
///
/// The caller closes the centrals afterwards.
pub async fn run_watch<R, W, F>(
    monitor: &Monitor<R>,
    opts: &WatchOptions,
    out: &mut W,
    shutdown: F,
) -> Result<WatchSummary>
where
    R: Radio,
    W: Write,
    F: Future<Output = ()>,
{
    let mut rx = monitor.subscribe();
    let starting = monitor.start();
    let deadline = monitor.deadline_expired();
    tokio::pin!(starting, deadline, shutdown);

    let mut started = false;
    let mut deadline_passed = false;
    let mut values = 0;
    let summary = |reason, values| WatchSummary { values, reason };

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(summary(StopReason::Interrupted, values)),
            _ = &mut starting, if !started => {
                started = true;
                if all_closed(monitor) {
                    return Ok(summary(StopReason::AllClosed, values));
                }
            }
            timed_out = &mut deadline, if !deadline_passed => {
                deadline_passed = true;
                for error in timed_out {
                    warn!("{}", error);
                }
                if started && all_closed(monitor) {
                    return Ok(summary(StopReason::AllClosed, values));
                }
            }
            received = rx.recv() => match received {
                Ok(event) => {
                    write_event(out, &event, opts)?;
                    if matches!(event.event, SensorEvent::ValueReceived(_)) {
                        values += 1;
                        if opts.count > 0 && values >= opts.count {
                            return Ok(summary(StopReason::CountReached, values));
                        }
                    }
                    if ends_attempt(&event.event) && started && all_closed(monitor) {
                        return Ok(summary(StopReason::AllClosed, values));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Output fell behind, events dropped");
                }
                Err(RecvError::Closed) => return Ok(summary(StopReason::AllClosed, values)),
            },
        }
    }
}

fn all_closed<R: Radio>(monitor: &Monitor<R>) -> bool {
    monitor.centrals().iter().all(|c| c.is_closed())
}

fn ends_attempt(event: &SensorEvent) -> bool {
    match event {
        SensorEvent::Error(kind) => kind.is_terminal(),
        SensorEvent::StateChanged(state) => *state == ConnectionState::Disconnected,
        SensorEvent::ValueReceived(_) => false,
    }
}

fn write_event<W: Write>(out: &mut W, event: &DeviceEvent, opts: &WatchOptions) -> Result<()> {
    match opts.format {
        OutputFormat::Json => writeln!(out, "{}", format_event_json(event)?)?,
        OutputFormat::Text => {
            if opts.quiet && matches!(event.event, SensorEvent::StateChanged(_)) {
                return Ok(());
            }
            writeln!(out, "{}", format_event_text(event, &opts.format_opts))?;
        }
    }
    out.flush()?;
    Ok(())
}
