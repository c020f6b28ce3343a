//! GPIO character-device handset (Raspberry Pi wiring)
//!
//! The hookswitch line reads low while the handset is lifted. Keypad
//! columns idle high; a key press raises its row, and the column is found
//! by driving one column high at a time and re-reading the row.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use gpio_cdev::{Chip, EventRequestFlags, EventType, LineEventHandle, LineRequestFlags, MultiLineHandle};

use super::keypad::key_at;
use super::HardwareEvent;
use crate::config::HardwareConfig;
use crate::{Error, Result};

const CONSUMER: &str = "handset";

/// Time for a driven column to settle before its row is read
const SETTLE: Duration = Duration::from_millis(1);

fn gpio_err(e: gpio_cdev::errors::Error) -> Error {
    Error::Hardware(e.to_string())
}

/// Open the chip and start one thread for the hookswitch and one per
/// keypad row
pub(super) fn spawn(
    config: &HardwareConfig,
    events: Sender<HardwareEvent>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut chip = open_chip(&config.chip)?;
    let mut handles = Vec::with_capacity(1 + config.row_pins.len());

    let hook = chip
        .get_line(config.hook_pin)
        .and_then(|line| {
            line.events(
                LineRequestFlags::INPUT,
                EventRequestFlags::BOTH_EDGES,
                CONSUMER,
            )
        })
        .map_err(gpio_err)?;

    let debounce = config.debounce;
    let tx = events.clone();
    handles.push(
        std::thread::Builder::new()
            .name("hardware-hook".to_string())
            .spawn(move || {
                if let Err(e) = watch_hook(hook, &tx, debounce) {
                    tracing::error!(error = %e, "hookswitch monitor stopped");
                }
            })?,
    );

    let columns = chip
        .get_lines(&config.col_pins)
        .and_then(|lines| {
            let idle = vec![1; config.col_pins.len()];
            lines.request(LineRequestFlags::OUTPUT, &idle, CONSUMER)
        })
        .map_err(gpio_err)?;
    let columns = Arc::new(Mutex::new(columns));
    let col_count = config.col_pins.len();

    for (row, &pin) in config.row_pins.iter().enumerate() {
        let handle = chip
            .get_line(pin)
            .and_then(|line| {
                line.events(
                    LineRequestFlags::INPUT,
                    EventRequestFlags::RISING_EDGE,
                    CONSUMER,
                )
            })
            .map_err(gpio_err)?;

        let columns = Arc::clone(&columns);
        let tx = events.clone();
        handles.push(
            std::thread::Builder::new()
                .name(format!("hardware-row{row}"))
                .spawn(move || {
                    if let Err(e) = watch_row(row, handle, &columns, col_count, &tx, debounce) {
                        tracing::error!(row, error = %e, "keypad row monitor stopped");
                    }
                })?,
        );
    }

    tracing::info!(
        chip = %config.chip.display(),
        hook_pin = config.hook_pin,
        rows = ?config.row_pins,
        cols = ?config.col_pins,
        "gpio handset initialized"
    );

    Ok(handles)
}

fn open_chip(path: &Path) -> Result<Chip> {
    Chip::new(path).map_err(|e| Error::Hardware(format!("cannot open {}: {e}", path.display())))
}

/// Emit a hook event whenever the settled level changes
fn watch_hook(
    mut handle: LineEventHandle,
    events: &Sender<HardwareEvent>,
    debounce: Duration,
) -> Result<()> {
    let mut lifted = handle.get_value().map_err(gpio_err)? == 0;
    if lifted && events.send(HardwareEvent::HookLifted).is_err() {
        return Ok(());
    }

    loop {
        handle.get_event().map_err(gpio_err)?;
        std::thread::sleep(debounce);

        let now_lifted = handle.get_value().map_err(gpio_err)? == 0;
        if now_lifted == lifted {
            continue;
        }
        lifted = now_lifted;

        let event = if lifted {
            HardwareEvent::HookLifted
        } else {
            HardwareEvent::HookReplaced
        };
        if events.send(event).is_err() {
            return Ok(());
        }
    }
}

fn watch_row(
    row: usize,
    mut handle: LineEventHandle,
    columns: &Mutex<MultiLineHandle>,
    col_count: usize,
    events: &Sender<HardwareEvent>,
    debounce: Duration,
) -> Result<()> {
    let mut last_press: Option<Instant> = None;

    loop {
        let event = handle.get_event().map_err(gpio_err)?;
        if event.event_type() != EventType::RisingEdge {
            continue;
        }
        if last_press.is_some_and(|at| at.elapsed() < debounce) {
            continue;
        }

        let Some(col) = probe_column(&handle, columns, col_count)? else {
            continue;
        };
        last_press = Some(Instant::now());

        if let Some(key) = key_at(row, col) {
            tracing::debug!(%key, "key pressed");
            if events.send(HardwareEvent::KeyPressed(key)).is_err() {
                return Ok(());
            }
        }
    }
}

/// Find the column whose drive the row follows
fn probe_column(
    row: &LineEventHandle,
    columns: &Mutex<MultiLineHandle>,
    col_count: usize,
) -> Result<Option<usize>> {
    let columns = columns.lock().unwrap_or_else(PoisonError::into_inner);
    let mut found = None;

    for col in 0..col_count {
        let mut drive = vec![0; col_count];
        drive[col] = 1;
        columns.set_values(&drive).map_err(gpio_err)?;
        std::thread::sleep(SETTLE);

        if row.get_value().map_err(gpio_err)? == 1 {
            found = Some(col);
            break;
        }
    }

    columns
        .set_values(&vec![1; col_count])
        .map_err(gpio_err)?;
    Ok(found)
}
