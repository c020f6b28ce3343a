//! Handset hardware: hookswitch and keypad
//!
//! Every source turns physical input into discrete [`HardwareEvent`]s on a
//! channel. The [`Dispatcher`] consumes them and drives the
//! [`WakeController`]; nothing polls a shared flag.

mod console;
mod dispatch;
#[cfg(feature = "gpio")]
mod gpio;
mod keypad;
mod wake;

use std::fmt;
use std::thread::JoinHandle;

use crossbeam_channel::Sender;

pub use console::{parse_console_line, read_console};
pub use dispatch::Dispatcher;
pub use keypad::{KEYPAD_LAYOUT, Keypad, KeypadAction, key_at};
pub use wake::{WakeController, WakeState};

use crate::config::{HardwareConfig, HardwareSource};
use crate::Result;
#[cfg(not(feature = "gpio"))]
use crate::Error;

/// One key of the 4x3 telephone keypad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key(char);

impl Key {
    /// Accept only characters printed on the keypad
    #[must_use]
    pub fn new(c: char) -> Option<Self> {
        KEYPAD_LAYOUT
            .iter()
            .flatten()
            .any(|&k| k == c)
            .then_some(Self(c))
    }

    #[must_use]
    pub const fn as_char(self) -> char {
        self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A discrete input edge from the handset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEvent {
    /// Handset picked up (off-hook)
    HookLifted,
    /// Handset put back (on-hook)
    HookReplaced,
    /// A keypad key went down
    KeyPressed(Key),
}

/// Start the configured event source
///
/// Returns the source's threads; an empty list means no hardware, in which
/// case the caller treats the handset as permanently lifted. When every
/// returned thread ends, `events` is closed.
///
/// # Errors
///
/// Returns error if the source cannot be opened
pub fn spawn_source(
    config: &HardwareConfig,
    events: Sender<HardwareEvent>,
) -> Result<Vec<JoinHandle<()>>> {
    match config.source {
        HardwareSource::None => {
            tracing::info!("no handset hardware, staying awake");
            Ok(Vec::new())
        }
        HardwareSource::Console => {
            tracing::info!("console handset: type `up`, `down`, or a key, then Enter");
            let handle = std::thread::Builder::new()
                .name("hardware-console".to_string())
                .spawn(move || {
                    let stdin = std::io::stdin();
                    read_console(stdin.lock(), &events);
                })?;
            Ok(vec![handle])
        }
        #[cfg(feature = "gpio")]
        HardwareSource::Gpio => gpio::spawn(config, events),
        #[cfg(not(feature = "gpio"))]
        HardwareSource::Gpio => Err(Error::Config(
            "hardware.source = \"gpio\" needs a build with the `gpio` feature".to_string(),
        )),
    }
}
