//! Asleep/awake state driven by the hookswitch

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Whether the kiosk should be listening
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    /// Handset on-hook
    Asleep,
    /// Handset lifted
    Awake,
    /// Input source is gone; waiters are released for good
    Shutdown,
}

#[derive(Debug)]
struct Inner {
    state: WakeState,
    epoch: u64,
}

/// Two-state machine with a blocking wait for wake
///
/// Each transition to `Awake` starts a new epoch, so a caller can tell a
/// fresh lift apart from one it has already greeted.
#[derive(Debug)]
pub struct WakeController {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl Default for WakeController {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeController {
    /// Start asleep
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: WakeState::Asleep,
                epoch: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Start already awake in epoch 1
    #[must_use]
    pub const fn awake() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: WakeState::Awake,
                epoch: 1,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asleep -> Awake; returns `true` if the state changed
    pub fn wake(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != WakeState::Asleep {
            return false;
        }
        inner.state = WakeState::Awake;
        inner.epoch += 1;
        tracing::info!(epoch = inner.epoch, "handset lifted");
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Awake -> Asleep; returns `true` if the state changed
    pub fn sleep(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != WakeState::Awake {
            return false;
        }
        inner.state = WakeState::Asleep;
        tracing::info!(epoch = inner.epoch, "handset replaced");
        drop(inner);
        self.changed.notify_all();
        true
    }

    /// Release all waiters permanently
    pub fn shutdown(&self) {
        self.lock().state = WakeState::Shutdown;
        self.changed.notify_all();
    }

    #[must_use]
    pub fn state(&self) -> WakeState {
        self.lock().state
    }

    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.state() == WakeState::Awake
    }

    /// Still awake within the given epoch (no hang-up since)
    #[must_use]
    pub fn is_awake_in(&self, epoch: u64) -> bool {
        let inner = self.lock();
        inner.state == WakeState::Awake && inner.epoch == epoch
    }

    /// Block until awake and return the current epoch
    ///
    /// Returns `None` once shut down.
    pub fn wait_for_wake(&self) -> Option<u64> {
        let mut inner = self.lock();
        loop {
            match inner.state {
                WakeState::Awake => return Some(inner.epoch),
                WakeState::Shutdown => return None,
                WakeState::Asleep => {
                    inner = self
                        .changed
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_transitions_and_epochs() {
        let wake = WakeController::new();
        assert_eq!(wake.state(), WakeState::Asleep);
        assert!(!wake.sleep());

        assert!(wake.wake());
        assert!(!wake.wake());
        assert_eq!(wake.wait_for_wake(), Some(1));
        assert!(wake.is_awake_in(1));

        assert!(wake.sleep());
        assert!(!wake.is_awake_in(1));

        assert!(wake.wake());
        assert_eq!(wake.wait_for_wake(), Some(2));
        assert!(!wake.is_awake_in(1));
    }

    #[test]
    fn test_wait_blocks_until_lift() {
        let wake = Arc::new(WakeController::new());
        let waiter = {
            let wake = Arc::clone(&wake);
            std::thread::spawn(move || wake.wait_for_wake())
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        wake.wake();
        assert_eq!(waiter.join().unwrap(), Some(1));
    }

    #[test]
    fn test_shutdown_releases_waiters() {
        let wake = Arc::new(WakeController::new());
        let waiter = {
            let wake = Arc::clone(&wake);
            std::thread::spawn(move || wake.wait_for_wake())
        };

        wake.shutdown();
        assert_eq!(waiter.join().unwrap(), None);

        // Shutdown is terminal
        assert!(!wake.wake());
        assert_eq!(wake.wait_for_wake(), None);
    }
}
