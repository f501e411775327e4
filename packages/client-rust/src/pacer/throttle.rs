use std::time::Duration;

use pacer_core::ThrottleOptions;
use tokio::time::Instant;

use super::PacingPolicy;

/// At most one flush per `wait` window.
///
/// A trailing flush at the end of a window opens the next window, so two
/// flushes are never closer than `wait` apart.
#[derive(Debug)]
pub(crate) struct Throttle {
    wait: Duration,
    leading: bool,
    trailing: bool,
    window_end: Option<Instant>,
    pending: bool,
}

impl Throttle {
    pub(crate) fn new(options: ThrottleOptions) -> Self {
        Self {
            wait: Duration::from_millis(options.wait),
            leading: options.leading,
            trailing: options.trailing,
            window_end: None,
            pending: false,
        }
    }
}

impl PacingPolicy for Throttle {
    fn on_mutation(&mut self, now: Instant) -> bool {
        if self.window_end.is_some() {
            self.pending = true;
            return false;
        }
        self.window_end = Some(now + self.wait);
        if self.leading {
            self.pending = false;
            true
        } else {
            self.pending = true;
            false
        }
    }

    fn on_deadline(&mut self, now: Instant) -> bool {
        if self.trailing && self.pending {
            self.pending = false;
            self.window_end = Some(now + self.wait);
            return true;
        }
        // Without a trailing edge, buffered mutations ride along with the
        // next window's leading flush.
        self.window_end = None;
        false
    }

    fn deadline(&self) -> Option<Instant> {
        self.window_end
    }
}
