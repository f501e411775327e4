use std::time::Duration;

use pacer_core::DebounceOptions;
use tokio::time::Instant;

use super::PacingPolicy;

/// Flushes after `wait` of quiet. Every mutation pushes the deadline out.
///
/// The quiet period doubles as the leading-edge window: a leading flush
/// only happens when no deadline is pending.
#[derive(Debug)]
pub(crate) struct Debounce {
    wait: Duration,
    leading: bool,
    trailing: bool,
    deadline: Option<Instant>,
    trailing_pending: bool,
}

impl Debounce {
    pub(crate) fn new(options: DebounceOptions) -> Self {
        Self {
            wait: Duration::from_millis(options.wait),
            leading: options.leading,
            trailing: options.trailing,
            deadline: None,
            trailing_pending: false,
        }
    }
}

impl PacingPolicy for Debounce {
    fn on_mutation(&mut self, now: Instant) -> bool {
        let idle = self.deadline.is_none();
        self.deadline = Some(now + self.wait);
        if idle && self.leading {
            return true;
        }
        self.trailing_pending = true;
        false
    }

    fn on_deadline(&mut self, _now: Instant) -> bool {
        self.deadline = None;
        let flush = self.trailing && self.trailing_pending;
        self.trailing_pending = false;
        flush
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
