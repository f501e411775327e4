//! Timing strategy configuration.
//!
//! A [`Strategy`] is a plain value: two strategies with the same variant and
//! options compare equal, regardless of where they were constructed. The
//! runtime state that executes a strategy lives in the client crate.
//!
//! # Wire format
//!
//! Strategies serialize as `{"type": "debounce", "options": {"wait": 50}}`.
//! Omitted options take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound accepted for any strategy `wait`.
pub const MAX_WAIT_MS: u64 = 24 * 60 * 60 * 1000;

/// Options for [`Strategy::Debounce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceOptions {
    /// Quiet period in milliseconds after the last mutation.
    pub wait: u64,
    /// Flush on the first mutation of an idle period.
    pub leading: bool,
    /// Flush when the quiet period elapses.
    pub trailing: bool,
}

impl Default for DebounceOptions {
    fn default() -> Self {
        Self {
            wait: 0,
            leading: false,
            trailing: true,
        }
    }
}

/// Options for [`Strategy::Throttle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleOptions {
    /// Window length in milliseconds.
    pub wait: u64,
    /// Flush on the first mutation of a new window.
    pub leading: bool,
    /// Flush buffered mutations when the window closes.
    pub trailing: bool,
}

impl Default for ThrottleOptions {
    fn default() -> Self {
        Self {
            wait: 0,
            leading: true,
            trailing: true,
        }
    }
}

/// Options for [`Strategy::Queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueOptions {
    /// Minimum gap in milliseconds between one flush completing and the next starting.
    pub wait: u64,
}

/// Policy deciding when pending mutations are flushed to persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "options", rename_all = "lowercase")]
pub enum Strategy {
    /// Flush after a quiet period; each mutation restarts the timer.
    Debounce(DebounceOptions),
    /// Flush at most once per window.
    Throttle(ThrottleOptions),
    /// One transaction per call, flushed strictly in order.
    Queue(QueueOptions),
}

impl Strategy {
    /// Trailing-edge debounce with the given quiet period.
    #[must_use]
    pub fn debounce(wait_ms: u64) -> Self {
        Strategy::Debounce(DebounceOptions {
            wait: wait_ms,
            ..DebounceOptions::default()
        })
    }

    /// Leading- and trailing-edge throttle with the given window.
    #[must_use]
    pub fn throttle(wait_ms: u64) -> Self {
        Strategy::Throttle(ThrottleOptions {
            wait: wait_ms,
            ..ThrottleOptions::default()
        })
    }

    /// Sequential queue with the given inter-flush gap.
    #[must_use]
    pub fn queue(wait_ms: u64) -> Self {
        Strategy::Queue(QueueOptions { wait: wait_ms })
    }

    /// Sets the leading-edge flag. No effect on queue strategies.
    #[must_use]
    pub fn leading(mut self, leading: bool) -> Self {
        match &mut self {
            Strategy::Debounce(o) => o.leading = leading,
            Strategy::Throttle(o) => o.leading = leading,
            Strategy::Queue(_) => {}
        }
        self
    }

    /// Sets the trailing-edge flag. No effect on queue strategies.
    #[must_use]
    pub fn trailing(mut self, trailing: bool) -> Self {
        match &mut self {
            Strategy::Debounce(o) => o.trailing = trailing,
            Strategy::Throttle(o) => o.trailing = trailing,
            Strategy::Queue(_) => {}
        }
        self
    }

    /// Short lowercase name, used as a log field and metric label.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Debounce(_) => "debounce",
            Strategy::Throttle(_) => "throttle",
            Strategy::Queue(_) => "queue",
        }
    }

    /// The configured `wait` as a [`Duration`].
    #[must_use]
    pub fn wait(&self) -> Duration {
        let ms = match self {
            Strategy::Debounce(o) => o.wait,
            Strategy::Throttle(o) => o.wait,
            Strategy::Queue(o) => o.wait,
        };
        Duration::from_millis(ms)
    }

    /// Returns `true` if writes left pending when calls stop are still
    /// flushed once `wait` elapses. Strategies without a trailing edge only
    /// flush on a further call.
    #[must_use]
    pub fn flushes_when_idle(&self) -> bool {
        match self {
            Strategy::Debounce(o) => o.trailing,
            Strategy::Throttle(o) => o.trailing,
            Strategy::Queue(_) => true,
        }
    }

    /// Checks that the options describe a strategy that can ever flush.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOptions`] if both edges are disabled or
    /// `wait` exceeds [`MAX_WAIT_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (wait, edges) = match self {
            Strategy::Debounce(o) => (o.wait, Some((o.leading, o.trailing))),
            Strategy::Throttle(o) => (o.wait, Some((o.leading, o.trailing))),
            Strategy::Queue(o) => (o.wait, None),
        };
        if wait > MAX_WAIT_MS {
            return Err(ConfigError::InvalidOptions {
                strategy: self.name(),
                reason: format!("wait {wait}ms exceeds maximum of {MAX_WAIT_MS}ms"),
            });
        }
        if let Some((false, false)) = edges {
            return Err(ConfigError::InvalidOptions {
                strategy: self.name(),
                reason: "at least one of leading or trailing must be enabled".to_string(),
            });
        }
        Ok(())
    }

    /// Parses and validates a strategy from its JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed input (including negative
    /// or fractional `wait`) and [`ConfigError::InvalidOptions`] when
    /// validation fails.
    pub fn from_json(input: &str) -> Result<Self, ConfigError> {
        let strategy: Strategy = serde_json::from_str(input)?;
        strategy.validate()?;
        Ok(strategy)
    }
}
