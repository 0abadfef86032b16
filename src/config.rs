use std::str::FromStr;

use crate::Error;

/// How an [`EventLoop`](crate::EventLoop) measures time for its timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Time only advances when the loop is idle, jumping straight to the next
    /// timer. Deterministic; timers never actually sleep.
    #[default]
    Virtual,
    /// Wall-clock time; the loop sleeps until the next timer is due.
    Real,
}

impl FromStr for Clock {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "virtual" => Ok(Clock::Virtual),
            "real" => Ok(Clock::Real),
            other => Err(Error::InvalidConfig(format!("unknown clock {other:?}"))),
        }
    }
}

/// Settings for an [`EventLoop`](crate::EventLoop).
///
/// `Default` ignores the environment; [`Config::from_env`] and
/// [`EventLoop::from_env`](crate::EventLoop::from_env) read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub clock: Clock,
    /// Upper bound on tasks run by a single `run` or `block_on` call.
    /// `None` means unbounded.
    pub max_tasks: Option<u64>,
}

impl Config {
    pub const CLOCK_VAR: &'static str = "PROMISE_CLOCK";
    pub const MAX_TASKS_VAR: &'static str = "PROMISE_MAX_TASKS";

    /// Reads `PROMISE_CLOCK` and `PROMISE_MAX_TASKS`, falling back to the
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();
        if let Some(clock) = lookup(Self::CLOCK_VAR) {
            config.clock = clock.parse()?;
        }
        if let Some(max) = lookup(Self::MAX_TASKS_VAR) {
            let max = max.trim().parse().map_err(|_| {
                Error::InvalidConfig(format!("{} must be a number, got {max:?}", Self::MAX_TASKS_VAR))
            })?;
            config.max_tasks = Some(max);
        }
        Ok(config)
    }

    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_tasks(mut self, max: u64) -> Self {
        self.max_tasks = Some(max);
        self
    }
}
