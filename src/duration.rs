//! Human-readable latency formatting for the text reporter.
use std::{fmt, time::Duration};

/// The unit a group of latencies is rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimeUnit {
    Nanos,
    Micros,
    Millis,
    Secs,
}

impl TimeUnit {
    /// The largest unit in which `d` is at least 1.
    pub(crate) fn fit(d: Duration) -> Self {
        match d.as_nanos() {
            0..1_000 => Self::Nanos,
            1_000..1_000_000 => Self::Micros,
            1_000_000..1_000_000_000 => Self::Millis,
            _ => Self::Secs,
        }
    }

    /// Like [`fit`](Self::fit) for a value in milliseconds.
    pub(crate) fn fit_millis(millis: f64) -> Self {
        Self::fit(Duration::try_from_secs_f64(millis / 1e3).unwrap_or_default())
    }

    fn nanos(self) -> f64 {
        match self {
            Self::Nanos => 1.0,
            Self::Micros => 1e3,
            Self::Millis => 1e6,
            Self::Secs => 1e9,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Nanos => "ns",
            Self::Micros => "µs",
            Self::Millis => "ms",
            Self::Secs => "s",
        }
    }

    /// Wraps `d` for display in this unit.
    pub(crate) fn show(self, d: Duration) -> InUnit {
        InUnit { value: d.as_nanos() as f64 / self.nanos(), unit: self }
    }

    /// Wraps a millisecond value for display in this unit.
    pub(crate) fn show_millis(self, millis: f64) -> InUnit {
        InUnit { value: millis * 1e6 / self.nanos(), unit: self }
    }
}

/// A value converted to a [`TimeUnit`]; honours the formatter's precision.
pub(crate) struct InUnit {
    value: f64,
    unit: TimeUnit,
}

impl fmt::Display for InUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)?;
        f.write_str(self.unit.suffix())
    }
}
