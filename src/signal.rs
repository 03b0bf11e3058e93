/// Level-triggered signals raised from timer context.
///
/// Timer callbacks and timer tasks may only call [`SignalSet::raise`]. The
/// engine task drains the whole set at once and performs every state change
/// itself, so no timer ever touches the registry or session directly.
/// Raising an already pending signal is a no-op.
use core::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TimerSignal {
    /// Configuration mode inactivity timeout expired
    ConfigModeTimeout = 1 << 0,
    /// Periodic reporting interval elapsed
    PositioningTrigger = 1 << 2,
    /// Gateway discovery window closed
    GatewayFinderTimeout = 1 << 3,
}

/// A drained snapshot of pending signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signals(u8);

impl Signals {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn with(self, signal: TimerSignal) -> Self {
        Self(self.0 | signal as u8)
    }

    pub const fn contains(self, signal: TimerSignal) -> bool {
        self.0 & signal as u8 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<TimerSignal> for Signals {
    fn from(signal: TimerSignal) -> Self {
        Signals::empty().with(signal)
    }
}

pub struct SignalSet {
    bits: AtomicU8,
}

impl SignalSet {
    pub const fn new() -> Self {
        Self {
            bits: AtomicU8::new(0),
        }
    }

    /// Mark `signal` pending. Safe from any context.
    pub fn raise(&self, signal: TimerSignal) {
        self.bits.fetch_or(signal as u8, Ordering::AcqRel);
    }

    /// Take every pending signal, leaving the set empty.
    pub fn drain(&self) -> Signals {
        Signals(self.bits.swap(0, Ordering::AcqRel))
    }

    pub fn pending(&self) -> Signals {
        Signals(self.bits.load(Ordering::Acquire))
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}
