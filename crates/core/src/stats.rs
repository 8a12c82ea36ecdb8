use std::sync::atomic::{AtomicU64, Ordering};

/// Per-stream counters, updated from the packet path and readable from
/// anywhere holding the `Arc`.
#[derive(Debug, Default)]
pub struct FilterStats {
    packets_suppressed: AtomicU64,
    packets_passed: AtomicU64,
    frames_voiced: AtomicU64,
    frames_attenuated: AtomicU64,
    frame_errors: AtomicU64,
    fallbacks: AtomicU64,
}

/// Point-in-time copy of [`FilterStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_suppressed: u64,
    pub packets_passed: u64,
    pub frames_voiced: u64,
    pub frames_attenuated: u64,
    pub frame_errors: u64,
    pub fallbacks: u64,
}

impl FilterStats {
    pub(crate) fn packet_suppressed(&self) {
        self.packets_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn packet_passed(&self) {
        self.packets_passed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_voiced(&self) {
        self.frames_voiced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_attenuated(&self) {
        self.frames_attenuated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_error(&self) {
        self.frame_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A processed packet had to be replaced by the original.
    pub(crate) fn fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_suppressed: self.packets_suppressed.load(Ordering::Relaxed),
            packets_passed: self.packets_passed.load(Ordering::Relaxed),
            frames_voiced: self.frames_voiced.load(Ordering::Relaxed),
            frames_attenuated: self.frames_attenuated.load(Ordering::Relaxed),
            frame_errors: self.frame_errors.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}
