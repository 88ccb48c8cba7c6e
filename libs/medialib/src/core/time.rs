// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

/// Monotonic wall-clock source, in microseconds.
///
/// The clock component maps this onto the media timeline; components never
/// read the system clock directly so tests can substitute a stepped source.
pub trait MediaTimeSource: Send + Sync {
    fn now_us(&self) -> i64;
}

/// Monotonic system time, anchored at construction.
pub struct SystemTimeSource {
    anchor: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTimeSource for SystemTimeSource {
    fn now_us(&self) -> i64 {
        self.anchor.elapsed().as_micros() as i64
    }
}

/// Manually-stepped time source for deterministic tests.
pub struct ManualTimeSource {
    now: AtomicI64,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self {
            now: AtomicI64::new(0),
        }
    }

    pub fn set(&self, us: i64) {
        self.now.store(us, Ordering::SeqCst);
    }

    pub fn advance(&self, us: i64) {
        self.now.fetch_add(us, Ordering::SeqCst);
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaTimeSource for ManualTimeSource {
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
