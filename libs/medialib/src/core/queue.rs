// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::core::messages::Command;

/// Why a worker announced it is about to park on its queue.
///
/// `Active` means nobody is parked (or the worker is parked for a reason that
/// must not be released by a `WakeUp`, e.g. a renderer pacing sleep).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    Active,
    AwaitingInput,
    AwaitingOutput,
}

struct QueueInner {
    messages: VecDeque<Command>,
    wait: WaitReason,
    wakeups_accepted: u64,
    wakeups_dropped: u64,
}

/// Per-component command queue with an embedded edge-triggered wake state.
///
/// Any thread may enqueue; only the owning worker dequeues. `try_wake` is the
/// flow-control path: it delivers a `WakeUp` only when the worker has
/// announced a wait, and is silently dropped (and counted) otherwise, so
/// wake-ups never accumulate.
pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    condvar: Condvar,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                messages: VecDeque::new(),
                wait: WaitReason::Active,
                wakeups_accepted: 0,
                wakeups_dropped: 0,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Enqueue a command unconditionally and wake the worker.
    pub fn send(&self, command: Command) {
        let mut inner = self.inner.lock();
        inner.messages.push_back(command);
        self.condvar.notify_one();
    }

    /// Deliver a `WakeUp` only if the worker announced it is parked waiting
    /// for input or output. Returns whether the wake was accepted.
    pub fn try_wake(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.wait == WaitReason::Active {
            inner.wakeups_dropped += 1;
            return false;
        }
        inner.wait = WaitReason::Active;
        inner.wakeups_accepted += 1;
        inner.messages.push_back(Command::WakeUp);
        self.condvar.notify_one();
        true
    }

    /// Announce the reason the worker is about to park. A `try_wake` landing
    /// before the announcement is dropped, so workers re-check their data
    /// condition once after announcing and only then `wait`; a wake landing
    /// after the announcement enqueues a message the wait will observe.
    pub fn announce(&self, reason: WaitReason) {
        self.inner.lock().wait = reason;
    }

    pub fn try_recv(&self) -> Option<Command> {
        self.inner.lock().messages.pop_front()
    }

    /// Park until a message is queued or the timeout elapses. Any return
    /// clears the wait announcement.
    pub fn wait(&self, timeout: Option<Duration>) {
        let mut inner = self.inner.lock();
        if inner.messages.is_empty() {
            match timeout {
                Some(t) => {
                    let _ = self.condvar.wait_for(&mut inner, t);
                }
                None => self.condvar.wait(&mut inner),
            }
        }
        inner.wait = WaitReason::Active;
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().messages.len()
    }

    pub fn wakeups_accepted(&self) -> u64 {
        self.inner.lock().wakeups_accepted
    }

    pub fn wakeups_dropped(&self) -> u64 {
        self.inner.lock().wakeups_dropped
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_dropped_when_nobody_waits() {
        let q = MessageQueue::new();
        assert!(!q.try_wake());
        assert_eq!(q.depth(), 0);
        assert_eq!(q.wakeups_dropped(), 1);
        assert_eq!(q.wakeups_accepted(), 0);
    }

    #[test]
    fn wake_accepted_after_announce() {
        let q = MessageQueue::new();
        q.announce(WaitReason::AwaitingInput);
        assert!(q.try_wake());
        assert_eq!(q.try_recv(), Some(Command::WakeUp));
        // Edge-triggered: the announcement was consumed, a second wake drops.
        assert!(!q.try_wake());
    }

    #[test]
    fn wait_returns_on_pending_message_and_clears_announcement() {
        let q = MessageQueue::new();
        q.announce(WaitReason::AwaitingOutput);
        q.send(Command::Nops);
        q.wait(None);
        assert!(!q.try_wake());
        assert_eq!(q.try_recv(), Some(Command::Nops));
    }

    #[test]
    fn timed_wait_expires() {
        let q = MessageQueue::new();
        let start = std::time::Instant::now();
        q.wait(Some(Duration::from_millis(5)));
        assert!(start.elapsed() >= Duration::from_millis(4));
    }
}
