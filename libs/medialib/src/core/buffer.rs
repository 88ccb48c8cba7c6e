// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use bitflags::bitflags;
use bytes::Bytes;
use crossbeam_queue::ArrayQueue;

bitflags! {
    /// Flag word carried on every buffer hand-off.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Final buffer of an elementary stream.
        const EOS = 1 << 0;
        /// Payload starts on a random-access point.
        const KEYFRAME = 1 << 1;
    }
}

impl Default for BufferFlags {
    fn default() -> Self {
        BufferFlags::empty()
    }
}

/// Move-only media buffer.
///
/// Ownership transfers from producer to consumer on `send_buffer` and back
/// on `giveback_buffer`; the type system enforces that a buffer is never
/// owned by two components at once. Producers draw shells from a
/// [`BufferPool`] and the give-back is the return to that pool.
#[derive(Debug)]
pub struct MediaBuffer {
    pub payload: Bytes,
    pub pts: i64,
    pub flags: BufferFlags,
    /// Producer-side port the buffer left through.
    pub output_port: u32,
    /// Consumer-side port the buffer is addressed to.
    pub input_port: u32,
}

impl MediaBuffer {
    /// An empty shell, ready to be filled by a producer.
    pub fn shell() -> Self {
        Self {
            payload: Bytes::new(),
            pts: -1,
            flags: BufferFlags::empty(),
            output_port: 0,
            input_port: 0,
        }
    }

    /// Clear payload and metadata so the shell can be reused.
    pub fn reset(&mut self) {
        self.payload = Bytes::new();
        self.pts = -1;
        self.flags = BufferFlags::empty();
        self.output_port = 0;
        self.input_port = 0;
    }
}

/// Fixed-capacity pool of buffer shells.
///
/// Pool exhaustion is the "no empty output" condition of the worker loop;
/// in-flight memory is bounded by the pool capacity.
pub struct BufferPool {
    slots: ArrayQueue<MediaBuffer>,
    capacity: usize,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        let slots = ArrayQueue::new(capacity);
        for _ in 0..capacity {
            let _ = slots.push(MediaBuffer::shell());
        }
        Self { slots, capacity }
    }

    pub fn acquire(&self) -> Option<MediaBuffer> {
        self.slots.pop()
    }

    /// Return a buffer to the pool, wiped.
    pub fn release(&self, mut buffer: MediaBuffer) {
        buffer.reset();
        let _ = self.slots.push(buffer);
    }

    pub fn available(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_bounds_inflight_buffers() {
        let pool = BufferPool::new(2);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        pool.release(a);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn release_wipes_the_shell() {
        let pool = BufferPool::new(1);
        let mut buf = pool.acquire().unwrap();
        buf.payload = Bytes::from_static(b"frame");
        buf.pts = 40_000;
        buf.flags = BufferFlags::EOS;
        pool.release(buf);
        let buf = pool.acquire().unwrap();
        assert!(buf.payload.is_empty());
        assert_eq!(buf.pts, -1);
        assert!(buf.flags.is_empty());
    }
}
