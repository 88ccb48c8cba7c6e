// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use medialib::{
    Command, ComponentHandle, ComponentObserver, ComponentState, Event, MediaBuffer, MediaError,
};

/// Observer that funnels events and returned buffers into channels the test
/// thread can block on.
pub struct EventSink {
    events_tx: Sender<(String, Event)>,
    returned_tx: Sender<MediaBuffer>,
}

impl ComponentObserver for EventSink {
    fn on_event(&self, component_id: &str, event: Event) {
        let _ = self.events_tx.send((component_id.to_owned(), event));
    }

    fn on_buffer_returned(&self, _component_id: &str, buffer: MediaBuffer) {
        let _ = self.returned_tx.send(buffer);
    }
}

pub fn event_sink() -> (
    Arc<EventSink>,
    Receiver<(String, Event)>,
    Receiver<MediaBuffer>,
) {
    let (events_tx, events_rx) = unbounded();
    let (returned_tx, returned_rx) = unbounded();
    (
        Arc::new(EventSink {
            events_tx,
            returned_tx,
        }),
        events_rx,
        returned_rx,
    )
}

/// Block until an event matching `pred` arrives, discarding everything else.
pub fn wait_for_event(
    rx: &Receiver<(String, Event)>,
    timeout: Duration,
    pred: impl Fn(&str, &Event) -> bool,
) -> Option<(String, Event)> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.checked_duration_since(Instant::now())?;
        match rx.recv_timeout(remaining) {
            Ok((id, event)) if pred(&id, &event) => return Some((id, event)),
            Ok(_) => {}
            Err(_) => return None,
        }
    }
}

/// Request a transition and poll until the component reports it.
pub fn drive(handle: &ComponentHandle, target: ComponentState) {
    match handle.send_command(Command::SetState(target)) {
        Ok(()) | Err(MediaError::SameState) => {}
        Err(err) => panic!("transition to {target} refused: {err}"),
    }
    let deadline = Instant::now() + Duration::from_secs(2);
    while handle.get_state() != target {
        assert!(
            Instant::now() < deadline,
            "[{}] never reached {target}, stuck in {}",
            handle.instance_id(),
            handle.get_state()
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}
