// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod common;

use std::time::Duration;

use common::{drive, event_sink, wait_for_event};
use medialib::engine::FaultyCodec;
use medialib::{
    Command, CommandKind, ComponentRegistry, ComponentState, Config, ConfigKind, Event,
    MediaError, Param,
};

const TIMEOUT: Duration = Duration::from_secs(2);

#[test]
fn same_state_request_is_refused_without_enqueuing() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    let err = vdec
        .send_command(Command::SetState(ComponentState::Loaded))
        .unwrap_err();
    assert_eq!(err, MediaError::SameState);
    assert_eq!(vdec.get_state(), ComponentState::Loaded);

    let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::Error { .. })
    })
    .expect("error event");
    assert!(matches!(
        event,
        Event::Error {
            error: MediaError::SameState,
            ..
        }
    ));

    // Nothing was enqueued for the worker.
    match vdec.get_config(ConfigKind::WorkerStats).unwrap() {
        Config::WorkerStats(stats) => assert_eq!(stats.queue_depth, 0),
        other => panic!("unexpected config {other:?}"),
    }

    drive(&vdec, ComponentState::Idle);
    drive(&vdec, ComponentState::Loaded);
    vdec.deinit().unwrap();
}

#[test]
fn executing_is_not_reachable_from_loaded() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    vdec.send_command(Command::SetState(ComponentState::Executing))
        .unwrap();
    let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::Error { .. })
    })
    .expect("error event");
    assert!(matches!(
        event,
        Event::Error {
            error: MediaError::IncorrectStateTransition,
            state: ComponentState::Loaded,
        }
    ));
    assert_eq!(vdec.get_state(), ComponentState::Loaded);

    vdec.deinit().unwrap();
}

#[test]
fn allocation_failure_aborts_the_transition() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    vdec.set_parameter(Param::CodecEngine(Box::new(FaultyCodec::failing_init())))
        .unwrap();
    vdec.send_command(Command::SetState(ComponentState::Idle))
        .unwrap();

    let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::Error { .. })
    })
    .expect("error event");
    assert!(matches!(
        event,
        Event::Error {
            error: MediaError::InsufficientResources,
            state: ComponentState::Loaded,
        }
    ));

    // The acknowledgment carries the unchanged state.
    let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::CmdComplete { .. })
    })
    .expect("cmd complete");
    assert!(matches!(
        event,
        Event::CmdComplete {
            command: CommandKind::StateSet,
            state: ComponentState::Loaded,
        }
    ));
    assert_eq!(vdec.get_state(), ComponentState::Loaded);

    vdec.deinit().unwrap();
}

#[test]
fn every_successful_transition_is_acknowledged() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    for target in [
        ComponentState::Idle,
        ComponentState::Executing,
        ComponentState::Pause,
        ComponentState::Executing,
        ComponentState::Loaded,
    ] {
        drive(&vdec, target);
        let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
            matches!(e, Event::CmdComplete { .. })
        })
        .expect("cmd complete");
        assert!(matches!(
            event,
            Event::CmdComplete {
                command: CommandKind::StateSet,
                state,
            } if state == target
        ));
    }

    vdec.deinit().unwrap();
}

#[test]
fn invalid_is_terminal_and_doubly_reported() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    drive(&vdec, ComponentState::Idle);
    drive(&vdec, ComponentState::Invalid);

    let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(
            e,
            Event::Error {
                state: ComponentState::Invalid,
                ..
            }
        )
    })
    .expect("error event");
    assert!(matches!(
        event,
        Event::Error {
            error: MediaError::InvalidState,
            ..
        }
    ));

    // No way back out.
    vdec.send_command(Command::SetState(ComponentState::Loaded))
        .unwrap();
    wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(
            e,
            Event::Error {
                error: MediaError::IncorrectStateTransition,
                ..
            }
        )
    })
    .expect("transition out of Invalid must be refused");
    assert_eq!(vdec.get_state(), ComponentState::Invalid);

    // Destruction is refused outside Loaded; the handle stays usable.
    assert_eq!(vdec.deinit().unwrap_err(), MediaError::Unsupported);
}

#[test]
fn free_handle_is_refused_while_executing() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    drive(&vdec, ComponentState::Idle);
    drive(&vdec, ComponentState::Executing);

    assert_eq!(
        registry.free_handle(&vdec).unwrap_err(),
        MediaError::Unsupported
    );
    // Nothing was deallocated.
    assert_eq!(vdec.get_state(), ComponentState::Executing);

    drive(&vdec, ComponentState::Idle);
    drive(&vdec, ComponentState::Loaded);
    registry.free_handle(&vdec).unwrap();
}
