// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

mod common;

use common::{drive, event_sink};
use medialib::components::{
    CLOCK_PORT_OUT_VIDEO, DEMUXER_PORT_OUT_VIDEO, TRANSFORM_PORT_IN, TRANSFORM_PORT_OUT,
    VIDEO_RENDER_PORT_IN_VIDEO,
};
use medialib::{ComponentHandle, ComponentRegistry, ComponentState, MediaError, Param, ParamKind};

fn bound_peer(handle: &ComponentHandle, port: u32) -> Option<(ComponentHandle, u32)> {
    match handle.get_parameter(ParamKind::Bind(port)).unwrap() {
        Param::Bind { peer, .. } => peer,
        other => panic!("unexpected parameter {other:?}"),
    }
}

#[test]
fn bind_records_are_symmetric() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let demuxer = registry.get_handle("DEMUXER", sink.clone()).unwrap();
    let vdec = registry.get_handle("VDEC", sink).unwrap();

    registry
        .set_bind(
            Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)),
            Some((&vdec, TRANSFORM_PORT_IN)),
        )
        .unwrap();

    let (peer, peer_port) = bound_peer(&demuxer, DEMUXER_PORT_OUT_VIDEO).expect("output bound");
    assert_eq!(peer.instance_id(), vdec.instance_id());
    assert_eq!(peer_port, TRANSFORM_PORT_IN);

    let (peer, peer_port) = bound_peer(&vdec, TRANSFORM_PORT_IN).expect("input bound");
    assert_eq!(peer.instance_id(), demuxer.instance_id());
    assert_eq!(peer_port, DEMUXER_PORT_OUT_VIDEO);

    registry
        .set_bind(Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)), None)
        .unwrap();
    drop(peer);
    registry.free_handle(&demuxer).unwrap();
    registry.free_handle(&vdec).unwrap();
}

#[test]
fn unbind_clears_both_sides() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink.clone()).unwrap();
    let render = registry.get_handle("VIDEO_RENDER", sink).unwrap();

    registry
        .set_bind(
            Some((&vdec, TRANSFORM_PORT_OUT)),
            Some((&render, VIDEO_RENDER_PORT_IN_VIDEO)),
        )
        .unwrap();

    // Cancel from the input side only.
    registry
        .set_bind(None, Some((&render, VIDEO_RENDER_PORT_IN_VIDEO)))
        .unwrap();

    assert!(bound_peer(&vdec, TRANSFORM_PORT_OUT).is_none());
    assert!(bound_peer(&render, VIDEO_RENDER_PORT_IN_VIDEO).is_none());

    registry.free_handle(&vdec).unwrap();
    registry.free_handle(&render).unwrap();
}

#[test]
fn both_sides_null_is_caller_misuse() {
    let registry = ComponentRegistry::with_builtins();
    assert_eq!(
        registry.set_bind(None, None).unwrap_err(),
        MediaError::BadParameter
    );
}

#[test]
fn same_direction_ports_do_not_bind() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let demuxer = registry.get_handle("DEMUXER", sink.clone()).unwrap();
    let clock = registry.get_handle("CLOCK", sink).unwrap();

    // Two outputs facing each other.
    let err = registry
        .set_bind(
            Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)),
            Some((&clock, CLOCK_PORT_OUT_VIDEO)),
        )
        .unwrap_err();
    assert_eq!(err, MediaError::PortNotCompatible);
    assert!(bound_peer(&demuxer, DEMUXER_PORT_OUT_VIDEO).is_none());

    registry.free_handle(&demuxer).unwrap();
    registry.free_handle(&clock).unwrap();
}

#[test]
fn binding_outside_loaded_is_refused() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink.clone()).unwrap();
    let render = registry.get_handle("VIDEO_RENDER", sink).unwrap();

    drive(&vdec, ComponentState::Idle);
    let err = registry
        .set_bind(
            Some((&vdec, TRANSFORM_PORT_OUT)),
            Some((&render, VIDEO_RENDER_PORT_IN_VIDEO)),
        )
        .unwrap_err();
    assert_eq!(err, MediaError::InvalidState);

    drive(&vdec, ComponentState::Loaded);
    registry.free_handle(&vdec).unwrap();
    registry.free_handle(&render).unwrap();
}

#[test]
fn half_failed_bind_is_rolled_back() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, _, _) = event_sink();
    let vdec = registry.get_handle("VDEC", sink.clone()).unwrap();
    let render = registry.get_handle("VIDEO_RENDER", sink).unwrap();

    // The output side records first; the input side then refuses because it
    // already left Loaded.
    drive(&render, ComponentState::Idle);
    let err = registry
        .set_bind(
            Some((&vdec, TRANSFORM_PORT_OUT)),
            Some((&render, VIDEO_RENDER_PORT_IN_VIDEO)),
        )
        .unwrap_err();
    assert_eq!(err, MediaError::InvalidState);

    // The already-recorded output side was rolled back.
    assert!(bound_peer(&vdec, TRANSFORM_PORT_OUT).is_none());

    drive(&render, ComponentState::Loaded);
    registry.free_handle(&vdec).unwrap();
    registry.free_handle(&render).unwrap();
}
