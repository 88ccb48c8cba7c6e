// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Full demux → decode → render pipeline, both media branches synchronized
//! by the clock, driven to end-of-stream.

mod common;

use std::time::Duration;

use common::{drive, event_sink, wait_for_event};
use serial_test::serial;

use medialib::components::{
    AUDIO_RENDER_PORT_IN_AUDIO, AUDIO_RENDER_PORT_IN_CLOCK, CLOCK_PORT_OUT_AUDIO,
    CLOCK_PORT_OUT_VIDEO, DEMUXER_PORT_OUT_AUDIO, DEMUXER_PORT_OUT_VIDEO, TRANSFORM_PORT_IN,
    TRANSFORM_PORT_OUT, VIDEO_RENDER_PORT_IN_CLOCK, VIDEO_RENDER_PORT_IN_VIDEO,
};
use medialib::engine::SyntheticSource;
use medialib::{
    ComponentRegistry, ComponentState, Config, ConfigKind, Event, Param, ParamKind,
    TimestampInfo,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
#[serial]
fn av_pipeline_plays_to_end_of_stream() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();

    let demuxer = registry.get_handle("DEMUXER", sink.clone()).unwrap();
    let vdec = registry.get_handle("VDEC", sink.clone()).unwrap();
    let adec = registry.get_handle("ADEC", sink.clone()).unwrap();
    let video_render = registry.get_handle("VIDEO_RENDER", sink.clone()).unwrap();
    let audio_render = registry.get_handle("AUDIO_RENDER", sink.clone()).unwrap();
    let clock = registry.get_handle("CLOCK", sink).unwrap();

    // 200 ms of interleaved A/V.
    demuxer
        .set_parameter(Param::StreamSource(Box::new(SyntheticSource::av(
            200_000, 20_000, 10_000,
        ))))
        .unwrap();
    wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::PortFormatDetected { .. })
    })
    .expect("format detected");

    match demuxer.get_parameter(ParamKind::StreamInfo).unwrap() {
        Param::StreamInfo(info) => {
            assert!(info.has_audio() && info.has_video());
            assert_eq!(info.duration_us, 200_000);
        }
        other => panic!("unexpected parameter {other:?}"),
    }

    registry
        .set_bind(
            Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)),
            Some((&vdec, TRANSFORM_PORT_IN)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&demuxer, DEMUXER_PORT_OUT_AUDIO)),
            Some((&adec, TRANSFORM_PORT_IN)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&vdec, TRANSFORM_PORT_OUT)),
            Some((&video_render, VIDEO_RENDER_PORT_IN_VIDEO)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&adec, TRANSFORM_PORT_OUT)),
            Some((&audio_render, AUDIO_RENDER_PORT_IN_AUDIO)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&clock, CLOCK_PORT_OUT_VIDEO)),
            Some((&video_render, VIDEO_RENDER_PORT_IN_CLOCK)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&clock, CLOCK_PORT_OUT_AUDIO)),
            Some((&audio_render, AUDIO_RENDER_PORT_IN_CLOCK)),
        )
        .unwrap();

    let all = [
        &demuxer,
        &vdec,
        &adec,
        &video_render,
        &audio_render,
        &clock,
    ];
    for handle in all {
        drive(handle, ComponentState::Idle);
    }

    clock
        .set_config(Config::TimePosition(TimestampInfo {
            port_index: 0,
            timestamp: 0,
        }))
        .unwrap();

    // Sinks first, source last.
    for handle in [&clock, &video_render, &audio_render, &vdec, &adec, &demuxer] {
        drive(handle, ComponentState::Executing);
    }

    // Both renderers start; the order between the branches is not fixed.
    let mut video_started = false;
    let mut audio_started = false;
    while !(video_started && audio_started) {
        let (_, event) = wait_for_event(&events, TIMEOUT, |_, e| {
            matches!(e, Event::VideoRenderFirstFrame | Event::AudioRenderFirstFrame)
        })
        .expect("renderer first frames");
        match event {
            Event::VideoRenderFirstFrame => video_started = true,
            Event::AudioRenderFirstFrame => audio_started = true,
            _ => {}
        }
    }

    // Both renderers report end-of-stream, again in either order.
    let mut video_done = false;
    let mut audio_done = false;
    while !(video_done && audio_done) {
        let (id, _) = wait_for_event(&events, TIMEOUT, |id, e| {
            matches!(e, Event::BufferFlag { .. })
                && (id == video_render.instance_id() || id == audio_render.instance_id())
        })
        .expect("renderer end of stream");
        if id == video_render.instance_id() {
            video_done = true;
        } else {
            audio_done = true;
        }
    }

    // Every packet the demuxer shipped was worked on.
    match demuxer.get_config(ConfigKind::WorkerStats).unwrap() {
        Config::WorkerStats(stats) => assert!(stats.units_done > 0),
        other => panic!("unexpected config {other:?}"),
    }

    for handle in [&video_render, &audio_render, &vdec, &adec, &demuxer, &clock] {
        drive(handle, ComponentState::Idle);
        drive(handle, ComponentState::Loaded);
    }
    registry
        .set_bind(Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)), None)
        .unwrap();
    registry
        .set_bind(Some((&demuxer, DEMUXER_PORT_OUT_AUDIO)), None)
        .unwrap();
    registry
        .set_bind(Some((&vdec, TRANSFORM_PORT_OUT)), None)
        .unwrap();
    registry
        .set_bind(Some((&adec, TRANSFORM_PORT_OUT)), None)
        .unwrap();
    registry
        .set_bind(Some((&clock, CLOCK_PORT_OUT_VIDEO)), None)
        .unwrap();
    registry
        .set_bind(Some((&clock, CLOCK_PORT_OUT_AUDIO)), None)
        .unwrap();
    for handle in all {
        registry.free_handle(handle).unwrap();
    }
}

#[test]
#[serial]
fn seek_rewinds_the_source_and_replays() {
    let registry = ComponentRegistry::with_builtins();
    let (sink, events, _) = event_sink();

    let demuxer = registry.get_handle("DEMUXER", sink.clone()).unwrap();
    let vdec = registry.get_handle("VDEC", sink.clone()).unwrap();
    let video_render = registry.get_handle("VIDEO_RENDER", sink).unwrap();

    demuxer
        .set_parameter(Param::StreamSource(Box::new(SyntheticSource::video_only(
            100_000, 20_000,
        ))))
        .unwrap();
    registry
        .set_bind(
            Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)),
            Some((&vdec, TRANSFORM_PORT_IN)),
        )
        .unwrap();
    registry
        .set_bind(
            Some((&vdec, TRANSFORM_PORT_OUT)),
            Some((&video_render, VIDEO_RENDER_PORT_IN_VIDEO)),
        )
        .unwrap();

    for handle in [&demuxer, &vdec, &video_render] {
        drive(handle, ComponentState::Idle);
    }
    for handle in [&video_render, &vdec, &demuxer] {
        drive(handle, ComponentState::Executing);
    }

    wait_for_event(&events, TIMEOUT, |id, e| {
        id == video_render.instance_id() && matches!(e, Event::BufferFlag { .. })
    })
    .expect("first pass end of stream");

    // Rewind: flush downstream, reposition the source.
    let position = TimestampInfo {
        port_index: 0,
        timestamp: 0,
    };
    video_render.set_config(Config::TimePosition(position)).unwrap();
    vdec.set_config(Config::TimePosition(position)).unwrap();
    demuxer.set_config(Config::TimePosition(position)).unwrap();

    wait_for_event(&events, TIMEOUT, |_, e| {
        matches!(e, Event::VideoRenderFirstFrame)
    })
    .expect("replay first frame");
    wait_for_event(&events, TIMEOUT, |id, e| {
        id == video_render.instance_id() && matches!(e, Event::BufferFlag { .. })
    })
    .expect("replay end of stream");

    for handle in [&video_render, &vdec, &demuxer] {
        drive(handle, ComponentState::Idle);
        drive(handle, ComponentState::Loaded);
    }
    registry
        .set_bind(Some((&demuxer, DEMUXER_PORT_OUT_VIDEO)), None)
        .unwrap();
    registry
        .set_bind(Some((&vdec, TRANSFORM_PORT_OUT)), None)
        .unwrap();
    for handle in [&demuxer, &vdec, &video_render] {
        registry.free_handle(handle).unwrap();
    }
}
