// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Recording facade: the application produces raw frames, the pipeline is
//! encoder → muxer, and segment rotation is surfaced as events.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, unbounded};
use thiserror::Error;

use medialib::components::{MUXER_PORT_IN_VIDEO, TRANSFORM_PORT_IN, TRANSFORM_PORT_OUT};
use medialib::engine::{CodecEngine, ContainerWriter};
use medialib::{
    BufferFlags, BufferPool, Command, ComponentHandle, ComponentObserver, ComponentRegistry,
    ComponentState, Config, Event, MediaBuffer, MediaError, Param,
};

use crate::player::PlayerError;

/// Frame shells available to the application side. Writing faster than the
/// encoder drains is backpressure, not an error.
const FRAME_POOL_CAPACITY: usize = 8;

const FINISH_DEADLINE: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("timed out waiting for the recording to finalize")]
    Timeout,

    #[error("recorder is not running")]
    NotRecording,

    #[error("no frame shell available, encoder is behind")]
    Backpressure,
}

impl From<PlayerError> for RecorderError {
    fn from(err: PlayerError) -> Self {
        match err {
            PlayerError::Media(e) => Self::Media(e),
            PlayerError::Timeout => Self::Timeout,
            PlayerError::NoSource | PlayerError::NotPrepared => Self::NotRecording,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderEvent {
    /// The muxer hit its rotation threshold and moved to the next segment.
    SegmentRotated,
    /// The final segment is closed; the recording is complete.
    FileDone,
    Fault(MediaError),
}

/// Engines and knobs for one recording session.
#[derive(Default)]
pub struct RecorderConfig {
    pub encoder: Option<Box<dyn CodecEngine>>,
    pub writer: Option<Box<dyn ContainerWriter>>,
    /// Segment rotation threshold in microseconds; 0 disables rotation.
    pub rotation_us: i64,
}

struct RecorderObserver {
    tx: Sender<RecorderEvent>,
    pool: BufferPool,
}

impl ComponentObserver for RecorderObserver {
    fn on_event(&self, _component_id: &str, event: Event) {
        match event {
            Event::MuxerNeedNextFile => {
                let _ = self.tx.send(RecorderEvent::SegmentRotated);
            }
            Event::MuxerFileDone => {
                let _ = self.tx.send(RecorderEvent::FileDone);
            }
            Event::Error { error, .. } => {
                if matches!(
                    error,
                    MediaError::ErrorsInFrame | MediaError::InsufficientResources
                ) {
                    let _ = self.tx.send(RecorderEvent::Fault(error));
                }
            }
            _ => {}
        }
    }

    /// The encoder's input side is unbound, so consumed frames come back
    /// here and return to the application-facing pool.
    fn on_buffer_returned(&self, _component_id: &str, buffer: MediaBuffer) {
        self.pool.release(buffer);
    }
}

pub struct Recorder {
    registry: Arc<ComponentRegistry>,
    observer: Arc<RecorderObserver>,
    events: Receiver<RecorderEvent>,
    venc: Option<ComponentHandle>,
    muxer: Option<ComponentHandle>,
    recording: bool,
}

impl Recorder {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            registry,
            observer: Arc::new(RecorderObserver {
                tx,
                pool: BufferPool::new(FRAME_POOL_CAPACITY),
            }),
            events: rx,
            venc: None,
            muxer: None,
            recording: false,
        }
    }

    pub fn events(&self) -> Receiver<RecorderEvent> {
        self.events.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Build encoder → muxer, apply the session config, and run.
    pub fn start(&mut self, config: RecorderConfig) -> Result<(), RecorderError> {
        let observer: Arc<dyn ComponentObserver> = self.observer.clone();
        let venc = self.registry.get_handle("VENC", observer.clone())?;
        let muxer = self.registry.get_handle("MUXER", observer)?;

        if let Some(encoder) = config.encoder {
            venc.set_parameter(Param::CodecEngine(encoder))?;
        }
        if let Some(writer) = config.writer {
            muxer.set_parameter(Param::ContainerWriter(writer))?;
        }
        muxer.set_config(Config::RotationDuration(config.rotation_us))?;

        self.registry.set_bind(
            Some((&venc, TRANSFORM_PORT_OUT)),
            Some((&muxer, MUXER_PORT_IN_VIDEO)),
        )?;

        for handle in [&muxer, &venc] {
            drive(handle, ComponentState::Idle)?;
            drive(handle, ComponentState::Executing)?;
        }

        self.venc = Some(venc);
        self.muxer = Some(muxer);
        self.recording = true;
        Ok(())
    }

    /// Hand one raw frame to the encoder. `Backpressure` when every shell is
    /// in flight; retry after the encoder returns one.
    pub fn write_frame(&self, payload: Bytes, pts: i64) -> Result<(), RecorderError> {
        let venc = self.venc.as_ref().ok_or(RecorderError::NotRecording)?;
        let Some(mut shell) = self.observer.pool.acquire() else {
            return Err(RecorderError::Backpressure);
        };
        shell.payload = payload;
        shell.pts = pts;
        shell.input_port = TRANSFORM_PORT_IN;
        if let Err(shell) = venc.send_buffer(shell) {
            self.observer.pool.release(shell);
            return Err(RecorderError::Media(MediaError::BadParameter));
        }
        let _ = venc.send_command(Command::WakeUp);
        Ok(())
    }

    /// Signal end-of-stream, wait for the muxer to finalize, tear down.
    pub fn finish(&mut self) -> Result<(), RecorderError> {
        let venc = self.venc.take().ok_or(RecorderError::NotRecording)?;
        let muxer = self.muxer.take().ok_or(RecorderError::NotRecording)?;
        self.recording = false;

        if let Some(mut shell) = self.observer.pool.acquire() {
            shell.flags |= BufferFlags::EOS;
            shell.input_port = TRANSFORM_PORT_IN;
            if let Err(shell) = venc.send_buffer(shell) {
                self.observer.pool.release(shell);
            }
        }
        venc.send_command(Command::Eos)?;
        let _ = venc.send_command(Command::WakeUp);

        let deadline = std::time::Instant::now() + FINISH_DEADLINE;
        loop {
            let remaining = deadline
                .checked_duration_since(std::time::Instant::now())
                .ok_or(RecorderError::Timeout)?;
            match self.events.recv_timeout(remaining) {
                Ok(RecorderEvent::FileDone) => break,
                Ok(RecorderEvent::Fault(error)) => {
                    self.teardown(&venc, &muxer)?;
                    return Err(error.into());
                }
                Ok(_) => {}
                Err(_) => {
                    self.teardown(&venc, &muxer)?;
                    return Err(RecorderError::Timeout);
                }
            }
        }

        self.teardown(&venc, &muxer)
    }

    fn teardown(&self, venc: &ComponentHandle, muxer: &ComponentHandle) -> Result<(), RecorderError> {
        for handle in [venc, muxer] {
            if matches!(
                handle.get_state(),
                ComponentState::Executing | ComponentState::Pause
            ) {
                drive(handle, ComponentState::Idle)?;
            }
            if handle.get_state() == ComponentState::Idle {
                drive(handle, ComponentState::Loaded)?;
            }
        }
        let _ = self.registry.set_bind(Some((venc, TRANSFORM_PORT_OUT)), None);
        self.registry.free_handle(venc)?;
        self.registry.free_handle(muxer)?;
        Ok(())
    }
}

fn drive(handle: &ComponentHandle, target: ComponentState) -> Result<(), RecorderError> {
    crate::player::drive_state(handle, target).map_err(RecorderError::from)
}
