// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCoding {
    Pcm,
    Aac,
    Mp3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCoding {
    H264,
    Mpeg4,
    Mjpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Audio,
    Video,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Format carried by a port definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaFormat {
    Unspecified,
    Audio {
        coding: AudioCoding,
        channels: u32,
        sample_rate: u32,
    },
    Video {
        coding: VideoCoding,
        width: u32,
        height: u32,
        frame_rate: u32,
    },
}

impl MediaFormat {
    pub fn kind(&self) -> Option<StreamKind> {
        match self {
            Self::Unspecified => None,
            Self::Audio { .. } => Some(StreamKind::Audio),
            Self::Video { .. } => Some(StreamKind::Video),
        }
    }
}

impl Default for MediaFormat {
    fn default() -> Self {
        Self::Unspecified
    }
}

/// One elementary stream discovered by the demuxer probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub index: u32,
    pub kind: StreamKind,
    pub format: MediaFormat,
}

/// Everything the demuxer learned about its source, delivered through the
/// `PortFormatDetected` event and the `StreamInfo` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamInfo {
    pub duration_us: i64,
    pub streams: Vec<StreamDescriptor>,
}

impl StreamInfo {
    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Audio)
    }

    pub fn has_video(&self) -> bool {
        self.streams.iter().any(|s| s.kind == StreamKind::Video)
    }

    pub fn first_of(&self, kind: StreamKind) -> Option<&StreamDescriptor> {
        self.streams.iter().find(|s| s.kind == kind)
    }
}
