/*!
    Pull-based media source adapter over an external demux/decode engine.

    This crate takes an opaque byte stream or URI, drives the engine to
    discover its elementary tracks, and exposes those tracks through a
    strictly pull-based sample-delivery protocol: encoded packets for
    passthrough tracks, decoded frames for force-decoded ones, plus
    seeking, embedded cover-art extraction, and idempotent shutdown.

    The engine is a black-box collaborator behind the [`Engine`] trait.
    The FFmpeg-backed implementation is enabled with the `ffmpeg` cargo
    feature; without it, sources are built from an engine the caller
    supplies via [`MediaSource::from_engine`].

    ```ignore
    let config = SourceConfig::default().with_protocol_option("rtsp_flags", "prefer_tcp");
    let source = MediaSource::from_uri("video.mp4", &config)?;
    let audio = source.audio_track().map(|t| t.id);
    while let Some(track) = audio {
        match source.request_sample(track)? {
            Some(sample) => consume(sample),
            None => break,
        }
    }
    source.shutdown();
    ```
*/

mod config;
mod engine;
mod error;
#[cfg(feature = "ffmpeg")]
mod ffmpeg;
mod pump;
mod source;
mod track;

pub use config::SourceConfig;
pub use engine::{Engine, EngineFrame, EnginePacket, EngineTrack};
pub use error::{Error, Result};
#[cfg(feature = "ffmpeg")]
pub use ffmpeg::FfmpegEngine;
pub use pump::Sample;
pub use source::{MediaSource, MediaStream};
pub use track::{CodecId, DecodeMode, TrackDescriptor, TrackId, TrackKind};
