/*!
    The seam to the external demux/decode engine.

    The adapter treats the engine as a black box: it parses the container,
    produces per-track encoded packets, and can decode them to raw frames on
    request. The FFmpeg-backed implementation lives behind the `ffmpeg`
    feature; tests drive the pump with a scripted engine instead.
*/

use std::time::Duration;

use crate::error::Result;
use crate::track::{CodecId, TrackKind};

/**
    One elementary track as discovered by the engine probe.

    Track order must follow container order; the adapter assigns its
    public [`TrackId`](crate::TrackId)s from positions in this list.
*/
#[derive(Clone, Debug)]
pub struct EngineTrack {
    /// Stream kind.
    pub kind: TrackKind,
    /// Codec of the encoded bitstream.
    pub codec: CodecId,
    /// Engine-native codec name.
    pub codec_name: String,
    /// Whether the engine has a decoder for this codec.
    pub decodable: bool,
}

/**
    An encoded packet pulled from the engine, still in demux order.
*/
#[derive(Clone, Debug)]
pub struct EnginePacket {
    /// Index into the engine's track list.
    pub track: usize,
    /// Presentation timestamp, if the container carries one.
    pub pts: Option<Duration>,
    /// Packet duration, if known.
    pub duration: Option<Duration>,
    /// Keyframe flag (meaningful for video).
    pub key_frame: bool,
    /// Encoded payload.
    pub data: Vec<u8>,
}

/**
    A decoded frame produced by the engine's decoder.
*/
#[derive(Clone, Debug)]
pub struct EngineFrame {
    /// Presentation timestamp, if known.
    pub pts: Option<Duration>,
    /// Raw decoded payload.
    pub data: Vec<u8>,
}

/**
    The external demux/decode engine.

    Implementations own one opened container context. All methods are
    called under the source's exclusive lock, so implementations need no
    internal synchronization; they only need to be `Send` so the handle can
    cross threads.
*/
pub trait Engine: Send {
    /**
        The tracks discovered at open, in container order.
    */
    fn tracks(&self) -> &[EngineTrack];

    /**
        Total container duration, `None` for unbounded/live sources.
    */
    fn duration(&self) -> Option<Duration>;

    /**
        Whether the underlying input supports repositioning.
    */
    fn can_seek(&self) -> bool;

    /**
        Internal read-ahead the engine performs, `Duration::ZERO` when the
        input is fully prefetched (e.g. a local file).
    */
    fn buffer_time(&self) -> Duration;

    /**
        Pull the next packet in demux order.

        Returns `Ok(None)` at end of stream. An `Err` means the engine
        context is no longer usable.
    */
    fn read_packet(&mut self) -> Result<Option<EnginePacket>>;

    /**
        Decode a packet for the given track into zero or more raw frames.
    */
    fn decode(&mut self, track: usize, packet: EnginePacket) -> Result<Vec<EngineFrame>>;

    /**
        Reposition to the nearest keyframe at or before `target` (exact for
        audio-only inputs) and reset any decoder state.

        On a non-fatal error the engine must remain usable at its pre-seek
        position.
    */
    fn seek(&mut self, target: Duration) -> Result<()>;

    /**
        The embedded attached picture (cover art), if the container has one.

        Absence is not an error.
    */
    fn attached_picture(&mut self) -> Option<Vec<u8>>;
}
