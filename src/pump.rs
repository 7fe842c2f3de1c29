/*!
    The sample pump: per-track pull-based delivery over the engine.

    State machine: `Idle → Streaming ⇄ Seeking`, with the terminal states
    `Shutdown` and `Failed` reachable from any non-terminal state. The pump
    is strictly pull-based: it only drains the engine while answering a
    request, so memory is bounded by the container's interleave window.
*/

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, trace};

use crate::engine::{Engine, EnginePacket};
use crate::error::{Error, Result};
use crate::track::{DecodeMode, TrackDescriptor, TrackId};

/**
    One timestamped unit of media data delivered to the consumer.

    The payload is the encoded packet for `Passthrough` tracks and raw
    decoded bytes for `ForceDecode` tracks. End of stream is signaled by
    `request_sample` returning `Ok(None)`, not by a sentinel sample.
*/
#[derive(Clone, Debug)]
pub struct Sample {
    /// The track this sample belongs to.
    pub track: TrackId,
    /// Presentation timestamp, non-decreasing per track.
    pub pts: Duration,
    /// Sample duration, if the engine reported one.
    pub duration: Option<Duration>,
    /// Keyframe flag (always true for audio, meaningful for video).
    pub key_frame: bool,
    /// Encoded or decoded payload, depending on the track's mode.
    pub payload: Vec<u8>,
}

#[derive(Debug)]
pub(crate) enum PumpState {
    Idle,
    Streaming,
    Seeking,
    Shutdown,
    Failed(Error),
}

struct TrackState {
    decode_mode: DecodeMode,
    active: bool,
    /// Samples demuxed while serving another track's request.
    queue: VecDeque<Sample>,
    /// Floor for monotonic pts delivery.
    last_pts: Option<Duration>,
    /// End of stream has been delivered for this track.
    eos: bool,
}

impl TrackState {
    fn rearm(&mut self) {
        self.queue.clear();
        self.last_pts = None;
        self.eos = false;
    }
}

/**
    The pump owns the engine context for the lifetime of the source and
    releases it exactly once, on shutdown.

    All methods run under the source handle's exclusive lock.
*/
pub(crate) struct Pump {
    engine: Option<Box<dyn Engine>>,
    state: PumpState,
    tracks: Vec<TrackState>,
    /// The engine reported end of stream; tracks drain their queues then go EOS.
    at_eof: bool,
}

impl Pump {
    pub(crate) fn new(engine: Box<dyn Engine>, descriptors: &[TrackDescriptor]) -> Self {
        let tracks = descriptors
            .iter()
            .map(|d| TrackState {
                decode_mode: d.decode_mode,
                active: d.active,
                queue: VecDeque::new(),
                last_pts: None,
                eos: false,
            })
            .collect();

        Self {
            engine: Some(engine),
            state: PumpState::Idle,
            tracks,
            at_eof: false,
        }
    }

    /**
        Answer one sample request for `track`.

        Returns `Ok(None)` at end of stream, first when the engine runs dry
        and the track's queue is drained, and for every request after that.
    */
    pub(crate) fn request_sample(&mut self, track: TrackId) -> Result<Option<Sample>> {
        self.check_streaming()?;
        self.state = PumpState::Streaming;

        let state = self
            .tracks
            .get(track)
            .ok_or_else(|| Error::invalid_input(format!("unknown track {track}")))?;
        if !state.active {
            return Err(Error::invalid_input(format!("track {track} is inactive")));
        }

        loop {
            if let Some(sample) = self.tracks[track].queue.pop_front() {
                return Ok(Some(self.stamp(track, sample)));
            }
            if self.tracks[track].eos || self.at_eof {
                self.tracks[track].eos = true;
                trace!(track, "end of stream");
                return Ok(None);
            }

            let Some(engine) = self.engine.as_mut() else {
                return Err(Error::Shutdown);
            };
            match engine.read_packet() {
                Ok(Some(packet)) => {
                    if let Err(e) = self.route_packet(packet) {
                        self.fail(e.clone());
                        return Err(e);
                    }
                }
                Ok(None) => {
                    self.at_eof = true;
                }
                Err(e) => {
                    self.fail(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /**
        Reposition the engine and re-arm every track.

        All-or-nothing across tracks: queued-but-undelivered samples are
        flushed for everyone before the engine moves. Fail-soft policy: a
        seek error that leaves the engine usable is reported to the caller
        and the pump returns to `Streaming` at the pre-seek position; only
        a fatal engine error transitions to `Failed`.
    */
    pub(crate) fn seek(&mut self, target: Duration) -> Result<()> {
        self.check_streaming()?;

        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::Shutdown);
        };
        if !engine.can_seek() {
            return Err(Error::unsupported("source is not seekable"));
        }

        debug!(?target, "seek");
        self.state = PumpState::Seeking;
        for track in &mut self.tracks {
            track.queue.clear();
        }

        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::Shutdown);
        };
        match engine.seek(target) {
            Ok(()) => {
                for track in &mut self.tracks {
                    track.rearm();
                }
                self.at_eof = false;
                self.state = PumpState::Streaming;
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                self.fail(e.clone());
                Err(e)
            }
            Err(e) => {
                debug!(error = %e, "seek failed, staying at pre-seek position");
                self.state = PumpState::Streaming;
                Err(e)
            }
        }
    }

    /**
        Extract the embedded attached picture, independent of pump state.

        Returns `None` after shutdown rather than an error.
    */
    pub(crate) fn extract_thumbnail(&mut self) -> Option<Vec<u8>> {
        self.engine.as_mut()?.attached_picture()
    }

    /**
        Enter `Shutdown` and release the engine context.

        Idempotent: only the first call drops the engine; later calls are
        no-ops. Callable from any state, including `Failed`.
    */
    pub(crate) fn shutdown(&mut self) {
        if matches!(self.state, PumpState::Shutdown) {
            return;
        }
        debug!("shutting down media source");
        self.state = PumpState::Shutdown;
        for track in &mut self.tracks {
            track.queue.clear();
        }
        // Sole release point for the engine context.
        self.engine = None;
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        matches!(self.state, PumpState::Shutdown)
    }

    fn check_streaming(&self) -> Result<()> {
        match &self.state {
            PumpState::Shutdown => Err(Error::Shutdown),
            PumpState::Failed(e) => Err(e.clone()),
            PumpState::Idle | PumpState::Streaming | PumpState::Seeking => Ok(()),
        }
    }

    fn fail(&mut self, error: Error) {
        debug!(%error, "pump entering failed state");
        self.state = PumpState::Failed(error);
    }

    /**
        Route one demuxed packet to its owning track's queue, applying the
        track's decode mode. Packets for unknown or inactive tracks are
        dropped.
    */
    fn route_packet(&mut self, packet: EnginePacket) -> Result<()> {
        let track = packet.track;
        let Some(state) = self.tracks.get(track) else {
            return Ok(());
        };
        if !state.active || state.eos {
            return Ok(());
        }

        match state.decode_mode {
            DecodeMode::Passthrough => {
                let sample = Sample {
                    track,
                    pts: packet.pts.unwrap_or(Duration::ZERO),
                    duration: packet.duration,
                    key_frame: packet.key_frame,
                    payload: packet.data,
                };
                self.tracks[track].queue.push_back(sample);
            }
            DecodeMode::ForceDecode => {
                let duration = packet.duration;
                let Some(engine) = self.engine.as_mut() else {
                    return Err(Error::Shutdown);
                };
                let frames = engine.decode(track, packet)?;
                let queue = &mut self.tracks[track].queue;
                for frame in frames {
                    queue.push_back(Sample {
                        track,
                        pts: frame.pts.unwrap_or(Duration::ZERO),
                        duration,
                        // Decoded frames are independently presentable.
                        key_frame: true,
                        payload: frame.data,
                    });
                }
            }
        }
        Ok(())
    }

    /**
        Enforce non-decreasing presentation order for a track: a timestamp
        below the floor is clamped to it.
    */
    fn stamp(&mut self, track: TrackId, mut sample: Sample) -> Sample {
        let state = &mut self.tracks[track];
        if let Some(last) = state.last_pts {
            if sample.pts < last {
                sample.pts = last;
            }
        }
        state.last_pts = Some(sample.pts);
        sample
    }
}
