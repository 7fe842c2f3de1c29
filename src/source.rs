/*!
    The source handle: creation, metadata surface, and lifecycle.
*/

use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::SourceConfig;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::pump::{Pump, Sample};
use crate::track::{self, TrackDescriptor, TrackId, TrackKind};

/**
    A readable, seekable byte source usable as creation input.

    Blanket-implemented; callers hand in files, cursors, or anything else
    that reads and seeks.
*/
pub trait MediaStream: Read + Seek + Send + 'static {}

impl<T: Read + Seek + Send + 'static> MediaStream for T {}

struct Inner {
    tracks: Vec<TrackDescriptor>,
    can_seek: bool,
    duration: Option<Duration>,
    buffer_time: Duration,
    pump: Mutex<Pump>,
}

/**
    A ready-to-stream media source.

    Produced by the creation APIs once the engine has been opened, all
    tracks probed, and decode modes resolved. Cloning the handle shares the
    same engine context; the context itself is single-owned inside the pump
    and released exactly once, by whichever clone calls
    [`shutdown`](Self::shutdown) first (dropping the last clone releases it
    as a safety net).

    The handle is `Send + Sync`: sample requests, seeks, and shutdown may
    arrive from different threads and are serialized on one internal lock.
*/
#[derive(Clone)]
pub struct MediaSource {
    inner: Arc<Inner>,
}

impl MediaSource {
    /**
        Build a source over an already-opened engine context.

        This is the engine-agnostic core every creation entry point funnels
        into. Fails with [`Error::UnsupportedMedia`] when no track is
        usable.
    */
    pub fn from_engine(engine: Box<dyn Engine>, config: &SourceConfig) -> Result<Self> {
        let tracks = track::resolve_tracks(engine.tracks(), config);
        if !tracks.iter().any(|t| t.active) {
            return Err(Error::unsupported("no usable tracks"));
        }

        let can_seek = engine.can_seek();
        let duration = engine.duration();
        let buffer_time = engine.buffer_time();
        debug!(
            tracks = tracks.len(),
            can_seek,
            ?duration,
            "media source ready"
        );

        let pump = Mutex::new(Pump::new(engine, &tracks));
        Ok(Self {
            inner: Arc::new(Inner {
                tracks,
                can_seek,
                duration,
                buffer_time,
                pump,
            }),
        })
    }

    /**
        Async variant of [`from_engine`](Self::from_engine) for engines
        that are expensive to open: the factory runs the blocking probe on
        a worker thread and the future resolves with the ready handle.

        Dropping the future before completion abandons the probe cleanly;
        the factory's engine (if it got as far as opening one) is dropped
        on the worker.
    */
    pub async fn from_engine_factory_async<F>(factory: F, config: SourceConfig) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn Engine>> + Send + 'static,
    {
        tokio::task::spawn_blocking(move || Self::from_engine(factory()?, &config))
            .await
            .map_err(|e| Error::engine(format!("creation task failed: {e}")))?
    }

    /**
        Open a media source from a URI.

        Protocol options from the config are forwarded verbatim to the
        engine. An empty URI fails with [`Error::InvalidInput`] before any
        engine context is created.
    */
    pub fn from_uri(uri: &str, config: &SourceConfig) -> Result<Self> {
        if uri.trim().is_empty() {
            return Err(Error::invalid_input("empty uri"));
        }
        Self::open_uri_engine(uri, config)
    }

    /**
        Open a media source from a readable, seekable byte stream.

        A zero-length stream fails with [`Error::InvalidInput`] before any
        engine context is created.
    */
    pub fn from_stream<S: MediaStream>(mut stream: S, config: &SourceConfig) -> Result<Self> {
        let len = stream
            .seek(SeekFrom::End(0))
            .map_err(|e| Error::invalid_input(format!("unreadable stream: {e}")))?;
        if len == 0 {
            return Err(Error::invalid_input("empty stream"));
        }
        stream
            .seek(SeekFrom::Start(0))
            .map_err(|e| Error::invalid_input(format!("unreadable stream: {e}")))?;
        Self::open_stream_engine(stream, config)
    }

    /**
        Async variant of [`from_uri`](Self::from_uri); probing runs on a
        blocking worker and the future resolves with the ready handle.
    */
    pub async fn from_uri_async(uri: impl Into<String>, config: SourceConfig) -> Result<Self> {
        let uri = uri.into();
        tokio::task::spawn_blocking(move || Self::from_uri(&uri, &config))
            .await
            .map_err(|e| Error::engine(format!("creation task failed: {e}")))?
    }

    /**
        Async variant of [`from_stream`](Self::from_stream).
    */
    pub async fn from_stream_async<S: MediaStream>(
        stream: S,
        config: SourceConfig,
    ) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::from_stream(stream, &config))
            .await
            .map_err(|e| Error::engine(format!("creation task failed: {e}")))?
    }

    /**
        Legacy shape of [`from_uri`](Self::from_uri): `None` on any
        failure instead of an error. Same implementation underneath.
    */
    pub fn from_uri_opt(uri: &str, config: &SourceConfig) -> Option<Self> {
        match Self::from_uri(uri, config) {
            Ok(source) => Some(source),
            Err(e) => {
                debug!(error = %e, "from_uri failed");
                None
            }
        }
    }

    /**
        Legacy shape of [`from_stream`](Self::from_stream): `None` on any
        failure instead of an error.
    */
    pub fn from_stream_opt<S: MediaStream>(stream: S, config: &SourceConfig) -> Option<Self> {
        match Self::from_stream(stream, config) {
            Ok(source) => Some(source),
            Err(e) => {
                debug!(error = %e, "from_stream failed");
                None
            }
        }
    }

    #[cfg(feature = "ffmpeg")]
    fn open_uri_engine(uri: &str, config: &SourceConfig) -> Result<Self> {
        let engine = crate::ffmpeg::FfmpegEngine::open_uri(uri, config)?;
        Self::from_engine(Box::new(engine), config)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn open_uri_engine(_uri: &str, _config: &SourceConfig) -> Result<Self> {
        Err(Error::unsupported(
            "built without the `ffmpeg` feature; use from_engine",
        ))
    }

    #[cfg(feature = "ffmpeg")]
    fn open_stream_engine<S: MediaStream>(stream: S, config: &SourceConfig) -> Result<Self> {
        let engine = crate::ffmpeg::FfmpegEngine::open_stream(stream, config)?;
        Self::from_engine(Box::new(engine), config)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn open_stream_engine<S: MediaStream>(_stream: S, _config: &SourceConfig) -> Result<Self> {
        Err(Error::unsupported(
            "built without the `ffmpeg` feature; use from_engine",
        ))
    }

    // ── Metadata surface ──────────────────────────────────────────────

    /**
        Whether the source supports seeking. Computed once at creation.
    */
    pub fn can_seek(&self) -> bool {
        self.inner.can_seek
    }

    /**
        Container duration in milliseconds, 0 for unbounded/live sources.
    */
    pub fn duration_millis(&self) -> u64 {
        self.inner.duration.map_or(0, |d| d.as_millis() as u64)
    }

    /**
        Engine read-ahead in milliseconds, 0 when the input is fully
        prefetched.
    */
    pub fn buffer_time_millis(&self) -> u32 {
        self.inner.buffer_time.as_millis() as u32
    }

    /**
        All resolved tracks in container order.
    */
    pub fn tracks(&self) -> &[TrackDescriptor] {
        &self.inner.tracks
    }

    /**
        The primary audio track: first audio track in container order.
    */
    pub fn audio_track(&self) -> Option<&TrackDescriptor> {
        self.track_of_kind(TrackKind::Audio)
    }

    /**
        The primary video track: first video track in container order.
    */
    pub fn video_track(&self) -> Option<&TrackDescriptor> {
        self.track_of_kind(TrackKind::Video)
    }

    fn track_of_kind(&self, kind: TrackKind) -> Option<&TrackDescriptor> {
        self.inner.tracks.iter().find(|t| t.kind == kind)
    }

    // ── Streaming surface ─────────────────────────────────────────────

    /**
        Request the next sample for a track.

        Returns `Ok(None)` at end of stream. Requests for different tracks
        may interleave freely; each track's samples come back in
        non-decreasing presentation order.
    */
    pub fn request_sample(&self, track: TrackId) -> Result<Option<Sample>> {
        self.inner.pump.lock().request_sample(track)
    }

    /**
        Seek to a target position.

        Exclusive with sample requests; an in-flight request completes
        before the seek starts. A failed seek on a still-usable engine
        leaves the source streaming at the pre-seek position.
    */
    pub fn seek(&self, target: Duration) -> Result<()> {
        self.inner.pump.lock().seek(target)
    }

    /**
        Millisecond convenience wrapper over [`seek`](Self::seek).
    */
    pub fn seek_millis(&self, target_millis: u64) -> Result<()> {
        self.seek(Duration::from_millis(target_millis))
    }

    /**
        Extract embedded cover art as an encoded image buffer.

        `None` when the container carries no attached picture; never an
        error. Independent of the streaming path.
    */
    pub fn extract_thumbnail(&self) -> Option<Vec<u8>> {
        self.inner.pump.lock().extract_thumbnail()
    }

    /**
        Shut the source down and release the engine context.

        Idempotent and safe to call concurrently with in-flight requests:
        a request holding the lock completes first; every request arriving
        afterwards fails with [`Error::Shutdown`].
    */
    pub fn shutdown(&self) {
        self.inner.pump.lock().shutdown();
    }

    /**
        Whether [`shutdown`](Self::shutdown) has run.
    */
    pub fn is_shut_down(&self) -> bool {
        self.inner.pump.lock().is_shut_down()
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSource")
            .field("tracks", &self.inner.tracks)
            .field("can_seek", &self.inner.can_seek)
            .field("duration", &self.inner.duration)
            .field("buffer_time", &self.inner.buffer_time)
            .finish_non_exhaustive()
    }
}
