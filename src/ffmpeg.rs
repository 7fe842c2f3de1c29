/*!
    FFmpeg-backed implementation of the [`Engine`] trait.

    Opens a container from a URI (with protocol options forwarded as an
    AVDictionary) or from an arbitrary `Read + Seek` byte stream via a
    custom AVIO context, probes the streams, and serves demuxed packets
    and decoded frames to the pump.
*/

use std::ffi::CString;
use std::io::{Read, Seek, SeekFrom};
use std::os::raw::{c_int, c_void};
use std::time::Duration;

use ffmpeg_next::{
    Rational,
    codec,
    ffi,
    format::context::Input as InputContext,
    packet::Mut as PacketMut,
    util::frame,
};

use crate::config::SourceConfig;
use crate::engine::{Engine, EngineFrame, EnginePacket, EngineTrack};
use crate::error::{Error, Result};
use crate::source::MediaStream;
use crate::track::{CodecId, TrackKind};

/// Read-ahead advertised for network inputs. Local files and byte streams
/// are fully prefetched and advertise zero.
const NETWORK_BUFFER_TIME: Duration = Duration::from_secs(5);

/// Buffer size handed to avio_alloc_context for custom stream IO.
const IO_BUFFER_SIZE: usize = 16 * 1024;

enum TrackDecoder {
    Audio(codec::decoder::Audio),
    Video(codec::decoder::Video),
}

/**
    One opened FFmpeg demux context plus lazily-created decoders.
*/
pub struct FfmpegEngine {
    input: InputContext,
    tracks: Vec<EngineTrack>,
    /// Engine stream index -> adapter track index.
    stream_to_track: Vec<Option<usize>>,
    /// Per track: stream index, time base, codec parameters for decoding.
    track_streams: Vec<usize>,
    time_bases: Vec<Rational>,
    parameters: Vec<codec::Parameters>,
    decoders: Vec<Option<TrackDecoder>>,
    duration: Option<Duration>,
    can_seek: bool,
    buffer_time: Duration,
    attached_picture: Option<Vec<u8>>,
    /// Keeps the custom AVIO context and its opaque reader alive for
    /// stream-backed inputs. Dropped after `input`.
    _io: Option<StreamIo>,
}

// The raw pointers in StreamIo are owned exclusively by this engine and
// only touched under the source's lock.
unsafe impl Send for FfmpegEngine {}

impl FfmpegEngine {
    /**
        Open a URI, forwarding the config's protocol options verbatim.
    */
    pub fn open_uri(uri: &str, config: &SourceConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::engine(e.to_string()))?;

        let c_uri = CString::new(uri).map_err(|_| Error::invalid_input("uri contains NUL"))?;
        let mut dict = options_to_dict(config)?;
        let mut ctx: *mut ffi::AVFormatContext = std::ptr::null_mut();

        // SAFETY: ctx and dict are valid out-pointers; FFmpeg owns the
        // context on success and leaves ctx null on failure.
        let code = unsafe { ffi::avformat_open_input(&mut ctx, c_uri.as_ptr(), std::ptr::null(), &mut dict) };
        unsafe { ffi::av_dict_free(&mut dict) };
        if code < 0 {
            return Err(map_open_error(code, is_network_uri(uri)));
        }

        let input = finish_open(ctx)?;
        let buffer_time = if is_network_uri(uri) {
            NETWORK_BUFFER_TIME
        } else {
            Duration::ZERO
        };
        Self::from_input(input, None, buffer_time)
    }

    /**
        Open an arbitrary readable, seekable byte stream through a custom
        AVIO context.
    */
    pub fn open_stream<S: MediaStream>(stream: S, config: &SourceConfig) -> Result<Self> {
        ffmpeg_next::init().map_err(|e| Error::engine(e.to_string()))?;

        let io = StreamIo::new(Box::new(stream))?;

        // SAFETY: avformat_alloc_context only fails on OOM.
        let ctx = unsafe { ffi::avformat_alloc_context() };
        if ctx.is_null() {
            return Err(Error::engine("avformat_alloc_context failed"));
        }
        // SAFETY: ctx is a fresh context; pb takes the custom AVIO context
        // and CUSTOM_IO tells close not to free it (StreamIo owns it).
        unsafe {
            (*ctx).pb = io.avio;
            (*ctx).flags |= ffi::AVFMT_FLAG_CUSTOM_IO as c_int;
        }

        let mut ctx = ctx;
        let mut dict = options_to_dict(config)?;
        // SAFETY: as in open_uri; the input URL is empty for stream IO.
        let code = unsafe {
            ffi::avformat_open_input(&mut ctx, c"".as_ptr(), std::ptr::null(), &mut dict)
        };
        unsafe { ffi::av_dict_free(&mut dict) };
        if code < 0 {
            return Err(map_open_error(code, false));
        }

        let input = finish_open(ctx)?;
        Self::from_input(input, Some(io), Duration::ZERO)
    }

    fn from_input(
        input: InputContext,
        io: Option<StreamIo>,
        buffer_time: Duration,
    ) -> Result<Self> {
        let stream_count = input.streams().count();
        let mut tracks = Vec::new();
        let mut stream_to_track = vec![None; stream_count];
        let mut track_streams = Vec::new();
        let mut time_bases = Vec::new();
        let mut parameters = Vec::new();
        let mut attached_picture = None;

        for stream in input.streams() {
            let params = stream.parameters();

            // Attached pictures (cover art) are thumbnail material, not
            // streamable tracks.
            // SAFETY: reading fields of a valid AVStream FFmpeg owns.
            let disposition = unsafe { (*stream.as_ptr()).disposition };
            if disposition & ffi::AV_DISPOSITION_ATTACHED_PIC as c_int != 0 {
                if attached_picture.is_none() {
                    attached_picture = read_attached_picture(&stream);
                }
                continue;
            }

            let kind = track_kind(&params);
            let codec_id = params.id();
            let track = EngineTrack {
                kind,
                codec: codec_id_from_ffmpeg(codec_id),
                codec_name: format!("{codec_id:?}").to_ascii_lowercase(),
                decodable: ffmpeg_next::decoder::find(codec_id).is_some(),
            };

            stream_to_track[stream.index()] = Some(tracks.len());
            track_streams.push(stream.index());
            time_bases.push(stream.time_base());
            parameters.push(params);
            tracks.push(track);
        }

        let duration = if input.duration() > 0 {
            Some(Duration::from_micros(input.duration() as u64))
        } else {
            None
        };

        // SAFETY: pb is valid for the lifetime of the input context.
        let io_seekable = unsafe {
            let pb = (*input.as_ptr()).pb;
            !pb.is_null() && (*pb).seekable != 0
        };
        let can_seek = io_seekable && duration.is_some();

        let decoders = (0..tracks.len()).map(|_| None).collect();

        Ok(Self {
            input,
            tracks,
            stream_to_track,
            track_streams,
            time_bases,
            parameters,
            decoders,
            duration,
            can_seek,
            buffer_time,
            attached_picture,
            _io: io,
        })
    }

    fn decoder_for(&mut self, track: usize) -> Result<&mut TrackDecoder> {
        let kind = self.tracks[track].kind;
        let params = &self.parameters[track];
        let slot = &mut self.decoders[track];

        if slot.is_none() {
            let ctx = codec::context::Context::from_parameters(params.clone())
                .map_err(|e| Error::engine(e.to_string()))?;
            let decoder = match kind {
                TrackKind::Audio => TrackDecoder::Audio(
                    ctx.decoder()
                        .audio()
                        .map_err(|e| Error::engine(e.to_string()))?,
                ),
                TrackKind::Video => TrackDecoder::Video(
                    ctx.decoder()
                        .video()
                        .map_err(|e| Error::engine(e.to_string()))?,
                ),
                TrackKind::Subtitle | TrackKind::Other => {
                    return Err(Error::unsupported("no decoder for this track kind"));
                }
            };
            *slot = Some(decoder);
        }

        match slot {
            Some(decoder) => Ok(decoder),
            None => Err(Error::engine("decoder unavailable")),
        }
    }
}

impl Engine for FfmpegEngine {
    fn tracks(&self) -> &[EngineTrack] {
        &self.tracks
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn can_seek(&self) -> bool {
        self.can_seek
    }

    fn buffer_time(&self) -> Duration {
        self.buffer_time
    }

    fn read_packet(&mut self) -> Result<Option<EnginePacket>> {
        loop {
            let (stream, packet) = match self.input.packets().next() {
                Some(next) => next,
                None => return Ok(None),
            };

            let Some(track) = self.stream_to_track[stream.index()] else {
                continue;
            };
            let time_base = self.time_bases[track];

            let data = packet.data().map(|d| d.to_vec()).unwrap_or_default();
            return Ok(Some(EnginePacket {
                track,
                pts: packet
                    .pts()
                    .or_else(|| packet.dts())
                    .and_then(|ts| ts_to_duration(ts, time_base)),
                duration: ts_to_duration(packet.duration(), time_base),
                key_frame: packet.is_key(),
                data,
            }));
        }
    }

    fn decode(&mut self, track: usize, packet: EnginePacket) -> Result<Vec<EngineFrame>> {
        let time_base = self.time_bases[track];
        let ffmpeg_packet = packet_to_ffmpeg(&packet, time_base);

        match self.decoder_for(track)? {
            TrackDecoder::Audio(decoder) => {
                send_packet(decoder, &ffmpeg_packet)?;
                let mut frames = Vec::new();
                let mut decoded = frame::Audio::empty();
                while receive_frame(decoder, &mut decoded)? {
                    frames.push(EngineFrame {
                        pts: decoded.pts().and_then(|ts| ts_to_duration(ts, time_base)),
                        data: copy_planes(decoded.planes(), |i| decoded.data(i)),
                    });
                }
                Ok(frames)
            }
            TrackDecoder::Video(decoder) => {
                send_packet(decoder, &ffmpeg_packet)?;
                let mut frames = Vec::new();
                let mut decoded = frame::Video::empty();
                while receive_frame(decoder, &mut decoded)? {
                    frames.push(EngineFrame {
                        pts: decoded.pts().and_then(|ts| ts_to_duration(ts, time_base)),
                        data: copy_planes(decoded.planes(), |i| decoded.data(i)),
                    });
                }
                Ok(frames)
            }
        }
    }

    fn seek(&mut self, target: Duration) -> Result<()> {
        let timestamp = (target.as_secs_f64() * ffi::AV_TIME_BASE as f64) as i64;

        // Backward range lands on the nearest keyframe at or before the
        // target; audio-only inputs reposition exactly since every audio
        // packet is a sync point.
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| match e {
                ffmpeg_next::Error::Eof | ffmpeg_next::Error::InvalidData => {
                    Error::unsupported(format!("seek failed: {e}"))
                }
                other => Error::engine(format!("seek failed: {other}")),
            })?;

        // Drop decoder state from before the jump.
        for decoder in self.decoders.iter_mut().flatten() {
            match decoder {
                TrackDecoder::Audio(d) => d.flush(),
                TrackDecoder::Video(d) => d.flush(),
            }
        }
        Ok(())
    }

    fn attached_picture(&mut self) -> Option<Vec<u8>> {
        self.attached_picture.clone()
    }
}

// ── Open helpers ──────────────────────────────────────────────────────

/**
    Run stream probing on a freshly-opened context and wrap it.

    Takes ownership of `ctx` in all paths.
*/
fn finish_open(ctx: *mut ffi::AVFormatContext) -> Result<InputContext> {
    let mut ctx = ctx;
    // SAFETY: ctx was returned by avformat_open_input.
    let code = unsafe { ffi::avformat_find_stream_info(ctx, std::ptr::null_mut()) };
    if code < 0 {
        unsafe { ffi::avformat_close_input(&mut ctx) };
        return Err(map_open_error(code, false));
    }
    // SAFETY: ctx is a valid, fully opened input context; the wrapper
    // takes ownership and closes it on drop.
    Ok(unsafe { InputContext::wrap(ctx) })
}

fn options_to_dict(config: &SourceConfig) -> Result<*mut ffi::AVDictionary> {
    let mut dict: *mut ffi::AVDictionary = std::ptr::null_mut();
    for (key, value) in config.protocol_options() {
        let c_key =
            CString::new(key.as_str()).map_err(|_| Error::invalid_input("option key contains NUL"))?;
        let c_value = CString::new(value.as_str())
            .map_err(|_| Error::invalid_input("option value contains NUL"))?;
        // SAFETY: av_dict_set copies both strings.
        let code = unsafe { ffi::av_dict_set(&mut dict, c_key.as_ptr(), c_value.as_ptr(), 0) };
        if code < 0 {
            unsafe { ffi::av_dict_free(&mut dict) };
            return Err(Error::engine("av_dict_set failed"));
        }
    }
    Ok(dict)
}

fn is_network_uri(uri: &str) -> bool {
    match uri.split_once("://") {
        Some((scheme, _)) => !scheme.eq_ignore_ascii_case("file"),
        None => false,
    }
}

fn map_open_error(code: c_int, network: bool) -> Error {
    let err = ffmpeg_next::Error::from(code);
    match err {
        ffmpeg_next::Error::HttpBadRequest
        | ffmpeg_next::Error::HttpUnauthorized
        | ffmpeg_next::Error::HttpForbidden
        | ffmpeg_next::Error::HttpNotFound
        | ffmpeg_next::Error::HttpOther4xx
        | ffmpeg_next::Error::HttpServerError => Error::NetworkFailure(err.to_string()),
        ffmpeg_next::Error::Other { .. } if network => Error::NetworkFailure(err.to_string()),
        other => Error::unsupported(other.to_string()),
    }
}

// ── Probe helpers ─────────────────────────────────────────────────────

fn track_kind(params: &codec::Parameters) -> TrackKind {
    // SAFETY: reading a field of valid AVCodecParameters FFmpeg owns.
    let codec_type = unsafe { (*params.as_ptr()).codec_type };
    match codec_type {
        ffi::AVMediaType::AVMEDIA_TYPE_AUDIO => TrackKind::Audio,
        ffi::AVMediaType::AVMEDIA_TYPE_VIDEO => TrackKind::Video,
        ffi::AVMediaType::AVMEDIA_TYPE_SUBTITLE => TrackKind::Subtitle,
        _ => TrackKind::Other,
    }
}

fn codec_id_from_ffmpeg(id: codec::Id) -> CodecId {
    use codec::Id;
    match id {
        Id::AAC => CodecId::Aac,
        Id::MP3 => CodecId::Mp3,
        Id::FLAC => CodecId::Flac,
        Id::OPUS => CodecId::Opus,
        Id::VORBIS => CodecId::Vorbis,
        Id::AC3 => CodecId::Ac3,
        Id::H264 => CodecId::H264,
        Id::HEVC => CodecId::Hevc,
        Id::AV1 => CodecId::Av1,
        Id::VP9 => CodecId::Vp9,
        Id::MPEG2VIDEO => CodecId::Mpeg2,
        _ => CodecId::Other,
    }
}

fn read_attached_picture(stream: &ffmpeg_next::format::stream::Stream) -> Option<Vec<u8>> {
    // SAFETY: attached_pic is an AVPacket embedded in a valid AVStream.
    unsafe {
        let pkt = &(*stream.as_ptr()).attached_pic;
        if pkt.data.is_null() || pkt.size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(pkt.data, pkt.size as usize).to_vec())
    }
}

// ── Demux/decode helpers ──────────────────────────────────────────────

fn ts_to_duration(ts: i64, time_base: Rational) -> Option<Duration> {
    if ts < 0 || time_base.denominator() == 0 {
        return None;
    }
    let seconds =
        ts as f64 * time_base.numerator() as f64 / time_base.denominator() as f64;
    Some(Duration::from_secs_f64(seconds))
}

fn duration_to_ts(duration: Duration, time_base: Rational) -> i64 {
    if time_base.numerator() == 0 {
        return 0;
    }
    (duration.as_secs_f64() * time_base.denominator() as f64 / time_base.numerator() as f64)
        .round() as i64
}

fn packet_to_ffmpeg(packet: &EnginePacket, time_base: Rational) -> ffmpeg_next::Packet {
    let mut ffmpeg_packet = if packet.data.is_empty() {
        ffmpeg_next::Packet::empty()
    } else {
        ffmpeg_next::Packet::copy(&packet.data)
    };

    // SAFETY: setting timing fields on a packet we own.
    unsafe {
        let ptr = ffmpeg_packet.as_mut_ptr();
        if let Some(pts) = packet.pts {
            let ts = duration_to_ts(pts, time_base);
            (*ptr).pts = ts;
            (*ptr).dts = ts;
        }
        if let Some(duration) = packet.duration {
            (*ptr).duration = duration_to_ts(duration, time_base);
        }
    }
    ffmpeg_packet
}

fn send_packet(
    decoder: &mut codec::decoder::Opened,
    packet: &ffmpeg_next::Packet,
) -> Result<()> {
    match decoder.send_packet(packet) {
        Ok(()) => Ok(()),
        // Decoder buffer full; the caller drains frames right after, so
        // dropping this send would only skip one packet worth of output.
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => Ok(()),
        Err(e) => Err(Error::engine(e.to_string())),
    }
}

fn receive_frame(
    decoder: &mut codec::decoder::Opened,
    frame: &mut frame::Frame,
) -> Result<bool> {
    match decoder.receive_frame(frame) {
        Ok(()) => Ok(true),
        Err(ffmpeg_next::Error::Other { errno }) if errno == ffi::EAGAIN => Ok(false),
        Err(ffmpeg_next::Error::Eof) => Ok(false),
        Err(e) => Err(Error::engine(e.to_string())),
    }
}

fn copy_planes<'a>(planes: usize, data: impl Fn(usize) -> &'a [u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..planes {
        out.extend_from_slice(data(i));
    }
    out
}

// ── Custom stream IO ──────────────────────────────────────────────────

type BoxedStream = Box<dyn MediaStream>;

/**
    Owns the custom AVIO context and the boxed reader behind its opaque
    pointer. Must outlive the input context that uses it.
*/
struct StreamIo {
    avio: *mut ffi::AVIOContext,
    opaque: *mut BoxedStream,
}

impl StreamIo {
    fn new(stream: BoxedStream) -> Result<Self> {
        let opaque = Box::into_raw(Box::new(stream));

        // SAFETY: the buffer is owned by the AVIO context after
        // avio_alloc_context succeeds and freed by avio_context_free.
        unsafe {
            let buffer = ffi::av_malloc(IO_BUFFER_SIZE) as *mut u8;
            if buffer.is_null() {
                drop(Box::from_raw(opaque));
                return Err(Error::engine("av_malloc failed"));
            }

            let avio = ffi::avio_alloc_context(
                buffer,
                IO_BUFFER_SIZE as c_int,
                0,
                opaque as *mut c_void,
                Some(stream_read),
                None,
                Some(stream_seek),
            );
            if avio.is_null() {
                ffi::av_free(buffer as *mut c_void);
                drop(Box::from_raw(opaque));
                return Err(Error::engine("avio_alloc_context failed"));
            }

            Ok(Self { avio, opaque })
        }
    }
}

impl Drop for StreamIo {
    fn drop(&mut self) {
        // SAFETY: the input context was closed first (field order in
        // FfmpegEngine), so nothing references the AVIO context anymore.
        unsafe {
            ffi::av_free((*self.avio).buffer as *mut c_void);
            (*self.avio).buffer = std::ptr::null_mut();
            let mut avio = self.avio;
            ffi::avio_context_free(&mut avio);
            drop(Box::from_raw(self.opaque));
        }
    }
}

unsafe extern "C" fn stream_read(opaque: *mut c_void, buf: *mut u8, buf_size: c_int) -> c_int {
    let stream = unsafe { &mut *(opaque as *mut BoxedStream) };
    let slice = unsafe { std::slice::from_raw_parts_mut(buf, buf_size as usize) };
    match stream.read(slice) {
        Ok(0) => ffi::AVERROR_EOF,
        Ok(n) => n as c_int,
        Err(_) => ffi::AVERROR(ffi::EIO),
    }
}

unsafe extern "C" fn stream_seek(opaque: *mut c_void, offset: i64, whence: c_int) -> i64 {
    let stream = unsafe { &mut *(opaque as *mut BoxedStream) };

    if whence & ffi::AVSEEK_SIZE as c_int != 0 {
        let Ok(current) = stream.stream_position() else {
            return -1;
        };
        let Ok(len) = stream.seek(SeekFrom::End(0)) else {
            return -1;
        };
        if stream.seek(SeekFrom::Start(current)).is_err() {
            return -1;
        }
        return len as i64;
    }

    let target = match whence {
        0 => SeekFrom::Start(offset as u64), // SEEK_SET
        1 => SeekFrom::Current(offset),      // SEEK_CUR
        2 => SeekFrom::End(offset),          // SEEK_END
        _ => return -1,
    };
    match stream.seek(target) {
        Ok(pos) => pos as i64,
        Err(_) => -1,
    }
}
