/*!
    Scripted engine fixture for driving the adapter without a real demuxer.
*/

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vidsource::{
    CodecId, Engine, EngineFrame, EnginePacket, EngineTrack, Error, Result, TrackKind,
};

/// Prefix the scripted decoder stamps on decoded payloads, so tests can
/// tell raw output from encoded passthrough bytes.
pub const DECODED_PREFIX: &[u8] = b"raw:";

pub enum Event {
    Packet(EnginePacket),
    Error(Error),
}

pub struct ScriptedEngine {
    tracks: Vec<EngineTrack>,
    events: VecDeque<Event>,
    after_seek: Option<Vec<EnginePacket>>,
    seek_errors: VecDeque<Error>,
    seek_log: Arc<Mutex<Vec<Duration>>>,
    can_seek: bool,
    duration: Option<Duration>,
    buffer_time: Duration,
    artwork: Option<Vec<u8>>,
    decode_error: Option<Error>,
}

impl ScriptedEngine {
    pub fn new(tracks: Vec<EngineTrack>) -> Self {
        Self {
            tracks,
            events: VecDeque::new(),
            after_seek: None,
            seek_errors: VecDeque::new(),
            seek_log: Arc::new(Mutex::new(Vec::new())),
            can_seek: true,
            duration: Some(Duration::from_secs(120)),
            buffer_time: Duration::ZERO,
            artwork: None,
            decode_error: None,
        }
    }

    pub fn with_packets(mut self, packets: Vec<EnginePacket>) -> Self {
        self.events = packets.into_iter().map(Event::Packet).collect();
        self
    }

    pub fn push_read_error(mut self, error: Error) -> Self {
        self.events.push_back(Event::Error(error));
        self
    }

    pub fn with_after_seek(mut self, packets: Vec<EnginePacket>) -> Self {
        self.after_seek = Some(packets);
        self
    }

    pub fn with_seek_error(mut self, error: Error) -> Self {
        self.seek_errors.push_back(error);
        self
    }

    pub fn unseekable(mut self) -> Self {
        self.can_seek = false;
        self
    }

    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_buffer_time(mut self, buffer_time: Duration) -> Self {
        self.buffer_time = buffer_time;
        self
    }

    pub fn with_artwork(mut self, artwork: Vec<u8>) -> Self {
        self.artwork = Some(artwork);
        self
    }

    pub fn with_decode_error(mut self, error: Error) -> Self {
        self.decode_error = Some(error);
        self
    }

    pub fn seek_log(&self) -> Arc<Mutex<Vec<Duration>>> {
        Arc::clone(&self.seek_log)
    }
}

impl Engine for ScriptedEngine {
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
        match self.events.pop_front() {
            Some(Event::Packet(packet)) => Ok(Some(packet)),
            Some(Event::Error(error)) => Err(error),
            None => Ok(None),
        }
    }

    fn decode(&mut self, _track: usize, packet: EnginePacket) -> Result<Vec<EngineFrame>> {
        if let Some(error) = self.decode_error.clone() {
            return Err(error);
        }
        let mut data = DECODED_PREFIX.to_vec();
        data.extend_from_slice(&packet.data);
        Ok(vec![EngineFrame {
            pts: packet.pts,
            data,
        }])
    }

    fn seek(&mut self, target: Duration) -> Result<()> {
        self.seek_log.lock().unwrap().push(target);
        if let Some(error) = self.seek_errors.pop_front() {
            return Err(error);
        }
        if let Some(packets) = self.after_seek.take() {
            self.events = packets.into_iter().map(Event::Packet).collect();
        }
        Ok(())
    }

    fn attached_picture(&mut self) -> Option<Vec<u8>> {
        self.artwork.clone()
    }
}

// ── Script builders ───────────────────────────────────────────────────

pub fn audio_track(codec: CodecId) -> EngineTrack {
    EngineTrack {
        kind: TrackKind::Audio,
        codec,
        codec_name: format!("{codec:?}").to_ascii_lowercase(),
        decodable: true,
    }
}

pub fn video_track(codec: CodecId) -> EngineTrack {
    EngineTrack {
        kind: TrackKind::Video,
        codec,
        codec_name: format!("{codec:?}").to_ascii_lowercase(),
        decodable: true,
    }
}

pub fn packet(track: usize, pts_millis: u64, data: &[u8]) -> EnginePacket {
    EnginePacket {
        track,
        pts: Some(Duration::from_millis(pts_millis)),
        duration: Some(Duration::from_millis(20)),
        key_frame: false,
        data: data.to_vec(),
    }
}

pub fn key_packet(track: usize, pts_millis: u64, data: &[u8]) -> EnginePacket {
    EnginePacket {
        key_frame: true,
        ..packet(track, pts_millis, data)
    }
}
