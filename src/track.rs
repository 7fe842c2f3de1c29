/*!
    Track descriptors and the decode-mode resolution policy.
*/

use crate::config::SourceConfig;
use crate::engine::EngineTrack;

/**
    Identifier of a track within one media source.

    Dense index into the source's track table, assigned in container order
    at creation and stable for the lifetime of the handle.
*/
pub type TrackId = usize;

/**
    The kind of elementary stream a track carries.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// Audio stream.
    Audio,
    /// Video stream.
    Video,
    /// Subtitle stream.
    Subtitle,
    /// Anything else the container exposes (data, attachments).
    Other,
}

/**
    How samples for a track are delivered.

    Resolved once at creation and carried immutably on the descriptor.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeMode {
    /// Deliver the track's packets in their original encoded form.
    Passthrough,
    /// Have the engine fully decode before delivery.
    ForceDecode,
}

/**
    Codecs the adapter knows by name.

    This is the subset relevant to passthrough decisions; everything else
    maps to `Other` and decodes by default.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    Aac,
    Mp3,
    Flac,
    Opus,
    Vorbis,
    Ac3,
    H264,
    Hevc,
    Av1,
    Vp9,
    Mpeg2,
    Other,
}

/**
    One resolved elementary track of a media source.
*/
#[derive(Clone, Debug)]
pub struct TrackDescriptor {
    /// Identifier, unique and stable within the owning source.
    pub id: TrackId,
    /// Stream kind.
    pub kind: TrackKind,
    /// Codec of the source bitstream. Reports the source codec even when
    /// the track is force-decoded.
    pub codec: CodecId,
    /// Engine-reported codec name.
    pub codec_name: String,
    /// Delivery mode resolved at creation.
    pub decode_mode: DecodeMode,
    /// Whether the track delivers samples. Tracks whose codec the engine
    /// cannot handle are exposed but inactive.
    pub active: bool,
}

/**
    Resolve decode modes for every track the engine discovered.

    Precedence per track, highest first:

    1. Config forces decode for the track's kind.
    2. The codec is in the config's passthrough set for the kind.
    3. Otherwise the engine decodes.

    Subtitle tracks always pass through (the downstream pipeline renders
    them from the encoded form). A track that would need decoding but has
    no decoder available is marked inactive rather than failing creation.
*/
pub(crate) fn resolve_tracks(
    engine_tracks: &[EngineTrack],
    config: &SourceConfig,
) -> Vec<TrackDescriptor> {
    engine_tracks
        .iter()
        .enumerate()
        .map(|(id, track)| {
            let decode_mode = resolve_mode(track.kind, track.codec, config);
            let active = match track.kind {
                TrackKind::Audio | TrackKind::Video => match decode_mode {
                    DecodeMode::Passthrough => true,
                    DecodeMode::ForceDecode => track.decodable,
                },
                TrackKind::Subtitle => true,
                TrackKind::Other => false,
            };

            TrackDescriptor {
                id,
                kind: track.kind,
                codec: track.codec,
                codec_name: track.codec_name.clone(),
                decode_mode,
                active,
            }
        })
        .collect()
}

fn resolve_mode(kind: TrackKind, codec: CodecId, config: &SourceConfig) -> DecodeMode {
    match kind {
        TrackKind::Audio => {
            if config.force_audio_decode {
                DecodeMode::ForceDecode
            } else if config.passthrough_audio_codecs.contains(&codec) {
                DecodeMode::Passthrough
            } else {
                DecodeMode::ForceDecode
            }
        }
        TrackKind::Video => {
            if config.force_video_decode {
                DecodeMode::ForceDecode
            } else if config.passthrough_video_codecs.contains(&codec) {
                DecodeMode::Passthrough
            } else {
                DecodeMode::ForceDecode
            }
        }
        TrackKind::Subtitle | TrackKind::Other => DecodeMode::Passthrough,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(codec: CodecId, decodable: bool) -> EngineTrack {
        EngineTrack {
            kind: TrackKind::Audio,
            codec,
            codec_name: format!("{codec:?}").to_ascii_lowercase(),
            decodable,
        }
    }

    fn video(codec: CodecId, decodable: bool) -> EngineTrack {
        EngineTrack {
            kind: TrackKind::Video,
            codec,
            codec_name: format!("{codec:?}").to_ascii_lowercase(),
            decodable,
        }
    }

    #[test]
    fn passthrough_set_wins_over_default_decode() {
        let tracks = resolve_tracks(
            &[audio(CodecId::Aac, true), audio(CodecId::Opus, true)],
            &SourceConfig::default(),
        );

        assert_eq!(tracks[0].decode_mode, DecodeMode::Passthrough);
        assert_eq!(tracks[1].decode_mode, DecodeMode::ForceDecode);
    }

    #[test]
    fn force_decode_overrides_passthrough_set() {
        let config = SourceConfig {
            force_audio_decode: true,
            ..SourceConfig::default()
        };
        let tracks = resolve_tracks(&[audio(CodecId::Aac, true)], &config);

        assert_eq!(tracks[0].decode_mode, DecodeMode::ForceDecode);
        // Source codec metadata survives the override.
        assert_eq!(tracks[0].codec, CodecId::Aac);
    }

    #[test]
    fn force_flags_are_per_kind() {
        let config = SourceConfig {
            force_video_decode: true,
            ..SourceConfig::default()
        };
        let tracks = resolve_tracks(
            &[audio(CodecId::Aac, true), video(CodecId::H264, true)],
            &config,
        );

        assert_eq!(tracks[0].decode_mode, DecodeMode::Passthrough);
        assert_eq!(tracks[1].decode_mode, DecodeMode::ForceDecode);
    }

    #[test]
    fn undecodable_track_without_passthrough_is_inactive() {
        let tracks = resolve_tracks(&[audio(CodecId::Other, false)], &SourceConfig::default());

        assert_eq!(tracks[0].decode_mode, DecodeMode::ForceDecode);
        assert!(!tracks[0].active);
    }

    #[test]
    fn undecodable_passthrough_track_stays_active() {
        // Passthrough needs no decoder; the downstream pipeline has one.
        let tracks = resolve_tracks(&[audio(CodecId::Aac, false)], &SourceConfig::default());

        assert_eq!(tracks[0].decode_mode, DecodeMode::Passthrough);
        assert!(tracks[0].active);
    }

    #[test]
    fn ids_follow_container_order() {
        let tracks = resolve_tracks(
            &[
                video(CodecId::H264, true),
                audio(CodecId::Aac, true),
                audio(CodecId::Mp3, true),
            ],
            &SourceConfig::default(),
        );

        assert_eq!(tracks.iter().map(|t| t.id).collect::<Vec<_>>(), [0, 1, 2]);
    }
}
