/*!
    Caller-facing configuration for opening a media source.
*/

use crate::track::CodecId;

/**
    Configuration for opening a media source.

    Every field is optional in spirit: the default value means "use the
    engine default" and is never an error. A missing config on the creation
    APIs is equivalent to `SourceConfig::default()`.
*/
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Decode every audio track even if its codec could pass through.
    pub force_audio_decode: bool,
    /// Decode every video track even if its codec could pass through.
    pub force_video_decode: bool,
    /// Audio codecs delivered as encoded packets when not forced.
    pub passthrough_audio_codecs: Vec<CodecId>,
    /// Video codecs delivered as encoded packets when not forced.
    pub passthrough_video_codecs: Vec<CodecId>,
    /// Free-form options forwarded verbatim to the engine open call,
    /// e.g. `("rtsp_flags", "prefer_tcp")` or `("stimeout", "100000")`.
    /// Keys are unique; insertion order is preserved because some engine
    /// protocols are sensitive to it.
    pub protocol_options: Vec<(String, String)>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            force_audio_decode: false,
            force_video_decode: false,
            passthrough_audio_codecs: vec![CodecId::Aac, CodecId::Mp3],
            passthrough_video_codecs: vec![CodecId::H264, CodecId::Hevc],
            protocol_options: Vec::new(),
        }
    }
}

impl SourceConfig {
    /**
        Set a protocol option, replacing any previous value for the key.

        A replaced key keeps its original position so the order the engine
        sees stays the order of first insertion.
    */
    pub fn set_protocol_option(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.protocol_options.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.protocol_options.push((key, value)),
        }
    }

    /**
        Builder-style variant of [`set_protocol_option`](Self::set_protocol_option).
    */
    #[must_use]
    pub fn with_protocol_option(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.set_protocol_option(key, value);
        self
    }

    /**
        The protocol options in insertion order.
    */
    pub fn protocol_options(&self) -> &[(String, String)] {
        &self.protocol_options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_aac_and_h264_passthrough() {
        let config = SourceConfig::default();

        assert!(!config.force_audio_decode);
        assert!(!config.force_video_decode);
        assert!(config.passthrough_audio_codecs.contains(&CodecId::Aac));
        assert!(config.passthrough_video_codecs.contains(&CodecId::H264));
        assert!(config.protocol_options().is_empty());
    }

    #[test]
    fn protocol_options_preserve_insertion_order() {
        let mut config = SourceConfig::default();
        config.set_protocol_option("rtsp_flags", "prefer_tcp");
        config.set_protocol_option("stimeout", "100000");
        config.set_protocol_option("user_agent", "vidsource");

        let keys: Vec<&str> = config
            .protocol_options()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(keys, ["rtsp_flags", "stimeout", "user_agent"]);
    }

    #[test]
    fn replacing_an_option_keeps_its_position() {
        let config = SourceConfig::default()
            .with_protocol_option("rtsp_flags", "prefer_tcp")
            .with_protocol_option("stimeout", "100000")
            .with_protocol_option("rtsp_flags", "listen");

        assert_eq!(
            config.protocol_options(),
            [
                ("rtsp_flags".to_string(), "listen".to_string()),
                ("stimeout".to_string(), "100000".to_string()),
            ]
        );
    }
}
