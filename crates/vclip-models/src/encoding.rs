//! Video encoding configuration for clip cuts and the final assembly.

use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default CRF (Constant Rate Factor)
pub const DEFAULT_CRF: u8 = 18;
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";

/// Output-side encoding parameters used for every clip cut and for the final mux.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264", "h264_nvenc")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor (quality, 0-51, lower is better)
    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Use hardware acceleration (NVENC)
    #[serde(default)]
    pub use_nvenc: bool,

    /// Additional FFmpeg output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            crf: DEFAULT_CRF,
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            use_nvenc: false,
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a new config with updated CRF.
    pub fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Enable NVENC hardware acceleration.
    pub fn with_nvenc(mut self) -> Self {
        self.use_nvenc = true;
        self.codec = "h264_nvenc".to_string();
        self
    }

    /// Convert to FFmpeg output-side codec arguments (no seeking here, see
    /// `vclip_media::command::FfmpegCommand::seek_output`/`duration_output`).
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let mut args = vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
        ];

        if self.use_nvenc {
            args.extend_from_slice(&["-cq".to_string(), self.crf.to_string()]);
        } else {
            args.extend_from_slice(&["-crf".to_string(), self.crf.to_string()]);
        }

        args.extend_from_slice(&[
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
        ]);

        args.extend(self.extra_args.clone());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EncodingConfig::default();
        assert_eq!(config.codec, "libx264");
        assert_eq!(config.crf, 18);
    }

    #[test]
    fn test_ffmpeg_args() {
        let config = EncodingConfig::default();
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-crf".to_string()));
        assert!(args.contains(&"18".to_string()));
    }

    #[test]
    fn test_nvenc_config() {
        let config = EncodingConfig::default().with_nvenc();
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"h264_nvenc".to_string()));
        assert!(args.contains(&"-cq".to_string()));
    }
}
