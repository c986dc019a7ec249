//! Byte-to-byte image transcoding into WebP.

use crate::errors::TranscodeError;
use webp::{Encoder, WebPConfig};

/// Encoder settings passed with every conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Lossy quality, 0-100.
    pub quality: u8,
    /// Encoder effort, 0 (fastest) to 6 (smallest).
    pub effort: u8,
    /// Sharper chroma subsampling at a small size cost.
    pub smart_subsample: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            quality: 65,
            effort: 6,
            smart_subsample: true,
        }
    }
}

/// Converts raw source bytes into target-format bytes.
///
/// Implementations run synchronously on the caller's task and must be pure for
/// a fixed set of options.
pub trait Transcoder: Send + Sync {
    fn convert(&self, input: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, TranscodeError>;
}

/// Lossy WebP encoder: `image` decodes the source, libwebp encodes the target.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpTranscoder;

impl Transcoder for WebpTranscoder {
    fn convert(&self, input: &[u8], options: &EncodeOptions) -> Result<Vec<u8>, TranscodeError> {
        let decoded =
            image::load_from_memory(input).map_err(|e| TranscodeError::Decode(e.to_string()))?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        let config = encoder_config(options)?;
        let encoded = Encoder::from_rgba(rgba.as_raw(), width, height)
            .encode_advanced(&config)
            .map_err(|e| TranscodeError::Encode(format!("{:?}", e)))?;
        Ok(encoded.to_vec())
    }
}

fn encoder_config(options: &EncodeOptions) -> Result<WebPConfig, TranscodeError> {
    let mut config = WebPConfig::new()
        .map_err(|_| TranscodeError::Encode("libwebp rejected the default settings".into()))?;
    config.lossless = 0;
    config.quality = f32::from(options.quality.min(100));
    config.method = i32::from(options.effort.min(6));
    config.use_sharp_yuv = i32::from(options.smart_subsample);
    Ok(config)
}
