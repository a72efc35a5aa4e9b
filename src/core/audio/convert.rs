//! Audio format conversion between capture, wire, and playback formats.
//!
//! Three shapes of audio move through the gateway:
//! - capture: 32-bit float samples at whatever rate the device runs at
//! - upload: mono 16-bit PCM at 16 kHz wrapped in a 44-byte WAV container
//! - model output: raw mono 16-bit PCM at 24 kHz with no container

use super::{AudioError, AudioResult};

/// Sample rate the model expects for uploaded speech.
pub const TARGET_CAPTURE_RATE: u32 = 16_000;

/// Sample rate of audio the model streams back.
pub const MODEL_OUTPUT_RATE: u32 = 24_000;

/// Size of the PCM WAV header this module writes and recognizes.
pub const WAV_HEADER_LEN: usize = 44;

// ============================================================================
// WAV container
// ============================================================================

/// Format fields recovered from a WAV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

/// Parse the fixed-layout 44-byte PCM WAV header.
///
/// Returns `None` when the payload is too short, is not a RIFF/WAVE
/// container, or declares a non-PCM encoding. Callers treat `None` as
/// "this is raw PCM, not WAV" rather than an error.
pub fn parse_wav_header(data: &[u8]) -> Option<WavFormat> {
    if data.len() < WAV_HEADER_LEN {
        return None;
    }
    if &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return None;
    }
    // Audio format field: 1 = uncompressed PCM
    let audio_format = u16::from_le_bytes([data[20], data[21]]);
    if audio_format != 1 {
        return None;
    }

    let channels = u16::from_le_bytes([data[22], data[23]]);
    let sample_rate = u32::from_le_bytes([data[24], data[25], data[26], data[27]]);
    let bits_per_sample = u16::from_le_bytes([data[34], data[35]]);

    if channels == 0 || sample_rate == 0 || bits_per_sample == 0 {
        return None;
    }

    Some(WavFormat {
        channels,
        sample_rate,
        bits_per_sample,
    })
}

/// Build a 44-byte PCM WAV header.
pub fn wav_header(data_size: u32, sample_rate: u32, channels: u16, bits_per_sample: u16) -> [u8; 44] {
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
    let block_align = channels * bits_per_sample / 8;
    let file_size = 36 + data_size;

    let mut header = [0u8; 44];
    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&file_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");
    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&bits_per_sample.to_le_bytes());
    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());
    header
}

// ============================================================================
// Sample conversion
// ============================================================================

/// Linear-interpolation resample of mono float samples.
///
/// Quality is adequate for speech; no anti-aliasing filter is applied.
pub fn resample_linear(samples: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = f64::from(src_rate) / f64::from(dst_rate);
    let out_len = ((samples.len() as f64) / ratio).floor() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let idx = pos.floor() as usize;
        let frac = (pos - idx as f64) as f32;
        let a = samples[idx];
        let b = if idx + 1 < samples.len() {
            samples[idx + 1]
        } else {
            a
        };
        out.push(a + (b - a) * frac);
    }
    out
}

/// Quantize float samples in [-1.0, 1.0] to 16-bit signed PCM.
/// Out-of-range samples clamp instead of wrapping.
pub fn quantize_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let scaled = (s * 32768.0).round();
            scaled.clamp(-32768.0, 32767.0) as i16
        })
        .collect()
}

/// Decode little-endian 16-bit PCM bytes into float samples in [-1.0, 1.0).
///
/// A trailing odd byte is rejected as malformed.
pub fn pcm16_to_f32(data: &[u8]) -> AudioResult<Vec<f32>> {
    if data.len() % 2 != 0 {
        return Err(AudioError::Malformed(format!(
            "PCM16 payload has odd length {}",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

// ============================================================================
// Gateway conversions
// ============================================================================

/// Package captured float samples as a mono 16 kHz WAV upload.
///
/// Resamples from the device rate, quantizes to 16-bit, and prepends the
/// container header.
pub fn encode_capture(samples: &[f32], device_rate: u32) -> Vec<u8> {
    let resampled = resample_linear(samples, device_rate, TARGET_CAPTURE_RATE);
    let quantized = quantize_i16(&resampled);

    let mut pcm = Vec::with_capacity(quantized.len() * 2);
    for sample in quantized {
        pcm.extend_from_slice(&sample.to_le_bytes());
    }

    let header = wav_header(pcm.len() as u32, TARGET_CAPTURE_RATE, 1, 16);
    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + pcm.len());
    wav.extend_from_slice(&header);
    wav.extend_from_slice(&pcm);
    wav
}

/// Decode a raw model output chunk (24 kHz mono PCM16) into float samples.
pub fn decode_model_chunk(data: &[u8]) -> AudioResult<Vec<f32>> {
    pcm16_to_f32(data)
}

/// MIME tag describing a PCM payload for the model API.
///
/// The two rates the pipeline actually produces get their canonical tags;
/// anything else is tagged by its declared rate.
pub fn pcm_mime_tag(format: &WavFormat) -> String {
    match (format.sample_rate, format.channels, format.bits_per_sample) {
        (16_000, 1, 16) => "audio/pcm;rate=16000".to_string(),
        (24_000, _, _) => "audio/pcm;rate=24000".to_string(),
        (rate, _, _) => format!("audio/pcm;rate={rate}"),
    }
}

/// Split an uploaded payload into (mime tag, PCM bytes).
///
/// WAV containers are unwrapped and tagged by their declared format.
/// Anything without a recognizable header is forwarded as raw 16 kHz PCM,
/// which keeps clients that skip the container working.
pub fn classify_payload(data: &[u8]) -> (String, &[u8]) {
    match parse_wav_header(data) {
        Some(format) => (pcm_mime_tag(&format), &data[WAV_HEADER_LEN..]),
        None => ("audio/pcm;rate=16000".to_string(), data),
    }
}
