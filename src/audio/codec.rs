//! # Telephony Audio Codec
//!
//! Converts between 16-bit linear PCM and the G.711 μ-law encoding used on the
//! telephony media stream, and slices encoded audio into transport frames.
//!
//! ## Telephony Audio Format:
//! - **Sample Rate**: 8kHz (8,000 Hz)
//! - **Encoding**: G.711 μ-law, one byte per sample
//! - **Channels**: Mono
//! - **Framing**: 20ms frames (160 bytes), base64 encoded inside JSON messages
//!
//! Audio relayed between the two transports is never decoded; only locally
//! generated audio (signaling tones) passes through this module.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// Sample rate of the telephony media stream.
pub const SAMPLE_RATE: u32 = 8000;

/// Samples (and μ-law bytes) in one 20ms transport frame.
pub const FRAME_SAMPLES: usize = 160;

/// μ-law byte that decodes to silence.
pub const ULAW_SILENCE: u8 = 0xFF;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;

/// Encode one linear PCM sample as a μ-law byte.
///
/// ## Algorithm:
/// 1. Take the magnitude and remember the sign
/// 2. Clip to the encodable range and add the bias
/// 3. The exponent is the position of the highest set bit above bit 7
/// 4. The mantissa is the next four bits below it
/// 5. All bits are inverted on the wire
pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0x00
    };

    let biased = magnitude.min(CLIP) + BIAS;
    let exponent = 7 - ((biased >> 7) as u8).leading_zeros() as i32;
    let mantissa = (biased >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Encode a block of PCM samples as μ-law bytes.
pub fn encode_ulaw(samples: &[i16]) -> Vec<u8> {
    samples.iter().map(|&sample| linear_to_ulaw(sample)).collect()
}

/// Split μ-law audio into base64 payloads of exactly one frame each.
///
/// ## Frame Boundaries:
/// The final frame is padded with μ-law silence so that no payload ever
/// carries a partial frame. Other audio sharing the outbound path can then
/// interleave only between whole frames.
pub fn frame_payloads(ulaw: &[u8]) -> Vec<String> {
    ulaw.chunks(FRAME_SAMPLES)
        .map(|chunk| {
            if chunk.len() == FRAME_SAMPLES {
                BASE64.encode(chunk)
            } else {
                let mut padded = chunk.to_vec();
                padded.resize(FRAME_SAMPLES, ULAW_SILENCE);
                BASE64.encode(&padded)
            }
        })
        .collect()
}

/// Number of samples covering `duration_ms` at the telephony sample rate.
pub fn samples_for_ms(duration_ms: u32) -> usize {
    (duration_ms as usize * SAMPLE_RATE as usize) / 1000
}

#[cfg(test)]
pub(crate) fn ulaw_to_linear(byte: u8) -> i16 {
    let inverted = !byte;
    let sign = inverted & 0x80;
    let exponent = ((inverted >> 4) & 0x07) as i32;
    let mantissa = (inverted & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;

    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ulaw_reference_points() {
        assert_eq!(linear_to_ulaw(0), 0xFF);
        assert_eq!(linear_to_ulaw(i16::MAX), 0x80);
        assert_eq!(linear_to_ulaw(i16::MIN), 0x00);
        assert_eq!(ulaw_to_linear(ULAW_SILENCE), 0);
    }

    #[test]
    fn test_ulaw_quantization_error_is_bounded() {
        for sample in [-30000i16, -8000, -1200, -50, 50, 1200, 8000, 30000] {
            let decoded = ulaw_to_linear(linear_to_ulaw(sample));
            let error = (sample as i32 - decoded as i32).abs();
            // μ-law step size grows with magnitude; 1/16 of the value plus the bias floor
            assert!(error <= (sample as i32).abs() / 16 + 8, "{} decoded as {}", sample, decoded);
            assert_eq!(sample.signum(), decoded.signum());
        }
    }

    #[test]
    fn test_frame_payloads_pad_last_frame() {
        let ulaw = vec![0x10u8; FRAME_SAMPLES + 10];
        let frames = frame_payloads(&ulaw);
        assert_eq!(frames.len(), 2);

        let last = BASE64.decode(&frames[1]).unwrap();
        assert_eq!(last.len(), FRAME_SAMPLES);
        assert_eq!(&last[..10], &[0x10u8; 10]);
        assert!(last[10..].iter().all(|&b| b == ULAW_SILENCE));
    }

    #[test]
    fn test_samples_for_ms() {
        assert_eq!(samples_for_ms(20), FRAME_SAMPLES);
        assert_eq!(samples_for_ms(100), 800);
    }
}
