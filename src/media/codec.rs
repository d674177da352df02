//! G.711 μ-law, the codec of the outbound audio track.
//!
//! Platforms hand 8 kHz mono PCM to [`pcmu_frame`]; the transport sends
//! [`silence`] in place of frames from a disabled track.

use std::time::Duration;

use bytes::Bytes;

use super::AudioFrame;

pub const PCMU_CLOCK_RATE: u32 = 8000;
pub const PCMU_CHANNELS: u16 = 1;

const BIAS: i32 = 0x84;
const CLIP: i32 = 32635;
const SILENCE_BYTE: u8 = 0xFF;

pub fn linear_to_ulaw(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    if pcm > CLIP {
        pcm = CLIP;
    }
    pcm += BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && pcm & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !(sign | (exponent << 4) as i32 | mantissa) as u8
}

pub fn ulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = ((byte >> 4) & 0x07) as i32;
    let mantissa = (byte & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + BIAS) << exponent) - BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

pub fn encode(samples: &[i16]) -> Bytes {
    samples.iter().map(|&s| linear_to_ulaw(s)).collect::<Vec<_>>().into()
}

pub fn decode(payload: &[u8]) -> Vec<i16> {
    payload.iter().map(|&b| ulaw_to_linear(b)).collect()
}

fn frame_duration(samples: usize) -> Duration {
    Duration::from_micros(samples as u64 * 1_000_000 / PCMU_CLOCK_RATE as u64)
}

/// Encodes 8 kHz mono PCM into one outbound frame.
pub fn pcmu_frame(samples: &[i16]) -> AudioFrame {
    AudioFrame {
        data: encode(samples),
        duration: frame_duration(samples.len()),
    }
}

pub fn silence(samples: usize) -> AudioFrame {
    AudioFrame {
        data: Bytes::from(vec![SILENCE_BYTE; samples]),
        duration: frame_duration(samples),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_encodes_to_silence_byte() {
        assert_eq!(linear_to_ulaw(0), SILENCE_BYTE);
        assert_eq!(ulaw_to_linear(SILENCE_BYTE), 0);
    }

    #[test]
    fn encoding_keeps_sign_and_rough_magnitude() {
        for sample in [-30000i16, -1000, -8, 8, 1000, 30000] {
            let back = ulaw_to_linear(linear_to_ulaw(sample));
            assert_eq!(back.signum(), sample.signum(), "sample {sample}");
            let err = (back as i32 - sample as i32).abs();
            assert!(err <= (sample as i32).abs() / 16 + 8, "sample {sample} decoded as {back}");
        }
    }

    #[test]
    fn twenty_ms_frame() {
        let frame = pcmu_frame(&[0i16; 160]);
        assert_eq!(frame.data.len(), 160);
        assert_eq!(frame.duration, Duration::from_millis(20));
        assert_eq!(silence(160), frame);
    }
}
