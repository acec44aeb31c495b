//! # Tone Synthesizer
//!
//! Generates in-band DTMF (dual-tone multi-frequency) audio for navigation
//! sequences. Every keypad symbol is the sum of one low-group and one
//! high-group sine wave; the result is rendered at the telephony sample rate
//! and sliced into transport frames.

use crate::audio::codec::{self, SAMPLE_RATE};
use crate::signaling::SignalIntent;
use std::f32::consts::PI;
use std::time::Duration;

/// Frequency pair (low group, high group) for a keypad symbol.
///
/// ```text
///          1209 Hz  1336 Hz  1477 Hz
/// 697 Hz     1        2        3
/// 770 Hz     4        5        6
/// 852 Hz     7        8        9
/// 941 Hz     *        0        #
/// ```
pub fn frequencies(symbol: char) -> Option<(f32, f32)> {
    let pair = match symbol {
        '1' => (697.0, 1209.0),
        '2' => (697.0, 1336.0),
        '3' => (697.0, 1477.0),
        '4' => (770.0, 1209.0),
        '5' => (770.0, 1336.0),
        '6' => (770.0, 1477.0),
        '7' => (852.0, 1209.0),
        '8' => (852.0, 1336.0),
        '9' => (852.0, 1477.0),
        '*' => (941.0, 1209.0),
        '0' => (941.0, 1336.0),
        '#' => (941.0, 1477.0),
        _ => return None,
    };
    Some(pair)
}

/// Timing and level settings for synthesized tones.
#[derive(Debug, Clone)]
pub struct ToneSettings {
    /// Duration of each tone
    pub tone_ms: u32,
    /// Silence enforced between consecutive tones of a sequence
    pub gap_ms: u32,
    /// Peak amplitude of each sine component, as a fraction of full scale
    pub amplitude: f32,
}

impl Default for ToneSettings {
    fn default() -> Self {
        Self {
            tone_ms: 100,
            gap_ms: 200,
            amplitude: 0.35,
        }
    }
}

/// One synthesized keypad tone.
#[derive(Debug, Clone)]
pub struct Tone {
    pub symbol: char,
    /// 16-bit linear PCM at 8kHz
    pub samples: Vec<i16>,
    pub duration: Duration,
}

/// A full sequence rendered for the outbound telephony path.
#[derive(Debug, Clone)]
pub struct RenderedSequence {
    /// Symbols that produced audio, in order
    pub symbols: Vec<char>,
    /// Base64 μ-law payloads, one 20ms frame each
    pub frames: Vec<String>,
    /// Playback time of all frames
    pub duration: Duration,
}

impl RenderedSequence {
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToneSynthesizer {
    settings: ToneSettings,
}

impl ToneSynthesizer {
    pub fn new(settings: ToneSettings) -> Self {
        Self { settings }
    }

    /// Ordered symbols bound to an intent.
    pub fn sequence_for(&self, intent: SignalIntent) -> &'static [char] {
        intent.symbols()
    }

    /// Synthesize a single symbol. Symbols outside the 12-key pad produce nothing.
    pub fn synthesize(&self, symbol: char) -> Option<Tone> {
        let (low, high) = frequencies(symbol)?;
        let count = codec::samples_for_ms(self.settings.tone_ms);
        let peak = self.settings.amplitude * i16::MAX as f32;

        let samples = (0..count)
            .map(|n| {
                let t = n as f32 / SAMPLE_RATE as f32;
                let value = peak * ((2.0 * PI * low * t).sin() + (2.0 * PI * high * t).sin());
                value.clamp(i16::MIN as f32, i16::MAX as f32) as i16
            })
            .collect();

        Some(Tone {
            symbol,
            samples,
            duration: Duration::from_millis(self.settings.tone_ms as u64),
        })
    }

    /// Render an intent's sequence into transport frames.
    ///
    /// ## Layout:
    /// `tone, gap, tone, gap, ..., tone`, padded to a whole number of frames.
    /// Unknown symbols are skipped entirely, including their gap.
    pub fn render(&self, intent: SignalIntent) -> RenderedSequence {
        let tones: Vec<Tone> = self
            .sequence_for(intent)
            .iter()
            .filter_map(|&symbol| self.synthesize(symbol))
            .collect();

        let gap = vec![0i16; codec::samples_for_ms(self.settings.gap_ms)];
        let mut pcm = Vec::new();
        for (index, tone) in tones.iter().enumerate() {
            if index > 0 {
                pcm.extend_from_slice(&gap);
            }
            pcm.extend_from_slice(&tone.samples);
        }

        let frames = codec::frame_payloads(&codec::encode_ulaw(&pcm));
        let frame_ms = (codec::FRAME_SAMPLES as u64 * 1000) / SAMPLE_RATE as u64;

        RenderedSequence {
            symbols: tones.iter().map(|tone| tone.symbol).collect(),
            duration: Duration::from_millis(frames.len() as u64 * frame_ms),
            frames,
        }
    }
}
