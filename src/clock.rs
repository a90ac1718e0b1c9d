// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Conversion between the sample domain and musical time.
//!
//! The clock is a plain value owned by the scheduler. It carries no
//! threading concerns of its own: whoever drives playback owns it and is the
//! only one to mutate it.

use std::{error::Error, fmt, str::FromStr};

/// The slowest supported tempo.
pub const MIN_TEMPO: f64 = 40.0;

/// The fastest supported tempo.
pub const MAX_TEMPO: f64 = 240.0;

/// The tempo used when none is configured.
pub const DEFAULT_TEMPO: f64 = 120.0;

/// Time signature (beats per bar / beat unit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub beats_per_bar: u32,
    pub beat_unit: u32,
}

impl TimeSignature {
    pub fn new(beats_per_bar: u32, beat_unit: u32) -> Self {
        TimeSignature {
            beats_per_bar,
            beat_unit,
        }
    }

    /// Get beats per bar as a float for time arithmetic.
    pub fn beats_per_bar(&self) -> f64 {
        self.beats_per_bar as f64
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature::new(4, 4)
    }
}

impl FromStr for TimeSignature {
    type Err = Box<dyn Error>;

    /// Parses a signature in the form "3/4".
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let (beats, unit) = s
            .split_once('/')
            .ok_or_else(|| format!("malformed time signature: {}", s))?;
        let beats_per_bar: u32 = beats.trim().parse()?;
        let beat_unit: u32 = unit.trim().parse()?;
        if beats_per_bar == 0 || beat_unit == 0 {
            return Err(format!("time signature components must be non-zero: {}", s).into());
        }
        Ok(TimeSignature::new(beats_per_bar, beat_unit))
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats_per_bar, self.beat_unit)
    }
}

/// Clamps a tempo into the supported range.
pub fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_nan() {
        return DEFAULT_TEMPO;
    }
    bpm.clamp(MIN_TEMPO, MAX_TEMPO)
}

/// Tempo state and the current sample position of playback.
#[derive(Debug, Clone)]
pub struct MusicalClock {
    /// Beats per minute, always within [MIN_TEMPO, MAX_TEMPO].
    tempo: f64,
    time_signature: TimeSignature,
    /// Fixed at construction.
    sample_rate: f64,
    /// Frames since beat 0.
    position: i64,
}

impl MusicalClock {
    /// Creates a clock at position 0.
    ///
    /// # Panics
    ///
    /// Panics if the sample rate is not a positive, finite number or the time
    /// signature has a zero component. Both are startup configuration errors.
    pub fn new(sample_rate: f64, tempo: f64, time_signature: TimeSignature) -> Self {
        assert!(
            sample_rate.is_finite() && sample_rate > 0.0,
            "sample rate must be positive, got {}",
            sample_rate
        );
        assert!(
            time_signature.beats_per_bar > 0 && time_signature.beat_unit > 0,
            "time signature must be non-zero, got {}",
            time_signature
        );

        MusicalClock {
            tempo: clamp_tempo(tempo),
            time_signature,
            sample_rate,
            position: 0,
        }
    }

    #[inline]
    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    /// Sets the tempo, clamped to the supported range. Does not touch the
    /// position; re-anchoring is the scheduler's job.
    pub fn set_tempo(&mut self, bpm: f64) {
        self.tempo = clamp_tempo(bpm);
    }

    #[inline]
    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, time_signature: TimeSignature) {
        debug_assert!(time_signature.beats_per_bar > 0 && time_signature.beat_unit > 0);
        self.time_signature = time_signature;
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        (60.0 / self.tempo) * self.sample_rate
    }

    #[inline]
    pub fn samples_per_bar(&self) -> f64 {
        self.samples_per_beat() * self.time_signature.beats_per_bar()
    }

    pub fn beat_to_sample(&self, beat: f64) -> i64 {
        (beat * self.samples_per_beat()).round() as i64
    }

    pub fn sample_to_beat(&self, sample: i64) -> f64 {
        sample as f64 / self.samples_per_beat()
    }

    /// The 0-indexed bar containing the sample.
    pub fn sample_to_bar(&self, sample: i64) -> i64 {
        (self.sample_to_beat(sample) / self.time_signature.beats_per_bar()).floor() as i64
    }

    /// The 1-indexed beat within the bar containing the sample.
    pub fn sample_to_beat_in_bar(&self, sample: i64) -> u32 {
        let beat = self.sample_to_beat(sample).floor() as i64;
        beat.rem_euclid(self.time_signature.beats_per_bar as i64) as u32 + 1
    }

    /// Inverse of the two functions above: `bar` and `beat` are 0-indexed and
    /// `beat` may be fractional.
    pub fn bar_beat_to_sample(&self, bar: i64, beat: f64) -> i64 {
        self.beat_to_sample(bar as f64 * self.time_signature.beats_per_bar() + beat)
    }

    /// Rounds to the nearest multiple of the grid unit. Unlike the
    /// quantization engine this can move backwards in time.
    pub fn quantize_beat(&self, beat: f64, grid_unit: f64) -> f64 {
        if grid_unit <= 0.0 {
            return beat;
        }
        (beat / grid_unit).round() * grid_unit
    }

    /// The first integer-beat sample strictly after `after`.
    pub fn next_beat_boundary(&self, after: i64) -> i64 {
        let beat = (self.sample_to_beat(after) + 1e-9).ceil();
        let mut boundary = self.beat_to_sample(beat);
        if boundary <= after {
            boundary = self.beat_to_sample(beat + 1.0);
        }
        boundary
    }

    /// The first bar-start sample strictly after `after`.
    pub fn next_bar_boundary(&self, after: i64) -> i64 {
        let beats_per_bar = self.time_signature.beats_per_bar();
        let bar = (self.sample_to_beat(after) / beats_per_bar + 1e-9).ceil();
        let mut boundary = self.beat_to_sample(bar * beats_per_bar);
        if boundary <= after {
            boundary = self.beat_to_sample((bar + 1.0) * beats_per_bar);
        }
        boundary
    }

    /// Moves the position forward by one render cycle.
    #[inline]
    pub fn advance(&mut self, frames: usize) {
        self.position += frames as i64;
    }

    pub fn seek(&mut self, sample: i64) {
        self.position = sample;
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }

    /// The beat at the current position.
    pub fn current_beat(&self) -> f64 {
        self.sample_to_beat(self.position)
    }

    pub fn seconds_to_beats(&self, seconds: f64) -> f64 {
        seconds * self.tempo / 60.0
    }

    pub fn beats_to_seconds(&self, beats: f64) -> f64 {
        beats * 60.0 / self.tempo
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn clock_120() -> MusicalClock {
        MusicalClock::new(44100.0, 120.0, TimeSignature::default())
    }

    #[test]
    fn test_concrete_conversions() {
        let clock = clock_120();
        assert_eq!(clock.samples_per_beat(), 22050.0);
        assert_eq!(clock.beat_to_sample(1.0), 22050);
        assert_eq!(clock.beat_to_sample(4.0), 88200);
        assert!((clock.sample_to_beat(11025) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_across_tempos() {
        for sample_rate in [22050.0, 44100.0, 48000.0, 96000.0] {
            let mut tempo = MIN_TEMPO;
            while tempo <= MAX_TEMPO {
                let clock = MusicalClock::new(sample_rate, tempo, TimeSignature::default());
                for beat in [0.0, 0.001, 0.25, 1.0, 3.33, 17.5, 1000.125] {
                    let round_trip = clock.sample_to_beat(clock.beat_to_sample(beat));
                    assert!(
                        (round_trip - beat).abs() <= 0.001,
                        "tempo {} rate {} beat {} came back as {}",
                        tempo,
                        sample_rate,
                        beat,
                        round_trip
                    );
                }
                tempo += 7.5;
            }
        }
    }

    #[test]
    fn test_tempo_clamped() {
        let mut clock = clock_120();
        clock.set_tempo(10.0);
        assert_eq!(clock.tempo(), MIN_TEMPO);
        clock.set_tempo(999.0);
        assert_eq!(clock.tempo(), MAX_TEMPO);
        clock.set_tempo(f64::NAN);
        assert_eq!(clock.tempo(), DEFAULT_TEMPO);

        let clock = MusicalClock::new(44100.0, 300.0, TimeSignature::default());
        assert_eq!(clock.tempo(), MAX_TEMPO);
    }

    #[test]
    fn test_samples_per_beat_follows_tempo() {
        let mut clock = clock_120();
        clock.set_tempo(60.0);
        assert_eq!(clock.samples_per_beat(), 44100.0);
        assert_eq!(clock.beat_to_sample(1.0), 44100);
    }

    #[test]
    fn test_bar_and_beat_in_bar() {
        let clock = clock_120();
        assert_eq!(clock.sample_to_bar(0), 0);
        assert_eq!(clock.sample_to_beat_in_bar(0), 1);
        // Beat 5 is the second beat of the second bar.
        let sample = clock.beat_to_sample(5.0);
        assert_eq!(clock.sample_to_bar(sample), 1);
        assert_eq!(clock.sample_to_beat_in_bar(sample), 2);
        assert_eq!(clock.bar_beat_to_sample(1, 1.0), sample);

        let waltz = MusicalClock::new(48000.0, 90.0, TimeSignature::new(3, 4));
        let sample = waltz.beat_to_sample(7.5);
        assert_eq!(waltz.sample_to_bar(sample), 2);
        assert_eq!(waltz.sample_to_beat_in_bar(sample), 2);
    }

    #[test]
    fn test_bar_beat_consistency() {
        let clock = MusicalClock::new(48000.0, 133.0, TimeSignature::new(7, 8));
        let samples_per_beat = clock.samples_per_beat();
        for sample in (0..2_000_000).step_by(12_347) {
            let bar = clock.sample_to_bar(sample);
            let beat_in_bar = clock.sample_to_beat_in_bar(sample);
            let rebuilt = clock.bar_beat_to_sample(bar, (beat_in_bar - 1) as f64);
            assert!(rebuilt <= sample + 1);
            assert!(((sample - rebuilt) as f64) < samples_per_beat + 1.0);
        }
    }

    #[test]
    fn test_quantize_beat_rounds_to_nearest() {
        let clock = clock_120();
        assert_eq!(clock.quantize_beat(1.3, 1.0), 1.0);
        assert_eq!(clock.quantize_beat(1.6, 1.0), 2.0);
        assert_eq!(clock.quantize_beat(1.3, 0.25), 1.25);
        assert_eq!(clock.quantize_beat(1.3, 0.0), 1.3);
    }

    #[test]
    fn test_boundaries() {
        let clock = clock_120();
        assert_eq!(clock.next_beat_boundary(0), 22050);
        assert_eq!(clock.next_beat_boundary(1), 22050);
        assert_eq!(clock.next_beat_boundary(22050), 44100);
        assert_eq!(clock.next_bar_boundary(0), 88200);
        assert_eq!(clock.next_bar_boundary(22050), 88200);
        assert_eq!(clock.next_bar_boundary(88200), 176400);
    }

    #[test]
    fn test_advance_seek_reset() {
        let mut clock = clock_120();
        clock.advance(256);
        clock.advance(256);
        assert_eq!(clock.position(), 512);
        clock.seek(88200);
        assert_eq!(clock.current_beat(), 4.0);
        clock.reset();
        assert_eq!(clock.position(), 0);
    }

    #[test]
    fn test_time_signature_parse() {
        assert_eq!(
            "3/4".parse::<TimeSignature>().unwrap(),
            TimeSignature::new(3, 4)
        );
        assert_eq!(
            " 7 / 8 ".parse::<TimeSignature>().unwrap(),
            TimeSignature::new(7, 8)
        );
        assert!("4".parse::<TimeSignature>().is_err());
        assert!("0/4".parse::<TimeSignature>().is_err());
        assert_eq!(TimeSignature::default().to_string(), "4/4");
    }

    #[test]
    #[should_panic]
    fn test_zero_sample_rate_is_fatal() {
        MusicalClock::new(0.0, 120.0, TimeSignature::default());
    }
}
