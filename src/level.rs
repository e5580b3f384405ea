//! Loudness measurement for UI visualization.

/// Assumed noise floor in decibels; frames at or below it read as 0.
pub const NOISE_FLOOR_DB: f32 = -60.0;

/// Compute a normalized loudness value in 0..=100 for one audio frame.
///
/// Root-mean-square of the frame converted to decibels, then linearly
/// rescaled from the noise floor (-60 dB) up to 0 dB. Pure function with no
/// history; callers that want smoothing apply it themselves.
pub fn measure(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let mean_square = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    let rms = mean_square.sqrt();
    if rms <= 0.0 {
        return 0.0;
    }

    let db = 20.0 * rms.log10();
    (((db - NOISE_FLOOR_DB) / -NOISE_FLOOR_DB) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(measure(&[0.0; 512]), 0.0);
        assert_eq!(measure(&[]), 0.0);
    }

    #[test]
    fn test_full_scale_is_hundred() {
        // Full-scale square wave: RMS 1.0 -> 0 dB -> 100
        let frame: Vec<f32> = (0..512)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        assert!((measure(&frame) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_over_unity_clamps() {
        assert_eq!(measure(&[2.0; 512]), 100.0);
    }

    #[test]
    fn test_quiet_frame_is_between() {
        // RMS 0.01 -> -40 dB -> a third of the way up the scale
        let level = measure(&[0.01; 512]);
        assert!(level > 30.0 && level < 36.0, "level was {level}");
    }

    #[test]
    fn test_below_noise_floor_is_zero() {
        // RMS 1e-4 -> -80 dB, below the -60 dB floor
        assert_eq!(measure(&[1e-4; 512]), 0.0);
    }
}
