use serde::{Deserialize, Serialize};

pub const CHANNEL_MIN: u16 = 1100;
pub const CHANNEL_MAX: u16 = 1900;
pub const CHANNEL_NEUTRAL: u16 = 1500;

/// Clamp a raw channel value into the valid PWM range. Idempotent.
pub fn clamp_channel(v: i32) -> u16 {
    v.clamp(CHANNEL_MIN as i32, CHANNEL_MAX as i32) as u16
}

/// Manual-control axis values in PWM microseconds. Always published as a
/// whole 4-tuple; a reader never sees a mix of two writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlChannels {
    pub roll: u16,
    pub pitch: u16,
    pub throttle: u16,
    pub yaw: u16,
}

impl ControlChannels {
    pub fn neutral() -> Self {
        Self {
            roll: CHANNEL_NEUTRAL,
            pitch: CHANNEL_NEUTRAL,
            throttle: CHANNEL_NEUTRAL,
            yaw: CHANNEL_NEUTRAL,
        }
    }

    /// Copy with every axis clamped into [CHANNEL_MIN, CHANNEL_MAX].
    pub fn clamped(&self) -> Self {
        Self {
            roll: clamp_channel(self.roll as i32),
            pitch: clamp_channel(self.pitch as i32),
            throttle: clamp_channel(self.throttle as i32),
            yaw: clamp_channel(self.yaw as i32),
        }
    }
}

impl Default for ControlChannels {
    fn default() -> Self {
        Self::neutral()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_is_idempotent() {
        for x in [-5000, 0, 1099, 1100, 1500, 1900, 1901, 40000] {
            let once = clamp_channel(x);
            let twice = clamp_channel(once as i32);
            assert_eq!(once, twice);
            assert!((CHANNEL_MIN..=CHANNEL_MAX).contains(&once));
        }
    }

    #[test]
    fn clamped_bounds_every_axis() {
        let ch = ControlChannels { roll: 900, pitch: 2500, throttle: 1500, yaw: 1899 };
        let c = ch.clamped();
        assert_eq!(c.roll, CHANNEL_MIN);
        assert_eq!(c.pitch, CHANNEL_MAX);
        assert_eq!(c.throttle, 1500);
        assert_eq!(c.yaw, 1899);
    }

    #[test]
    fn neutral_is_all_1500() {
        assert_eq!(
            ControlChannels::neutral(),
            ControlChannels { roll: 1500, pitch: 1500, throttle: 1500, yaw: 1500 }
        );
    }
}
