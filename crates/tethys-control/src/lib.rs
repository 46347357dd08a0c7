pub mod depth;
pub mod failsafe;
pub mod router;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DepthHoldConfig {
    /// Target depth in the vehicle's relative-altitude units.
    pub target_depth: Option<f64>,
    /// Control loop period.
    pub tick_ms: Option<u64>,
}

impl DepthHoldConfig {
    pub fn target_depth(&self) -> f64 {
        self.target_depth.unwrap_or(2000.0)
    }

    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.tick_ms.unwrap_or(100))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Per-keypress channel adjustment in PWM microseconds.
    pub channel_step: Option<u16>,
    /// Relative heading change per yaw-adjust keypress.
    pub yaw_step_deg: Option<f32>,
}

impl InputConfig {
    pub fn channel_step(&self) -> u16 {
        self.channel_step.unwrap_or(100)
    }

    pub fn yaw_step_deg(&self) -> f32 {
        self.yaw_step_deg.unwrap_or(45.0)
    }
}
