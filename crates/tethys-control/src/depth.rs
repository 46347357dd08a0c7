use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use tethys_link::dispatch::Dispatch;
use tethys_proto::{ControlChannels, TelemetrySample};

const KP: f64 = 1.0;
const KI: f64 = 0.5;
const KD: f64 = 0.6;

const P_LIMIT: f64 = 200.0;
const I_LIMIT: f64 = 85.0;
const D_LIMIT: f64 = 58.0;

/// Hardware-safe throttle output bounds on the manual-control axis.
const OUTPUT_MIN: f64 = 200.0;
const OUTPUT_MAX: f64 = 700.0;

/// Vertical axis value that holds station for a trimmed vehicle.
pub const NEUTRAL_THROTTLE_BIAS: f64 = 410.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthMode {
    Idle,
    Active,
}

/// Closed-loop depth controller. Per-term clamping is the anti-windup
/// strategy: each of P, I and D is bounded independently, then the summed
/// output is clamped to the hardware-safe range.
pub struct DepthHold {
    target_depth: f64,
    integral: f64,
    last_error: f64,
    mode: DepthMode,
}

impl DepthHold {
    pub fn new() -> Self {
        Self {
            target_depth: 0.0,
            integral: 0.0,
            last_error: 0.0,
            mode: DepthMode::Idle,
        }
    }

    /// Idle -> Active. Accumulated state from any previous engagement is
    /// discarded.
    pub fn enable(&mut self, target_depth: f64) {
        self.target_depth = target_depth;
        self.integral = 0.0;
        self.last_error = 0.0;
        self.mode = DepthMode::Active;
        info!("depth-hold: active, target {}", target_depth);
    }

    pub fn disable(&mut self) {
        if self.mode == DepthMode::Active {
            info!("depth-hold: idle");
        }
        self.mode = DepthMode::Idle;
    }

    pub fn is_active(&self) -> bool {
        self.mode == DepthMode::Active
    }

    pub fn target_depth(&self) -> f64 {
        self.target_depth
    }

    /// One control tick. Returns the throttle output, or `None` when idle.
    pub fn step(&mut self, relative_alt: f64) -> Option<u16> {
        if self.mode != DepthMode::Active {
            return None;
        }

        let error = self.target_depth - relative_alt;

        let p = (KP * error).clamp(-P_LIMIT, P_LIMIT);
        self.integral = (self.integral + KI * error).clamp(-I_LIMIT, I_LIMIT);
        let d = ((error - self.last_error) * KD).clamp(-D_LIMIT, D_LIMIT);

        let output = (p + self.integral + d + NEUTRAL_THROTTLE_BIAS).clamp(OUTPUT_MIN, OUTPUT_MAX);

        self.last_error = error;
        Some(output.round() as u16)
    }
}

impl Default for DepthHold {
    fn default() -> Self {
        Self::new()
    }
}

/// Timed control loop: reads the latest telemetry snapshot each tick and
/// drives the throttle axis through the dispatcher. Roll/pitch/yaw carry
/// the last externally set channel values.
pub async fn run_depth_loop<D: Dispatch>(
    depth: Arc<Mutex<DepthHold>>,
    dispatcher: Arc<Mutex<D>>,
    sample: Arc<Mutex<TelemetrySample>>,
    channels: Arc<Mutex<ControlChannels>>,
    tick: Duration,
    running: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(tick);
    while running.load(Ordering::Relaxed) {
        interval.tick().await;

        let alt = sample.lock().unwrap().relative_alt;
        let output = depth.lock().unwrap().step(alt);
        let Some(z) = output else { continue };

        let ch = *channels.lock().unwrap();
        if let Err(e) = dispatcher.lock().unwrap().manual_throttle(z, ch) {
            warn!("depth-hold: throttle send failed: {:#}", e);
        }
    }
    info!("depth-hold: loop stopped");
}
