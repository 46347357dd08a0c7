pub mod dispatch;
pub mod hblog;
pub mod link;
pub mod rate;
pub mod telemetry_rx;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    /// MAVLink endpoint string, e.g. "udpin:0.0.0.0:14550".
    pub endpoint: String,

    /// MAVLink ids for the ground side.
    pub sys_id: u8,
    pub comp_id: u8,

    /// How long connect() waits for the first vehicle heartbeat.
    pub heartbeat_timeout_ms: Option<u64>,

    /// Consecutive empty receive polls before the link is considered stale.
    pub stale_after_polls: Option<u32>,

    /// Bounded reconnect policy applied after a loss.
    pub reconnect_attempts: Option<u32>,
    pub reconnect_backoff_ms: Option<u64>,

    /// Ground-station heartbeat announce rate. Default 1 Hz.
    pub send_heartbeat_hz: Option<f32>,

    /// Optional append-only raw heartbeat record file.
    pub heartbeat_log: Option<String>,
}

impl LinkConfig {
    pub fn heartbeat_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.heartbeat_timeout_ms.unwrap_or(10_000))
    }

    pub fn reconnect_backoff(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.reconnect_backoff_ms.unwrap_or(1_000))
    }
}
