use serde::{Deserialize, Serialize};

/// Connectivity state. Owned and mutated exclusively by the link manager;
/// every other component only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Lost,
}

/// Captured from the first heartbeat, immutable for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleIdentity {
    pub system_id: u8,
    pub component_id: u8,
}

/// Latest attitude/position snapshot. Single writer (the telemetry
/// receiver); published whole so readers never observe a torn update.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub ts_unix_ms: i64,
    pub roll_deg: f64,
    pub pitch_deg: f64,
    pub yaw_deg: f64,
    /// Relative altitude/depth in the vehicle's millimetre units.
    pub relative_alt: f64,
}

/// Push notifications consumed by the UI layer.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    ConnectionChanged(String),
    TelemetryUpdated { roll: f64, pitch: f64, yaw: f64, depth: f64 },
}
