pub mod channels;
pub mod command;
pub mod error;
pub mod modes;
pub mod telemetry;

pub use channels::{clamp_channel, ControlChannels, CHANNEL_MAX, CHANNEL_MIN, CHANNEL_NEUTRAL};
pub use command::Command;
pub use error::{CommandError, LinkError, ProtocolError};
pub use modes::ModeTable;
pub use telemetry::{LinkState, StatusEvent, TelemetrySample, VehicleIdentity};
