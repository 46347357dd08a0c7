use crate::channels::ControlChannels;

/// Outbound vehicle commands, one variant per wire command kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Arm,
    Disarm,
    SetMode(String),
    SetServo { servo: u8, pwm: u16 },
    SetChannels(ControlChannels),
    YawAdjust { degrees: f32, direction: i8 },
}
