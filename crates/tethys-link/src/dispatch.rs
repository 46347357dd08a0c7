use std::time::Duration;

use anyhow::Result;
use mavlink::common::{
    COMMAND_LONG_DATA, MANUAL_CONTROL_DATA, MavCmd, MavMessage, RC_CHANNELS_OVERRIDE_DATA,
};
use tracing::{debug, info};

use tethys_proto::{Command, ControlChannels, ModeTable, ProtocolError, CHANNEL_NEUTRAL};

use crate::link::MavSender;
use crate::rate::ChannelRateLimit;

/// Operations the control-side components issue. Implemented by
/// `Dispatcher`; tests substitute a recording mock.
pub trait Dispatch: Send {
    fn arm(&mut self) -> Result<()>;
    fn disarm(&mut self) -> Result<()>;
    fn set_mode(&mut self, name: &str) -> Result<()>;
    fn set_servo(&mut self, servo: u8, pwm: u16) -> Result<()>;
    fn set_channels(&mut self, ch: ControlChannels) -> Result<()>;
    /// Depth-hold output path. `z` is the controller's throttle output on
    /// the protocol's 0..1000 vertical axis; roll/pitch/yaw come from the
    /// last externally set channels.
    fn manual_throttle(&mut self, z: u16, ch: ControlChannels) -> Result<()>;
    fn yaw_adjust(&mut self, degrees: f32, direction: i8) -> Result<()>;
    fn close_link(&mut self);
}

/// Serializes every outbound command onto the link. Concurrent callers go
/// through the sender's lock, so partial writes never interleave.
pub struct Dispatcher<S: MavSender> {
    sender: S,
    modes: ModeTable,
    limiter: ChannelRateLimit,
}

impl<S: MavSender> Dispatcher<S> {
    pub fn new(sender: S, modes: ModeTable) -> Self {
        Self {
            sender,
            modes,
            limiter: ChannelRateLimit::new(Duration::from_millis(50), Duration::from_millis(500)),
        }
    }

    #[cfg(test)]
    fn with_limiter(sender: S, modes: ModeTable, limiter: ChannelRateLimit) -> Self {
        Self { sender, modes, limiter }
    }

    /// Route a tagged command to its typed operation.
    pub fn dispatch(&mut self, cmd: &Command) -> Result<()> {
        match cmd {
            Command::Arm => self.arm(),
            Command::Disarm => self.disarm(),
            Command::SetMode(name) => self.set_mode(name),
            Command::SetServo { servo, pwm } => self.set_servo(*servo, *pwm),
            Command::SetChannels(ch) => self.set_channels(*ch),
            Command::YawAdjust { degrees, direction } => self.yaw_adjust(*degrees, *direction),
        }
    }

    fn command_long(&mut self, command: MavCmd, params: [f32; 7]) -> Result<()> {
        let target = self.sender.target();
        let cmd = COMMAND_LONG_DATA {
            target_system: target.system_id,
            target_component: target.component_id,
            command: command.into(),
            confirmation: 0,
            param1: params[0],
            param2: params[1],
            param3: params[2],
            param4: params[3],
            param5: params[4],
            param6: params[5],
            param7: params[6],
        };
        self.sender.send_message(&MavMessage::COMMAND_LONG(cmd))?;
        Ok(())
    }
}

/// PWM microseconds to the manual-control axis range: 1500 is center,
/// [1100, 1900] spans [-1000, 1000].
fn pwm_to_axis(pwm: u16) -> i16 {
    let off = pwm as i32 - CHANNEL_NEUTRAL as i32;
    (off * 5 / 2).clamp(-1000, 1000) as i16
}

impl<S: MavSender> Dispatch for Dispatcher<S> {
    /// Fire-and-forget: success means "sent", not "confirmed".
    fn arm(&mut self) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;
        info!("dispatch: ARM sent");
        Ok(())
    }

    fn disarm(&mut self) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_COMPONENT_ARM_DISARM,
            [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;
        info!("dispatch: DISARM sent");
        Ok(())
    }

    fn set_mode(&mut self, name: &str) -> Result<()> {
        let Some(mode_id) = self.modes.resolve(name) else {
            // nothing may hit the wire for an unknown mode
            return Err(ProtocolError::UnknownMode(name.to_string()).into());
        };
        // param1 carries MAV_MODE_FLAG_CUSTOM_MODE_ENABLED, param2 the
        // vehicle-defined mode id
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_MODE,
            [1.0, mode_id as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;
        info!("dispatch: mode '{}' ({}) sent", name, mode_id);
        Ok(())
    }

    fn set_servo(&mut self, servo: u8, pwm: u16) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_DO_SET_SERVO,
            [servo as f32, pwm as f32, 0.0, 0.0, 0.0, 0.0, 0.0],
        )?;
        debug!("dispatch: servo {} -> {}us", servo, pwm);
        Ok(())
    }

    fn set_channels(&mut self, ch: ControlChannels) -> Result<()> {
        let ch = ch.clamped();
        if !self.limiter.allow(ch) {
            debug!("dispatch: channels coalesced");
            return Ok(());
        }
        let target = self.sender.target();
        // canonical order: roll, pitch, throttle, yaw on chan1..chan4
        let msg = RC_CHANNELS_OVERRIDE_DATA {
            target_system: target.system_id,
            target_component: target.component_id,
            chan1_raw: ch.roll,
            chan2_raw: ch.pitch,
            chan3_raw: ch.throttle,
            chan4_raw: ch.yaw,
            ..Default::default()
        };
        self.sender.send_message(&MavMessage::RC_CHANNELS_OVERRIDE(msg))?;
        debug!(
            "dispatch: channels r={} p={} t={} y={}",
            ch.roll, ch.pitch, ch.throttle, ch.yaw
        );
        Ok(())
    }

    fn manual_throttle(&mut self, z: u16, ch: ControlChannels) -> Result<()> {
        let target = self.sender.target();
        let msg = MANUAL_CONTROL_DATA {
            target: target.system_id,
            x: pwm_to_axis(ch.pitch),
            y: pwm_to_axis(ch.roll),
            z: z.min(1000) as i16,
            r: pwm_to_axis(ch.yaw),
            buttons: 0,
            ..Default::default()
        };
        self.sender.send_message(&MavMessage::MANUAL_CONTROL(msg))?;
        Ok(())
    }

    fn yaw_adjust(&mut self, degrees: f32, direction: i8) -> Result<()> {
        self.command_long(
            MavCmd::MAV_CMD_CONDITION_YAW,
            [degrees, 0.0, direction as f32, 0.0, 0.0, 0.0, 0.0],
        )?;
        debug!("dispatch: yaw {}deg dir={}", degrees, direction);
        Ok(())
    }

    fn close_link(&mut self) {
        self.sender.close();
    }
}
