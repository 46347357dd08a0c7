use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use tethys_link::dispatch::Dispatch;
use tethys_proto::{clamp_channel, ControlChannels};

use crate::depth::DepthHold;
use crate::{failsafe, InputConfig};

/// Discrete input events from the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Esc,
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Exit,
}

/// Servo output exercised by the test ramp (first aux output).
const SERVO_TEST_OUTPUT: u8 = 9;
const SERVO_RAMP_STEP: usize = 50;
const SERVO_RAMP_DELAY: Duration = Duration::from_millis(125);

enum Axis {
    Roll,
    Pitch,
    Throttle,
    Yaw,
}

/// Maps key-down events to immediate commands or incremental channel
/// adjustments. The shared `ControlChannels` is the same snapshot the
/// depth-hold loop reads its roll/pitch/yaw from.
pub struct InputRouter<D: Dispatch + 'static> {
    dispatcher: Arc<Mutex<D>>,
    channels: Arc<Mutex<ControlChannels>>,
    depth: Arc<Mutex<DepthHold>>,
    depth_target: f64,
    channel_step: i32,
    yaw_step_deg: f32,
    running: Arc<AtomicBool>,
}

impl<D: Dispatch + 'static> InputRouter<D> {
    pub fn new(
        cfg: &InputConfig,
        depth_target: f64,
        dispatcher: Arc<Mutex<D>>,
        channels: Arc<Mutex<ControlChannels>>,
        depth: Arc<Mutex<DepthHold>>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            dispatcher,
            channels,
            depth,
            depth_target,
            channel_step: cfg.channel_step() as i32,
            yaw_step_deg: cfg.yaw_step_deg(),
            running,
        }
    }

    pub fn handle_key(&self, key: Key) -> KeyOutcome {
        let step = self.channel_step;
        match key {
            Key::Char('w') => self.adjust(Axis::Pitch, step),
            Key::Char('s') => self.adjust(Axis::Pitch, -step),
            Key::Char('a') => self.adjust(Axis::Roll, -step),
            Key::Char('d') => self.adjust(Axis::Roll, step),
            Key::Char('r') | Key::Up => self.adjust(Axis::Throttle, step),
            Key::Char('f') | Key::Down => self.adjust(Axis::Throttle, -step),
            Key::Char('j') => self.adjust(Axis::Yaw, -step),
            Key::Char('l') => self.adjust(Axis::Yaw, step),

            Key::Char('c') => self.reset_channels(),

            Key::Char('q') => self.dispatch(|d| d.arm()),
            Key::Char('e') => self.dispatch(|d| d.disarm()),

            Key::Char('1') => self.switch_mode("MANUAL"),
            Key::Char('3') => self.switch_mode("STABILIZE"),
            Key::Char('2') => {
                self.depth.lock().unwrap().enable(self.depth_target);
            }

            Key::Left => self.dispatch(|d| d.yaw_adjust(self.yaw_step_deg, -1)),
            Key::Right => self.dispatch(|d| d.yaw_adjust(self.yaw_step_deg, 1)),

            Key::Char('z') => self.spawn_servo_ramp(),

            Key::Esc => {
                info!("input: exit requested");
                self.depth.lock().unwrap().disable();
                failsafe::run(&self.dispatcher, &self.channels);
                self.running.store(false, Ordering::Relaxed);
                return KeyOutcome::Exit;
            }

            other => info!("input: unmapped key {:?}", other),
        }
        KeyOutcome::Continue
    }

    fn adjust(&self, axis: Axis, delta: i32) {
        let ch = {
            let mut guard = self.channels.lock().unwrap();
            let mut next = *guard;
            let field = match axis {
                Axis::Roll => &mut next.roll,
                Axis::Pitch => &mut next.pitch,
                Axis::Throttle => &mut next.throttle,
                Axis::Yaw => &mut next.yaw,
            };
            *field = clamp_channel(*field as i32 + delta);
            *guard = next;
            next
        };
        self.dispatch(|d| d.set_channels(ch));
    }

    fn reset_channels(&self) {
        let neutral = ControlChannels::neutral();
        *self.channels.lock().unwrap() = neutral;
        self.dispatch(|d| d.set_channels(neutral));
    }

    fn switch_mode(&self, name: &str) {
        // any mode change away from depth hold idles the controller
        self.depth.lock().unwrap().disable();
        if let Err(e) = self.dispatcher.lock().unwrap().set_mode(name) {
            warn!("input: set_mode {} failed: {:#}", name, e);
        }
    }

    /// The ramp runs on its own task so a slow sweep cannot stall
    /// arm/mode/channel handling; the shared running flag cancels it.
    fn spawn_servo_ramp(&self) {
        let dispatcher = self.dispatcher.clone();
        let running = self.running.clone();
        tokio::spawn(async move {
            info!("input: servo ramp start");
            for pwm in (1100u16..1900).step_by(SERVO_RAMP_STEP) {
                if !running.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = dispatcher.lock().unwrap().set_servo(SERVO_TEST_OUTPUT, pwm) {
                    warn!("input: servo ramp send failed: {:#}", e);
                    break;
                }
                tokio::time::sleep(SERVO_RAMP_DELAY).await;
            }
            info!("input: servo ramp done");
        });
    }

    fn dispatch(&self, f: impl FnOnce(&mut D) -> anyhow::Result<()>) {
        if let Err(e) = f(&mut self.dispatcher.lock().unwrap()) {
            warn!("input: command failed: {:#}", e);
        }
    }
}

/// Consumes the key stream until exit or shutdown.
pub async fn run_event_loop<D: Dispatch + 'static>(
    router: InputRouter<D>,
    mut keys: UnboundedReceiver<Key>,
) {
    while let Some(key) = keys.recv().await {
        if !router.running.load(Ordering::Relaxed) {
            break;
        }
        if router.handle_key(key) == KeyOutcome::Exit {
            break;
        }
    }
    info!("input: event loop stopped");
}
