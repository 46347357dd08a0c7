use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use tethys_link::dispatch::Dispatch;
use tethys_proto::ControlChannels;

/// Mandatory shutdown sequence: neutral channels, disarm, close link, in
/// that order. Runs on every termination path, error or not; a failed step
/// never prevents the following ones.
pub fn run<D: Dispatch>(dispatcher: &Arc<Mutex<D>>, channels: &Arc<Mutex<ControlChannels>>) {
    info!("failsafe: neutral channels, disarm, close");

    let neutral = ControlChannels::neutral();
    *channels.lock().unwrap() = neutral;

    let mut d = dispatcher.lock().unwrap();
    if let Err(e) = d.set_channels(neutral) {
        warn!("failsafe: neutral channels not sent: {:#}", e);
    }
    if let Err(e) = d.disarm() {
        warn!("failsafe: disarm not sent: {:#}", e);
    }
    d.close_link();
}
