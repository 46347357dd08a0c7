use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mavlink::common::{MavMessage, MavResult};
use mavlink::MavHeader;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, trace, warn};

use tethys_proto::{CommandError, LinkState, StatusEvent, TelemetrySample};

use crate::hblog::HeartbeatLog;
use crate::link::{open_endpoint, LinkManager, SharedConnection};
use crate::LinkConfig;

const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Drains inbound messages on a dedicated blocking thread, publishing the
/// latest attitude/altitude snapshot and UI status events.
pub struct TelemetryReceiver {
    link: Arc<Mutex<LinkManager>>,
    sample: Arc<Mutex<TelemetrySample>>,
    events: UnboundedSender<StatusEvent>,
    hblog: HeartbeatLog,
    stale_after_polls: u32,
    hb_interval: Duration,
    hb_timeout: Duration,
    running: Arc<AtomicBool>,
}

/// Reader thread with exclusive use of the receive half. A blocking recv
/// here never holds the shared link lock, so command sends and the
/// fail-safe stay live on a silent link. Exits when the session channel is
/// dropped or the running flag clears.
fn spawn_reader(
    conn: SharedConnection,
    running: Arc<AtomicBool>,
) -> mpsc::Receiver<(MavHeader, MavMessage)> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        while running.load(Ordering::Relaxed) {
            match conn.recv() {
                Ok(item) => {
                    if tx.send(item).is_err() {
                        break;
                    }
                }
                // bad frame or transient read failure; staleness is judged
                // upstream by the poll timeouts
                Err(_) => std::thread::sleep(RECV_POLL_TIMEOUT),
            }
        }
    });
    rx
}

impl TelemetryReceiver {
    pub fn new(
        cfg: &LinkConfig,
        link: Arc<Mutex<LinkManager>>,
        sample: Arc<Mutex<TelemetrySample>>,
        events: UnboundedSender<StatusEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        let hb_hz = cfg.send_heartbeat_hz.unwrap_or(1.0).max(0.2);
        Self {
            link,
            sample,
            events,
            hblog: HeartbeatLog::open(cfg.heartbeat_log.as_deref()),
            stale_after_polls: cfg.stale_after_polls.unwrap_or(300),
            hb_interval: Duration::from_secs_f32(1.0 / hb_hz),
            hb_timeout: cfg.heartbeat_timeout(),
            running,
        }
    }

    /// Receive loop. One session per transport: a reader thread blocks in
    /// recv and forwards frames over a channel; this loop paces heartbeats
    /// and counts poll timeouts toward staleness. Runs until the shared
    /// running flag clears or reconnection is exhausted.
    pub fn run(mut self) {
        let mut last_hb_send = Instant::now();

        'session: loop {
            let conn = self.link.lock().unwrap().receive_half();
            let Some(conn) = conn else { break };
            let rx = spawn_reader(conn, self.running.clone());

            let mut empty_polls = 0u32;
            while self.running.load(Ordering::Relaxed) {
                if last_hb_send.elapsed() >= self.hb_interval {
                    let _ = self.link.lock().unwrap().send_heartbeat();
                    last_hb_send = Instant::now();
                }

                match rx.recv_timeout(RECV_POLL_TIMEOUT) {
                    Ok((hdr, msg)) => {
                        empty_polls = 0;
                        self.handle(&hdr, &msg);
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        empty_polls += 1;
                        if empty_polls >= self.stale_after_polls {
                            if self.on_stale() {
                                continue 'session;
                            }
                            break 'session;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        if self.on_stale() {
                            continue 'session;
                        }
                        break 'session;
                    }
                }
            }
            break;
        }
        info!("telemetry: receive loop stopped");
    }

    fn handle(&mut self, hdr: &MavHeader, msg: &MavMessage) {
        if let MavMessage::HEARTBEAT(hb) = msg {
            self.hblog
                .append(now_unix_ms(), hdr.system_id, hdr.component_id, hb);
        }

        // best-effort: most commands are fire-and-forget, but a vehicle
        // that does acknowledge gets its rejections surfaced
        if let MavMessage::COMMAND_ACK(ack) = msg {
            if let Some(err) = ack_error(ack.result) {
                warn!("telemetry: {:?} acknowledged with {}", ack.command, err);
            }
        }

        let mut guard = self.sample.lock().unwrap();
        let mut next = *guard;
        if apply_message(&mut next, msg, now_unix_ms()) {
            // full-struct store: readers see old or new, never a mix
            *guard = next;
            drop(guard);
            let _ = self.events.send(StatusEvent::TelemetryUpdated {
                roll: next.roll_deg,
                pitch: next.pitch_deg,
                yaw: next.yaw_deg,
                depth: next.relative_alt,
            });
        }
    }

    /// The link has gone quiet: mark the loss, then run the bounded
    /// reconnect policy. Every open runs outside the link lock so command
    /// sends keep failing fast instead of queueing behind it. Returns true
    /// when a fresh transport was installed and a new session should start.
    fn on_stale(&mut self) -> bool {
        {
            let mut link = self.link.lock().unwrap();
            if link.state() == LinkState::Disconnected {
                // closed on purpose, nothing to recover
                return false;
            }
            link.mark_lost();
        }
        let _ = self
            .events
            .send(StatusEvent::ConnectionChanged("Lost".to_string()));

        let (attempts, backoff) = self.link.lock().unwrap().reconnect_policy();
        let endpoint = self.link.lock().unwrap().endpoint().to_string();
        for attempt in 1..=attempts {
            if !self.running.load(Ordering::Relaxed) {
                return false;
            }
            std::thread::sleep(backoff * attempt);
            info!("link: reconnect attempt {}/{}", attempt, attempts);
            match open_endpoint(&endpoint, self.hb_timeout) {
                Ok((conn, identity)) => {
                    self.link.lock().unwrap().install(conn, identity);
                    let _ = self.events.send(StatusEvent::ConnectionChanged(format!(
                        "Connected to SYSID:{}",
                        identity.system_id
                    )));
                    return true;
                }
                Err(e) => warn!("link: reconnect attempt {} failed: {}", attempt, e),
            }
        }

        self.link.lock().unwrap().close();
        let _ = self
            .events
            .send(StatusEvent::ConnectionChanged("Disconnected".to_string()));
        false
    }
}

/// Map a vehicle acknowledgment result onto the command error taxonomy.
fn ack_error(result: MavResult) -> Option<CommandError> {
    match result {
        MavResult::MAV_RESULT_ACCEPTED | MavResult::MAV_RESULT_IN_PROGRESS => None,
        _ => Some(CommandError::Rejected),
    }
}

fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Fold one inbound message into the snapshot. Returns true when the
/// sample changed; unrecognized kinds are ignored.
fn apply_message(sample: &mut TelemetrySample, msg: &MavMessage, ts_unix_ms: i64) -> bool {
    match msg {
        MavMessage::ATTITUDE(a) => {
            sample.ts_unix_ms = ts_unix_ms;
            sample.roll_deg = (a.roll as f64).to_degrees();
            sample.pitch_deg = (a.pitch as f64).to_degrees();
            sample.yaw_deg = (a.yaw as f64).to_degrees();
            true
        }
        MavMessage::GLOBAL_POSITION_INT(p) => {
            sample.ts_unix_ms = ts_unix_ms;
            sample.relative_alt = p.relative_alt as f64;
            true
        }
        MavMessage::HEARTBEAT(_) => false,
        other => {
            trace!("telemetry: ignoring {:?}", other);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mavlink::common::{ATTITUDE_DATA, GLOBAL_POSITION_INT_DATA};
    use mavlink::error::{MessageReadError, MessageWriteError};
    use mavlink::{MavConnection, MavlinkVersion};

    #[test]
    fn attitude_updates_angles_only() {
        let mut s = TelemetrySample { relative_alt: 1234.0, ..Default::default() };
        let att = ATTITUDE_DATA {
            roll: std::f32::consts::FRAC_PI_2,
            pitch: 0.0,
            yaw: -std::f32::consts::PI,
            ..Default::default()
        };
        assert!(apply_message(&mut s, &MavMessage::ATTITUDE(att), 7));
        assert!((s.roll_deg - 90.0).abs() < 1e-4);
        assert!((s.yaw_deg + 180.0).abs() < 1e-3);
        assert_eq!(s.relative_alt, 1234.0);
        assert_eq!(s.ts_unix_ms, 7);
    }

    #[test]
    fn position_updates_altitude_only() {
        let mut s = TelemetrySample { roll_deg: 5.0, ..Default::default() };
        let pos = GLOBAL_POSITION_INT_DATA { relative_alt: 2000, ..Default::default() };
        assert!(apply_message(&mut s, &MavMessage::GLOBAL_POSITION_INT(pos), 9));
        assert_eq!(s.relative_alt, 2000.0);
        assert_eq!(s.roll_deg, 5.0);
    }

    #[test]
    fn rejected_acks_map_to_command_errors() {
        assert!(ack_error(MavResult::MAV_RESULT_ACCEPTED).is_none());
        assert!(matches!(
            ack_error(MavResult::MAV_RESULT_DENIED),
            Some(CommandError::Rejected)
        ));
    }

    #[test]
    fn unrecognized_kinds_are_ignored() {
        let mut s = TelemetrySample::default();
        let before = s;
        let hb = mavlink::common::HEARTBEAT_DATA::default();
        assert!(!apply_message(&mut s, &MavMessage::HEARTBEAT(hb), 1));
        assert_eq!(s.ts_unix_ms, before.ts_unix_ms);
    }

    /// Transport whose receive half never yields a frame, like an open
    /// datagram socket with nothing on the other end.
    struct SilentConn;

    impl MavConnection<MavMessage> for SilentConn {
        fn recv(&self) -> Result<(MavHeader, MavMessage), MessageReadError> {
            loop {
                std::thread::sleep(Duration::from_secs(60));
            }
        }

        fn send(&self, _hdr: &MavHeader, _msg: &MavMessage) -> Result<usize, MessageWriteError> {
            Ok(0)
        }

        fn set_protocol_version(&mut self, _version: MavlinkVersion) {}

        fn get_protocol_version(&self) -> MavlinkVersion {
            MavlinkVersion::V2
        }
    }

    fn silent_config() -> LinkConfig {
        LinkConfig {
            endpoint: "udpin:127.0.0.1:14550".to_string(),
            sys_id: 255,
            comp_id: 240,
            heartbeat_timeout_ms: Some(100),
            stale_after_polls: Some(u32::MAX),
            reconnect_attempts: Some(0),
            reconnect_backoff_ms: Some(1),
            send_heartbeat_hz: None,
            heartbeat_log: None,
        }
    }

    #[test]
    fn sends_stay_live_while_receive_blocks() {
        let link = Arc::new(Mutex::new(LinkManager::with_transport(
            Arc::new(SilentConn),
            LinkState::Connected,
        )));
        let running = Arc::new(AtomicBool::new(true));
        let (events, _events_rx) = tokio::sync::mpsc::unbounded_channel();
        let receiver = TelemetryReceiver::new(
            &silent_config(),
            link.clone(),
            Arc::new(Mutex::new(TelemetrySample::default())),
            events,
            running.clone(),
        );
        let loop_handle = std::thread::spawn(move || receiver.run());

        // let the reader thread park inside recv
        std::thread::sleep(Duration::from_millis(100));

        let start = Instant::now();
        link.lock().unwrap().send_heartbeat().unwrap();
        assert!(
            start.elapsed() < Duration::from_secs(1),
            "send queued behind a blocked receive"
        );

        running.store(false, Ordering::Relaxed);
        loop_handle.join().unwrap();
        // the reader stays parked in recv; it holds no locks
    }
}
