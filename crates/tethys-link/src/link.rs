use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mavlink::common::{
    HEARTBEAT_DATA, MavAutopilot, MavMessage, MavModeFlag, MavState, MavType,
};
use mavlink::{MavConnection, MavHeader};
use tracing::{info, warn};

use tethys_proto::{LinkError, LinkState, VehicleIdentity};

use crate::LinkConfig;

/// Anything the dispatcher needs from the transport side: a serialized
/// send path plus the session identity. The link manager is the production
/// implementation; tests substitute a recorder.
pub trait MavSender: Send {
    fn send_message(&mut self, msg: &MavMessage) -> Result<(), LinkError>;
    fn target(&self) -> VehicleIdentity;
    fn close(&mut self);
}

/// The transport is shared between the manager (sends) and the telemetry
/// receiver's reader thread (receives); the two halves are synchronized
/// inside the connection, not by the manager's lock.
pub(crate) type SharedConnection = Arc<dyn MavConnection<MavMessage> + Sync + Send>;

/// Open the transport and block (bounded by `timeout`) until the first
/// vehicle heartbeat is observed. Free-standing so reconnect attempts can
/// run it without holding the manager's lock.
pub(crate) fn open_endpoint(
    endpoint: &str,
    timeout: Duration,
) -> Result<(SharedConnection, VehicleIdentity), LinkError> {
    info!("link: connecting to {}", endpoint);
    let conn: SharedConnection = Arc::from(
        mavlink::connect::<MavMessage>(endpoint).map_err(|e| LinkError::Refused(e.to_string()))?,
    );

    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        match conn.recv() {
            Ok((hdr, MavMessage::HEARTBEAT(_))) => {
                let identity = VehicleIdentity {
                    system_id: hdr.system_id,
                    component_id: hdr.component_id,
                };
                info!(
                    "link: heartbeat from sys={} comp={}, connected",
                    identity.system_id, identity.component_id
                );
                return Ok((conn, identity));
            }
            Ok(_) => {}
            Err(_) => std::thread::sleep(Duration::from_millis(25)),
        }
    }
    Err(LinkError::Timeout)
}

/// Owns the send half of the MAVLink transport and the session state. The
/// only component that transitions `LinkState`; everyone else reads it.
/// Receives never run under this manager's lock; the telemetry receiver
/// takes a `receive_half` clone for its dedicated reader thread.
pub struct LinkManager {
    endpoint: String,
    conn: Option<SharedConnection>,
    hdr: MavHeader,
    state: LinkState,
    identity: Option<VehicleIdentity>,
    reconnect_attempts: u32,
    reconnect_backoff: Duration,
}

impl LinkManager {
    /// Open the transport and block (bounded by `timeout`) until the first
    /// vehicle heartbeat is observed.
    pub fn connect(cfg: &LinkConfig, timeout: Duration) -> Result<Self, LinkError> {
        let mut mgr = Self {
            endpoint: cfg.endpoint.clone(),
            conn: None,
            hdr: MavHeader {
                system_id: cfg.sys_id,
                component_id: cfg.comp_id,
                sequence: 0,
            },
            state: LinkState::Connecting,
            identity: None,
            reconnect_attempts: cfg.reconnect_attempts.unwrap_or(5),
            reconnect_backoff: cfg.reconnect_backoff(),
        };
        match open_endpoint(&cfg.endpoint, timeout) {
            Ok((conn, identity)) => {
                mgr.install(conn, identity);
                Ok(mgr)
            }
            Err(e) => Err(e),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }

    pub fn identity(&self) -> Option<VehicleIdentity> {
        self.identity
    }

    pub fn reconnect_policy(&self) -> (u32, Duration) {
        (self.reconnect_attempts, self.reconnect_backoff)
    }

    pub(crate) fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Clone of the transport for a dedicated reader thread.
    pub(crate) fn receive_half(&self) -> Option<SharedConnection> {
        self.conn.clone()
    }

    /// Adopt a freshly opened transport. The identity captured from the
    /// first session's heartbeat is kept for the rest of the run.
    pub(crate) fn install(&mut self, conn: SharedConnection, identity: VehicleIdentity) {
        self.conn = Some(conn);
        self.identity.get_or_insert(identity);
        self.state = LinkState::Connected;
    }

    /// Transition Connected -> Lost. Returns true only on the first call of
    /// a loss episode, so one sustained outage yields one notification.
    pub fn mark_lost(&mut self) -> bool {
        if self.state == LinkState::Connected {
            self.state = LinkState::Lost;
            warn!("link: lost");
            true
        } else {
            false
        }
    }

    pub fn send(&mut self, msg: &MavMessage) -> Result<(), LinkError> {
        let conn = self.conn.clone().ok_or(LinkError::Closed)?;
        self.hdr.sequence = self.hdr.sequence.wrapping_add(1);
        match conn.send(&self.hdr, msg) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("link: send failed: {}", e);
                self.mark_lost();
                Err(LinkError::Closed)
            }
        }
    }

    /// Announce the ground station on the link.
    pub fn send_heartbeat(&mut self) -> Result<(), LinkError> {
        let hb = HEARTBEAT_DATA {
            custom_mode: 0,
            mavtype: MavType::MAV_TYPE_GCS,
            autopilot: MavAutopilot::MAV_AUTOPILOT_INVALID,
            base_mode: MavModeFlag::MAV_MODE_FLAG_CUSTOM_MODE_ENABLED,
            system_status: MavState::MAV_STATE_ACTIVE,
            mavlink_version: 3,
        };
        self.send(&MavMessage::HEARTBEAT(hb))
    }

    /// Idempotent: safe to call repeatedly, safe when never connected. A
    /// reader still blocked in recv keeps its own transport clone; it exits
    /// once the transport errors or its session channel is dropped.
    pub fn close(&mut self) {
        if self.conn.take().is_some() {
            info!("link: closed");
        }
        self.state = LinkState::Disconnected;
    }

    #[cfg(test)]
    pub(crate) fn with_transport(conn: SharedConnection, state: LinkState) -> Self {
        Self {
            endpoint: "udpin:127.0.0.1:14550".to_string(),
            conn: Some(conn),
            hdr: MavHeader { system_id: 255, component_id: 240, sequence: 0 },
            state,
            identity: Some(VehicleIdentity { system_id: 1, component_id: 1 }),
            reconnect_attempts: 0,
            reconnect_backoff: Duration::from_millis(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_manager(state: LinkState) -> LinkManager {
        LinkManager {
            endpoint: "udpin:127.0.0.1:14550".to_string(),
            conn: None,
            hdr: MavHeader { system_id: 255, component_id: 240, sequence: 0 },
            state,
            identity: None,
            reconnect_attempts: 3,
            reconnect_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn mark_lost_fires_once_per_episode() {
        let mut mgr = offline_manager(LinkState::Connected);
        assert!(mgr.mark_lost());
        assert_eq!(mgr.state(), LinkState::Lost);
        // a sustained outage must not produce duplicate transitions
        assert!(!mgr.mark_lost());
        assert!(!mgr.mark_lost());
    }

    #[test]
    fn mark_lost_is_inert_when_not_connected() {
        let mut mgr = offline_manager(LinkState::Disconnected);
        assert!(!mgr.mark_lost());
        assert_eq!(mgr.state(), LinkState::Disconnected);
    }

    #[test]
    fn close_is_idempotent_and_safe_when_never_connected() {
        let mut mgr = offline_manager(LinkState::Connected);
        mgr.close();
        mgr.close();
        assert_eq!(mgr.state(), LinkState::Disconnected);
        assert!(!mgr.is_connected());
    }

    #[test]
    fn send_without_transport_is_closed() {
        let mut mgr = offline_manager(LinkState::Disconnected);
        assert!(matches!(mgr.send_heartbeat(), Err(LinkError::Closed)));
    }

    #[test]
    fn receive_half_absent_after_close() {
        let mut mgr = offline_manager(LinkState::Disconnected);
        assert!(mgr.receive_half().is_none());
        mgr.close();
        assert!(mgr.receive_half().is_none());
    }
}

impl MavSender for Arc<Mutex<LinkManager>> {
    fn send_message(&mut self, msg: &MavMessage) -> Result<(), LinkError> {
        self.lock().unwrap().send(msg)
    }

    fn target(&self) -> VehicleIdentity {
        self.lock().unwrap().identity().unwrap_or(VehicleIdentity {
            system_id: 1,
            component_id: 1,
        })
    }

    fn close(&mut self) {
        self.lock().unwrap().close();
    }
}
