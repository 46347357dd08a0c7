use std::fs::{File, OpenOptions};
use std::io::Write;

use mavlink::common::HEARTBEAT_DATA;
use tracing::warn;

/// Append-only raw heartbeat record file, one record per line. Any write
/// failure downgrades to "logging disabled"; telemetry processing is never
/// affected.
pub struct HeartbeatLog {
    file: Option<File>,
}

impl HeartbeatLog {
    pub fn open(path: Option<&str>) -> Self {
        let file = match path {
            None => None,
            Some(p) => match OpenOptions::new().create(true).append(true).open(p) {
                Ok(f) => Some(f),
                Err(e) => {
                    warn!("hblog: cannot open {}: {} - heartbeat logging disabled", p, e);
                    None
                }
            },
        };
        Self { file }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn append(&mut self, ts_unix_ms: i64, sys: u8, comp: u8, hb: &HEARTBEAT_DATA) {
        let Some(f) = self.file.as_mut() else { return };
        let line = format!(
            "ts={} sys={} comp={} type={:?} base_mode={:?} custom_mode={} status={:?}",
            ts_unix_ms, sys, comp, hb.mavtype, hb.base_mode, hb.custom_mode, hb.system_status
        );
        if let Err(e) = writeln!(f, "{}", line) {
            warn!("hblog: write failed: {} - heartbeat logging disabled", e);
            self.file = None;
        }
    }
}
