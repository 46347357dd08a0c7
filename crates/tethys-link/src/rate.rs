use std::time::{Duration, Instant};

use tethys_proto::ControlChannels;

/// Bounds how often channel overrides hit the wire. A changed value may go
/// out once per `min_interval`; an unchanged value is coalesced into a
/// keep-alive resend once per `keepalive`.
#[derive(Debug)]
pub struct ChannelRateLimit {
    last: Option<(Instant, ControlChannels)>,
    min_interval: Duration,
    keepalive: Duration,
}

impl ChannelRateLimit {
    pub fn new(min_interval: Duration, keepalive: Duration) -> Self {
        Self { last: None, min_interval, keepalive }
    }

    pub fn allow(&mut self, ch: ControlChannels) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => Duration::ZERO,
            Some((t, prev)) => {
                let interval = if prev == ch { self.keepalive } else { self.min_interval };
                interval.saturating_sub(now.duration_since(t))
            }
        };
        if !due.is_zero() {
            return false;
        }
        self.last = Some((now, ch));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_send_always_allowed() {
        let mut rl = ChannelRateLimit::new(Duration::from_secs(1), Duration::from_secs(1));
        assert!(rl.allow(ControlChannels::neutral()));
    }

    #[test]
    fn identical_value_coalesced_until_keepalive() {
        let mut rl = ChannelRateLimit::new(Duration::ZERO, Duration::from_secs(60));
        let ch = ControlChannels::neutral();
        assert!(rl.allow(ch));
        assert!(!rl.allow(ch));
        assert!(!rl.allow(ch));
    }

    #[test]
    fn changed_value_allowed_once_min_interval_elapsed() {
        let mut rl = ChannelRateLimit::new(Duration::ZERO, Duration::from_secs(60));
        let mut ch = ControlChannels::neutral();
        assert!(rl.allow(ch));
        ch.throttle = 1600;
        assert!(rl.allow(ch));
        ch.throttle = 1700;
        assert!(rl.allow(ch));
    }

    #[test]
    fn changed_value_still_rate_limited() {
        let mut rl = ChannelRateLimit::new(Duration::from_secs(60), Duration::from_secs(60));
        let mut ch = ControlChannels::neutral();
        assert!(rl.allow(ch));
        ch.throttle = 1600;
        assert!(!rl.allow(ch));
    }
}
