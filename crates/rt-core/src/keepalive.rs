use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The keep-alive state machine for one connection.
///
/// `idle -> awaiting-pong` fires when a tick lands after `interval` with no
/// inbound traffic. `awaiting-pong -> idle` fires on any inbound frame.
/// `awaiting-pong -> closed` fires when a further tick lands with still no
/// traffic (the pending keep-alive went unanswered). `* -> closed` also
/// happens on an explicit external close.
///
/// This type is pure state; it holds no socket and spawns no task. The
/// caller (the connection's I/O loop) drives it by calling [`tick`] on its
/// own interval timer and [`on_inbound_frame`] whenever a frame arrives, and
/// acts on the returned [`KeepAliveAction`].
#[derive(Debug)]
pub struct KeepAliveMonitor {
    interval: Duration,
    state: Mutex<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveState {
    Idle,
    AwaitingPong,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAliveAction {
    /// No action required this tick.
    None,
    /// Send a keep-alive event to the peer and start the reply timeout.
    SendKeepAlive,
    /// The peer failed to answer in time; the socket must be closed.
    TimedOut,
    /// Already closed; nothing to do.
    AlreadyClosed,
}

#[derive(Debug)]
struct Inner {
    state: KeepAliveState,
    last_activity: Instant,
}

impl KeepAliveMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            state: Mutex::new(Inner {
                state: KeepAliveState::Idle,
                last_activity: Instant::now(),
            }),
        }
    }

    pub fn default_interval() -> Self {
        Self::new(Duration::from_secs(10))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> KeepAliveState {
        self.state.lock().expect("keepalive mutex poisoned").state
    }

    /// Any inbound frame counts as liveness and cancels a pending timeout.
    pub fn on_inbound_frame(&self) {
        let mut inner = self.state.lock().expect("keepalive mutex poisoned");
        if inner.state != KeepAliveState::Closed {
            inner.state = KeepAliveState::Idle;
        }
        inner.last_activity = Instant::now();
    }

    /// Called once per interval tick by the owning connection's I/O loop.
    pub fn tick(&self) -> KeepAliveAction {
        let mut inner = self.state.lock().expect("keepalive mutex poisoned");
        match inner.state {
            KeepAliveState::Closed => KeepAliveAction::AlreadyClosed,
            KeepAliveState::AwaitingPong => {
                inner.state = KeepAliveState::Closed;
                KeepAliveAction::TimedOut
            }
            KeepAliveState::Idle => {
                if inner.last_activity.elapsed() >= self.interval {
                    inner.state = KeepAliveState::AwaitingPong;
                    KeepAliveAction::SendKeepAlive
                } else {
                    KeepAliveAction::None
                }
            }
        }
    }

    pub fn close(&self) {
        self.state.lock().expect("keepalive mutex poisoned").state = KeepAliveState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_stays_idle_before_interval_elapses() {
        let monitor = KeepAliveMonitor::new(Duration::from_millis(50));
        assert_eq!(monitor.tick(), KeepAliveAction::None);
        assert_eq!(monitor.state(), KeepAliveState::Idle);
    }

    #[test]
    fn idle_transitions_to_awaiting_pong_after_interval() {
        let monitor = KeepAliveMonitor::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(monitor.tick(), KeepAliveAction::SendKeepAlive);
        assert_eq!(monitor.state(), KeepAliveState::AwaitingPong);
    }

    #[test]
    fn inbound_frame_cancels_awaiting_pong() {
        let monitor = KeepAliveMonitor::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(monitor.tick(), KeepAliveAction::SendKeepAlive);
        monitor.on_inbound_frame();
        assert_eq!(monitor.state(), KeepAliveState::Idle);
    }

    #[test]
    fn unanswered_keepalive_times_out_on_next_tick() {
        let monitor = KeepAliveMonitor::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(monitor.tick(), KeepAliveAction::SendKeepAlive);
        assert_eq!(monitor.tick(), KeepAliveAction::TimedOut);
        assert_eq!(monitor.state(), KeepAliveState::Closed);
    }

    #[test]
    fn explicit_close_is_terminal() {
        let monitor = KeepAliveMonitor::new(Duration::from_millis(5));
        monitor.close();
        assert_eq!(monitor.tick(), KeepAliveAction::AlreadyClosed);
        monitor.on_inbound_frame();
        assert_eq!(monitor.state(), KeepAliveState::Closed);
    }
}
