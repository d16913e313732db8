//! Monotonic clock and readiness polling

use crate::error::{ComposeError, Result};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary fixed origin
    fn now(&self) -> Duration;
    /// Block for `duration`
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll `check` until it succeeds or `timeout` elapses
///
/// Sleeps a constant `pause` between attempts. Fails with
/// [`ComposeError::TimeoutExceeded`] only once the elapsed time has reached
/// `timeout`.
pub fn wait_until_responsive<F>(
    clock: &dyn Clock,
    mut check: F,
    timeout: Duration,
    pause: Duration,
) -> Result<()>
where
    F: FnMut() -> bool,
{
    let start = clock.now();
    let mut attempts = 0u32;
    while clock.now().saturating_sub(start) < timeout {
        attempts += 1;
        if check() {
            tracing::debug!("Service responsive after {} attempt(s)", attempts);
            return Ok(());
        }
        clock.sleep(pause);
    }

    Err(ComposeError::TimeoutExceeded(format!(
        "no success after {} attempt(s) within {:?}",
        attempts, timeout
    )))
}

/// Whether a TCP connection to `host:port` can be opened within `timeout`
pub fn tcp_check(host: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::debug!("Failed to resolve {}:{}: {}", host, port, e);
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::Cell;
    use std::net::TcpListener;

    /// Clock that only moves when slept on
    #[derive(Debug, Default)]
    pub(crate) struct ManualClock {
        now: Cell<Duration>,
    }

    impl Clock for ManualClock {
        fn now(&self) -> Duration {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.now.set(self.now.get() + duration);
        }
    }

    #[test]
    fn test_succeeds_before_timeout() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let result = wait_until_responsive(
            &clock,
            || {
                calls += 1;
                calls == 4
            },
            Duration::from_secs(10),
            Duration::from_secs(1),
        );
        assert!(result.is_ok());
        assert_eq!(calls, 4);
        assert_eq!(clock.now(), Duration::from_secs(3));
    }

    #[test]
    fn test_times_out_only_after_deadline() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let result = wait_until_responsive(
            &clock,
            || {
                calls += 1;
                false
            },
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        assert!(matches!(result, Err(ComposeError::TimeoutExceeded(_))));
        // checked at t=0, 2 and 4; gave up at t=6
        assert_eq!(calls, 3);
        assert!(clock.now() >= Duration::from_secs(5));
    }

    #[test]
    fn test_last_attempt_just_before_deadline() {
        let clock = ManualClock::default();
        let mut calls = 0;
        let result = wait_until_responsive(
            &clock,
            || {
                calls += 1;
                clock.now() == Duration::from_millis(900)
            },
            Duration::from_secs(1),
            Duration::from_millis(300),
        );
        assert!(result.is_ok());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_zero_timeout_never_checks() {
        let clock = ManualClock::default();
        let result = wait_until_responsive(&clock, || true, Duration::ZERO, Duration::from_secs(1));
        assert!(matches!(result, Err(ComposeError::TimeoutExceeded(_))));
    }

    #[test]
    fn test_tcp_check() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(tcp_check("127.0.0.1", port, Duration::from_secs(1)));

        drop(listener);
        assert!(!tcp_check("invalid host name", port, Duration::from_millis(100)));
    }
}
