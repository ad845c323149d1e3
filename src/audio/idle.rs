use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Single-shot disconnect timer for a guild left alone in voice.
///
/// Every arm gets a fresh token; an expiry whose token no longer matches
/// was cancelled after it fired and must be ignored.
#[derive(Debug)]
pub struct IdleTimer {
    timeout: Duration,
    token: u64,
    pending: Option<JoinHandle<()>>,
}

impl IdleTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            token: 0,
            pending: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arms the timer unless it is already running.
    pub fn arm(&mut self, on_expire: impl FnOnce(u64) + Send + 'static) {
        if self.is_armed() {
            return;
        }

        self.token += 1;
        let token = self.token;
        let timeout = self.timeout;
        debug!("⏳ Idle timer armed for {:?}", timeout);

        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            on_expire(token);
        }));
    }

    /// Returns true when a running timer was cancelled.
    pub fn cancel(&mut self) -> bool {
        self.token += 1;
        match self.pending.take() {
            Some(handle) if !handle.is_finished() => {
                handle.abort();
                debug!("⏳ Idle timer cancelled");
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Whether an expiry carrying `token` is still the live one.
    pub fn is_current(&self, token: u64) -> bool {
        token == self.token && self.pending.is_some()
    }
}

impl Drop for IdleTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }
}
