//! Thin wrapper around systemd sd_notify integration.
//!
//! All functions are no-ops when `enabled` is false or on non-Linux platforms,
//! so the sync loop stays free of `#[cfg]` conditionals.

#[derive(Debug, Clone, Copy)]
enum Message<'a> {
    Ready,
    Stopping,
    Status(&'a str),
    Watchdog,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct SystemdNotifier {
    enabled: bool,
}

impl SystemdNotifier {
    pub(crate) fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// `READY=1`: storage opened and the instance lock is held.
    pub(crate) fn notify_ready(&self) {
        self.send(Message::Ready);
    }

    pub(crate) fn notify_stopping(&self) {
        self.send(Message::Stopping);
    }

    /// `STATUS=<msg>`, shown by `systemctl status`.
    pub(crate) fn notify_status(&self, msg: &str) {
        self.send(Message::Status(msg));
    }

    /// `WATCHDOG=1` keepalive, sent once per loop iteration.
    pub(crate) fn notify_watchdog(&self) {
        self.send(Message::Watchdog);
    }

    fn send(&self, message: Message<'_>) {
        if !self.enabled {
            return;
        }
        send_impl(message);
    }
}

#[cfg(target_os = "linux")]
fn send_impl(message: Message<'_>) {
    use sd_notify::NotifyState;

    let state = match message {
        Message::Ready => NotifyState::Ready,
        Message::Stopping => NotifyState::Stopping,
        Message::Status(msg) => NotifyState::Status(msg),
        Message::Watchdog => NotifyState::Watchdog,
    };
    if let Err(e) = sd_notify::notify(false, &[state]) {
        tracing::debug!(error = %e, ?message, "sd_notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn send_impl(_message: Message<'_>) {}
