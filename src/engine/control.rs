use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long a suspended loop sleeps before re-checking its flags. Bounds
/// the latency between a pause/stop request and the loop observing it.
pub const PAUSE_POLL: Duration = Duration::from_secs(10);

/// Run state of one account's loops. `Stopped` is sticky: pause/resume
/// are ignored once an account has been stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

/// Cooperative cancellation/pause handle shared by an account's follow
/// loop, claim scheduler, and the lifecycle manager.
#[derive(Clone)]
pub struct Control {
    tx: Arc<watch::Sender<RunState>>,
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl Control {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(RunState::Running);
        Self { tx: Arc::new(tx) }
    }

    pub fn state(&self) -> RunState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.tx.subscribe()
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == RunState::Stopped
    }

    pub fn pause(&self) {
        self.tx.send_modify(|s| {
            if *s == RunState::Running {
                *s = RunState::Paused;
            }
        });
    }

    pub fn resume(&self) {
        self.tx.send_modify(|s| {
            if *s == RunState::Paused {
                *s = RunState::Running;
            }
        });
    }

    pub fn stop(&self) {
        self.tx.send_modify(|s| *s = RunState::Stopped);
    }
}

/// Block while the account (or the whole process) is paused, polling every
/// [`PAUSE_POLL`]. Returns `false` once the account is stopped.
pub async fn wait_while_paused(control: &Control, global_pause: &watch::Receiver<bool>) -> bool {
    loop {
        match control.state() {
            RunState::Stopped => return false,
            RunState::Running if !*global_pause.borrow() => return true,
            _ => {}
        }
        tokio::time::sleep(PAUSE_POLL).await;
    }
}

/// Resolve once the control transitions to `Stopped` (or the sender side
/// goes away). Used by timers that select between a sleep and shutdown.
pub async fn stopped(rx: &mut watch::Receiver<RunState>) {
    if *rx.borrow() == RunState::Stopped {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() == RunState::Stopped {
            return;
        }
    }
    // Sender dropped: the account handle is gone, treat as stopped.
}
