use tokio::sync::watch;
use tracing::info;

/// Create a linked shutdown trigger and token
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

/// Requests shutdown of every linked `Shutdown` token
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }
}

/// Cancellation token observed by long-running tasks
///
/// Dropping every trigger also counts as a shutdown request.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Wait until shutdown is requested
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Trigger shutdown on the first termination signal
///
/// SIGINT, SIGTERM, SIGQUIT and SIGHUP stop the agent. SIGUSR1, SIGUSR2 and
/// SIGALRM are logged and otherwise ignored. Fault signals (SIGSEGV, SIGBUS,
/// SIGILL, SIGFPE) keep their default action and terminate the process.
#[cfg(unix)]
pub async fn watch_signals(trigger: ShutdownTrigger) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut user2 = signal(SignalKind::user_defined2())?;
    let mut alarm = signal(SignalKind::alarm())?;

    let name = loop {
        tokio::select! {
            _ = interrupt.recv() => break "SIGINT",
            _ = terminate.recv() => break "SIGTERM",
            _ = quit.recv() => break "SIGQUIT",
            _ = hangup.recv() => break "SIGHUP",
            _ = user1.recv() => info!("SIGUSR1 received"),
            _ = user2.recv() => info!("SIGUSR2 received"),
            _ = alarm.recv() => info!("SIGALRM received"),
        }
    };

    info!("{} received, shutting down", name);
    trigger.trigger();
    Ok(())
}

#[cfg(not(unix))]
pub async fn watch_signals(trigger: ShutdownTrigger) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received, shutting down");
    trigger.trigger();
    Ok(())
}
