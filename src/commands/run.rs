use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::agent::{self, FileScheduleSource, ScheduleStore, SchedulerLoop};
use crate::config::AkerConfig;
use crate::persist;
use crate::protocol::ProtocolDispatcher;
use crate::schedule::BlockedSet;

/// Run the scheduler loop and the request socket in the foreground
pub fn run(config: AkerConfig) -> Result<()> {
    println!("aker v{}", env!("CARGO_PKG_VERSION"));
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_agent(config))
}

async fn run_agent(config: AkerConfig) -> Result<()> {
    if let Some(dir) = config.schedule.data_file.parent() {
        persist::ensure_directory_exists(dir)
            .context("Failed to prepare the schedule directory")?;
    }

    info!("Schedule file: {}", config.schedule.data_file.display());
    info!("Checksum file: {}", config.schedule.checksum_file.display());

    // One store: the loop installs into it, the dispatcher answers "now" from it
    let store = Arc::new(ScheduleStore::new());
    let source = FileScheduleSource::new(&config.schedule.data_file);
    let scheduler = SchedulerLoop::new(source, store.clone(), &config.scheduler);
    let dispatcher = ProtocolDispatcher::new(store, config.schedule.clone())
        .with_reload_trigger(scheduler.reload_trigger());
    let announcements = tokio::spawn(follow_announcements(scheduler.subscribe()));

    let (trigger, shutdown) = agent::shutdown::channel();

    #[cfg(unix)]
    let server = {
        let socket = config.server.socket_path.clone();
        let dispatcher = Arc::new(dispatcher);
        let shutdown = shutdown.clone();
        let trigger = trigger.clone();
        tokio::spawn(async move {
            let result = crate::protocol::server::serve(socket, dispatcher, shutdown).await;
            if result.is_err() {
                trigger.trigger();
            }
            result
        })
    };

    #[cfg(not(unix))]
    {
        drop(dispatcher);
        tracing::warn!("Request socket is only available on Unix; serving no requests");
    }

    let signals = tokio::spawn(agent::watch_signals(trigger));

    scheduler.run(shutdown).await;

    // The loop owned the announcement sender, so the follower ends with it
    announcements.await.context("Announcement follower panicked")?;

    #[cfg(unix)]
    server
        .await
        .context("Request server panicked")?
        .context("Request server failed")?;

    if signals.is_finished() {
        signals
            .await
            .context("Signal watcher panicked")?
            .context("Failed to install signal handlers")?;
    } else {
        signals.abort();
    }

    info!("aker stopped");
    Ok(())
}

/// Follow the announced blocked set for as long as the loop runs
async fn follow_announcements(mut announced: watch::Receiver<Option<BlockedSet>>) {
    while announced.changed().await.is_ok() {
        if let Some(set) = announced.borrow_and_update().as_ref() {
            debug!("Announced blocked set ({}): [{}]", set.len(), set);
        }
    }
}
