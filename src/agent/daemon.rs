use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::time::sleep;

use super::{
    ChangeDetector, LoadOutcome, Observation, ScheduleLoader, ScheduleSource, ScheduleStore,
    Shutdown,
};
use crate::config::SchedulerSettings;
use crate::error::AkerError;
use crate::schedule::BlockedSet;

/// Where the loop currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Reloading,
    Evaluating,
    Sleeping,
}

/// Summary of one pass through the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Outcome of the reload step; `None` when it failed
    pub load: Option<LoadOutcome>,
    /// Blocked-set observation; `None` when no schedule was active
    pub observation: Option<Observation>,
}

/// Periodic driver: reloads the schedule, evaluates it and announces changes
pub struct SchedulerLoop<S> {
    loader: ScheduleLoader<S>,
    store: Arc<ScheduleStore>,
    detector: ChangeDetector,
    interval: Duration,
    no_change_log_period: u32,
    quiet_cycles: u32,
    state: LoopState,
    reload: Arc<Notify>,
    announced: watch::Sender<Option<BlockedSet>>,
}

impl<S: ScheduleSource> SchedulerLoop<S> {
    pub fn new(source: S, store: Arc<ScheduleStore>, settings: &SchedulerSettings) -> Self {
        let (announced, _) = watch::channel(None);

        Self {
            loader: ScheduleLoader::new(source),
            store,
            detector: ChangeDetector::new(),
            interval: settings.interval(),
            no_change_log_period: settings.no_change_log_period.max(1),
            quiet_cycles: 0,
            state: LoopState::Idle,
            reload: Arc::new(Notify::new()),
            announced,
        }
    }

    /// Override the pause between cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    fn enter(&mut self, state: LoopState) {
        tracing::trace!("Scheduler {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Handle that cuts the current sleep short
    pub fn reload_trigger(&self) -> Arc<Notify> {
        self.reload.clone()
    }

    /// Follow the announced blocked set
    pub fn subscribe(&self) -> watch::Receiver<Option<BlockedSet>> {
        self.announced.subscribe()
    }

    /// One pass: version check, reload, then evaluation with the newest schedule
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        self.enter(LoopState::Reloading);
        let load = match self.loader.poll(&self.store).await {
            Ok(outcome) => Some(outcome),
            Err(e @ AkerError::DecodeFailure(_)) => {
                tracing::error!("Failed to decode schedule, no schedule is active: {}", e);
                None
            }
            Err(e) => {
                tracing::error!("Failed to reload schedule: {}", e);
                None
            }
        };

        self.enter(LoopState::Evaluating);
        let observation = match self.store.evaluate_active(now).await {
            Some(blocked) => Some(self.announce(blocked)),
            None => None,
        };

        self.enter(LoopState::Idle);
        CycleReport { load, observation }
    }

    fn announce(&mut self, blocked: BlockedSet) -> Observation {
        let observation = self.detector.observe(blocked);

        match &observation {
            Observation::Changed(set) => {
                self.quiet_cycles = 0;
                tracing::info!("Blocked devices changed ({}): [{}]", set.len(), set);
                self.announced.send_replace(Some(set.clone()));
            }
            Observation::Unchanged => {
                if self.quiet_cycles % self.no_change_log_period == 0 {
                    tracing::debug!("No change in blocked devices");
                }
                self.quiet_cycles = self.quiet_cycles.wrapping_add(1);
            }
        }

        observation
    }

    /// Run until `shutdown` fires, then release the active schedule
    pub async fn run(mut self, mut shutdown: Shutdown) {
        tracing::info!(
            "Starting scheduler loop (interval: {} seconds)",
            self.interval.as_secs_f64()
        );

        while !shutdown.is_triggered() {
            self.run_cycle(Utc::now()).await;

            self.enter(LoopState::Sleeping);
            tokio::select! {
                _ = shutdown.wait() => {}
                _ = sleep(self.interval) => {}
                _ = self.reload.notified() => {
                    tracing::debug!("Reload requested, waking early");
                }
            }
            self.enter(LoopState::Idle);
        }

        self.store.clear().await;
        self.detector.reset();
        tracing::info!("Scheduler loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::loader::tests::{BROKEN, MemorySource, OTHER, VALID};
    use crate::agent::shutdown;
    use chrono::TimeZone;

    fn nine_am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    fn six_pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 18, 0, 0).unwrap()
    }

    fn scheduler() -> (Arc<MemorySource>, Arc<ScheduleStore>, SchedulerLoop<Arc<MemorySource>>) {
        let source = Arc::new(MemorySource::default());
        let store = Arc::new(ScheduleStore::new());
        let scheduler = SchedulerLoop::new(source.clone(), store.clone(), &SchedulerSettings::default());
        (source, store, scheduler)
    }

    #[tokio::test]
    async fn test_cycle_without_schedule_skips_evaluation() {
        let (_source, _store, mut scheduler) = scheduler();

        let report = scheduler.run_cycle(nine_am()).await;

        assert_eq!(report.load, Some(LoadOutcome::NoUpdate));
        assert!(report.observation.is_none());
        assert_eq!(scheduler.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn test_daily_block_is_announced_and_lifted() {
        let (source, _store, mut scheduler) = scheduler();
        let announced = scheduler.subscribe();
        source.set(1, VALID);

        let report = scheduler.run_cycle(nine_am()).await;
        assert_eq!(report.load, Some(LoadOutcome::Installed { version: 1 }));
        match report.observation {
            Some(Observation::Changed(set)) => assert_eq!(set.canonical(), "AA:BB:CC:DD:EE:FF"),
            other => panic!("unexpected observation: {:?}", other),
        }
        assert_eq!(
            announced.borrow().as_ref().map(BlockedSet::canonical),
            Some("AA:BB:CC:DD:EE:FF".to_string())
        );

        let report = scheduler.run_cycle(nine_am()).await;
        assert_eq!(report.load, Some(LoadOutcome::NoUpdate));
        assert_eq!(report.observation, Some(Observation::Unchanged));

        let report = scheduler.run_cycle(six_pm()).await;
        assert_eq!(report.observation, Some(Observation::Changed(BlockedSet::new())));
        assert_eq!(
            announced.borrow().as_ref().map(BlockedSet::canonical),
            Some(String::new())
        );
    }

    #[tokio::test]
    async fn test_reload_precedes_evaluation_in_same_cycle() {
        let (source, _store, mut scheduler) = scheduler();

        source.set(1, VALID);
        scheduler.run_cycle(nine_am()).await;

        // OTHER blocks 11:22:33:44:55:66 all day; the new schedule must be used right away
        source.set(2, OTHER);
        let report = scheduler.run_cycle(nine_am()).await;
        assert_eq!(report.load, Some(LoadOutcome::Installed { version: 2 }));
        match report.observation {
            Some(Observation::Changed(set)) => assert_eq!(set.canonical(), "11:22:33:44:55:66"),
            other => panic!("unexpected observation: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_decode_failure_is_recovered() {
        let (source, store, mut scheduler) = scheduler();

        source.set(1, VALID);
        scheduler.run_cycle(nine_am()).await;

        source.set(2, BROKEN);
        let report = scheduler.run_cycle(nine_am()).await;
        assert!(report.load.is_none());
        assert!(report.observation.is_none());
        assert!(!store.is_active().await);

        source.set(3, VALID);
        let report = scheduler.run_cycle(nine_am()).await;
        assert_eq!(report.load, Some(LoadOutcome::Installed { version: 3 }));
        // Same set as before the broken file, so nothing new to announce
        assert_eq!(report.observation, Some(Observation::Unchanged));
    }

    #[tokio::test]
    async fn test_run_stops_promptly_on_shutdown() {
        let (source, store, scheduler) = scheduler();
        source.set(1, VALID);

        // Interval far longer than the test timeout; shutdown must cut the sleep short
        let scheduler = scheduler.with_interval(Duration::from_secs(3600));
        let (trigger, token) = shutdown::channel();
        let handle = tokio::spawn(scheduler.run(token));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_active().await);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(!store.is_active().await);
    }

    #[tokio::test]
    async fn test_reload_trigger_wakes_sleep() {
        let (source, store, scheduler) = scheduler();
        let scheduler = scheduler.with_interval(Duration::from_secs(3600));
        let reload = scheduler.reload_trigger();
        let (trigger, token) = shutdown::channel();
        let handle = tokio::spawn(scheduler.run(token));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.is_active().await);

        source.set(1, VALID);
        reload.notify_one();

        let mut installed = false;
        for _ in 0..40 {
            if store.is_active().await {
                installed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert!(installed, "reload trigger did not wake the loop");

        trigger.trigger();
        handle.await.unwrap();
    }
}
