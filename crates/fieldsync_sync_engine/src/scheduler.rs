//! Background scheduling of sync runs.
//!
//! One task waits on the periodic tick, connectivity changes, the retry
//! timer and shutdown, and starts runs through
//! [`SyncEngine::trigger_sync`]. A trigger that finds a run in flight is a
//! no-op.

use crate::remote::RemoteAdapter;
use crate::state::SyncEngine;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info};

/// Handle to a running scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler and waits for it to exit. A run in flight is
    /// allowed to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }

    /// Returns true if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<R: RemoteAdapter + 'static> SyncEngine<R> {
    /// Spawns the background scheduler on the current tokio runtime.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_scheduler(self, shutdown_rx));
        SchedulerHandle { shutdown, task }
    }
}

fn next_tick<R: RemoteAdapter>(engine: &SyncEngine<R>) -> Option<Instant> {
    engine
        .connectivity()
        .sync_interval()
        .map(|interval| Instant::now() + interval)
}

async fn run_scheduler<R: RemoteAdapter + 'static>(
    engine: Arc<SyncEngine<R>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let monitor = engine.connectivity().clone();
    let mut connectivity = monitor.subscribe();
    let mut was_online = connectivity.borrow_and_update().online;
    let mut tick_at = next_tick(&engine);
    info!(online = was_online, "sync scheduler started");

    loop {
        let retry_at = engine.retry_deadline();
        let far = Instant::now() + std::time::Duration::from_secs(60 * 60 * 24 * 365);

        tokio::select! {
            _ = shutdown.changed() => break,

            _ = sleep_until(tick_at.unwrap_or(far)), if tick_at.is_some() => {
                debug!("periodic sync tick");
                engine.trigger_sync().await;
                tick_at = next_tick(&engine);
            }

            _ = sleep_until(retry_at.unwrap_or(far)), if retry_at.is_some() => {
                debug!("retry timer fired");
                engine.clear_retry();
                engine.trigger_sync().await;
            }

            changed = connectivity.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *connectivity.borrow_and_update();
                if state.online && !was_online {
                    let stabilization = monitor.config().stabilization;
                    debug!(?stabilization, "back online, waiting to stabilize");
                    sleep(stabilization).await;
                    if monitor.is_online() {
                        info!("reconnected, starting full sync");
                        engine.trigger_sync().await;
                    }
                }
                was_online = monitor.is_online();
                tick_at = next_tick(&engine);
            }

            _ = engine.schedule_changed.notified() => {}
        }
    }
    info!("sync scheduler stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectivityConfig, SyncConfig};
    use crate::memory::MemoryRemote;
    use fieldsync_core::LocalStore;
    use fieldsync_protocol::{EntityType, Payload, SyncStatus};
    use std::time::Duration;

    fn engine(online: bool) -> Arc<SyncEngine<Arc<MemoryRemote>>> {
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let config = SyncConfig::new(["inspections"])
            .with_connectivity(ConnectivityConfig::default().with_initially_online(online));
        Arc::new(SyncEngine::new(store, Arc::new(MemoryRemote::new()), config))
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_tick_runs_sync() {
        let engine = engine(true);
        let ty = EntityType::from("inspections");
        let id = engine.save_entity(&ty, Payload::new()).unwrap();
        let handle = engine.clone().start();

        sleep(Duration::from_secs(61)).await;

        assert_eq!(engine.get_entity(&ty, id).unwrap().sync_status, SyncStatus::Synced);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn no_ticks_while_offline() {
        let engine = engine(false);
        let ty = EntityType::from("inspections");
        let id = engine.save_entity(&ty, Payload::new()).unwrap();
        let handle = engine.clone().start();

        sleep(Duration::from_secs(600)).await;

        assert_eq!(engine.get_entity(&ty, id).unwrap().sync_status, SyncStatus::Pending);
        assert_eq!(engine.stats().runs_completed, 0);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_task() {
        let engine = engine(true);
        let handle = engine.start();
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
