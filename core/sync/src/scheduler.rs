//! Sync loop: periodic reconciliation passes until shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use foldersync_common::{Error, Result};

use crate::activity::{ActivitySink, Operation, SyncEvent};
use crate::config::SyncConfig;
use crate::reconciler::Reconciler;

/// States of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Making sure the replica root exists.
    Initializing,
    /// A pass is running.
    Syncing,
    /// Waiting for the next pass.
    Sleeping,
    /// Terminal.
    Stopped,
}

/// Drives [`Reconciler`] passes at a fixed interval.
///
/// Exactly one pass runs at a time. The pass itself runs on the blocking
/// pool; the loop waits for it before doing anything else.
pub struct SyncLoop {
    reconciler: Arc<Reconciler>,
    config: SyncConfig,
    activity: Arc<dyn ActivitySink>,
    cancel: CancellationToken,
    state: watch::Sender<LoopState>,
}

impl SyncLoop {
    /// Create a loop for `config`. Cancelling `cancel` stops it.
    pub fn new(
        config: SyncConfig,
        activity: Arc<dyn ActivitySink>,
        cancel: CancellationToken,
    ) -> Self {
        let reconciler = Reconciler::new(&config.source, &config.replica, activity.clone());
        let (state, _) = watch::channel(LoopState::Initializing);

        Self {
            reconciler: Arc::new(reconciler),
            config,
            activity,
            cancel,
            state,
        }
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<LoopState> {
        self.state.subscribe()
    }

    /// Token that stops the loop when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until cancelled.
    ///
    /// Returns the number of passes that ran to completion.
    ///
    /// # Errors
    /// - The replica root cannot be created
    /// - A pass task panicked
    pub async fn run(self) -> Result<usize> {
        self.set_state(LoopState::Initializing);
        self.activity.record(&SyncEvent::Started {
            source: self.config.source.clone(),
            replica: self.config.replica.clone(),
            interval: self.config.interval,
        });

        let result = self.run_inner().await;

        self.set_state(LoopState::Stopped);
        self.activity.record(&SyncEvent::Stopped);
        info!("Sync loop stopped");
        result
    }

    async fn run_inner(&self) -> Result<usize> {
        match self.reconciler.ensure_replica_root() {
            Ok(event) => self.activity.record(&event),
            Err(e) => {
                error!("Cannot prepare replica {}: {}", self.config.replica.display(), e);
                self.activity.record(&SyncEvent::OperationFailed {
                    operation: Operation::CreateDirectory,
                    path: None,
                    error: e.to_string(),
                });
                return Err(e);
            }
        }

        let mut passes = 0;
        while !self.cancel.is_cancelled() {
            self.set_state(LoopState::Syncing);

            let reconciler = self.reconciler.clone();
            let token = self.cancel.clone();
            let report = tokio::task::spawn_blocking(move || reconciler.run_pass(&token))
                .await
                .map_err(|e| Error::Task(e.to_string()))?;

            if report.interrupted {
                self.activity.record(&SyncEvent::PassInterrupted(report));
                break;
            }
            passes += 1;
            self.activity.record(&SyncEvent::PassCompleted(report));

            self.set_state(LoopState::Sleeping);
            debug!("Sleeping for {:?}", self.config.interval);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        Ok(passes)
    }

    fn set_state(&self, state: LoopState) {
        debug!("Sync loop state: {:?}", state);
        self.state.send_replace(state);
    }
}
