//! Janitor: background reclaim of expired leases.
//!
//! A crashed or partitioned worker never reports an outcome; its lease runs
//! out and the sweep here puts the item back in the eligible pool. Run the
//! interval at half the lease duration or less to bound how long a stranded
//! item stays invisible.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::db::Db;
use crate::error::Result;

/// The janitor loop. Clone is cheap; hand a clone to a shutdown task.
pub struct Janitor {
    db: Arc<Db>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Clone for Janitor {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            interval: self.interval,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Janitor {
    pub fn new(db: Arc<Db>, interval: Duration) -> Self {
        Self {
            db,
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the janitor to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// One sweep: requeue everything whose lease expired.
    pub async fn run_once(&self) -> Result<u64> {
        let count = self.db.reclaim_expired().await?;
        if count > 0 {
            info!(count, "reclaimed expired leases");
        }
        Ok(count)
    }

    /// Run sweeps on the configured interval until shutdown.
    pub async fn run(&self) -> Result<()> {
        info!(interval_secs = self.interval.as_secs(), "janitor started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("janitor shutting down");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            // A failed sweep is retried on the next tick, not fatal.
            if let Err(e) = self.run_once().await {
                error!("reclaim sweep error: {e}");
            }
        }
    }
}
