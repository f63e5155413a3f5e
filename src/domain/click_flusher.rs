//! Periodic transfer of volatile click counters into the durable store.
//!
//! Each cycle walks the counter keyspace page by page, atomically extracts
//! and clears every counter, and adds the extracted delta to the durable
//! `click_count`. If the durable update fails after extraction the delta is
//! lost for good; this is logged as [`CounterLost`] and the cycle moves on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, warn};

use crate::domain::repositories::{LinkRepository, StoreError};
use crate::infrastructure::cache::CacheService;

/// Lifecycle state of a [`ClickFlusher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlusherState {
    Idle,
    Scanning,
    Extracting,
    Merging,
    Stopped,
}

impl fmt::Display for FlusherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Extracting => "extracting",
            Self::Merging => "merging",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// A delta that was cleared from the cache but never reached the durable store.
#[derive(Debug, thiserror::Error)]
#[error("lost {delta} click(s) for '{code}': {reason}")]
pub struct CounterLost {
    pub code: String,
    pub delta: i64,
    pub reason: String,
}

/// Outcome of a single flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Counter keys returned by the scan.
    pub keys_scanned: usize,
    /// Keys whose delta was merged into the durable store.
    pub keys_flushed: usize,
    /// Sum of merged deltas.
    pub clicks_flushed: i64,
    /// Keys whose delta was extracted but could not be merged.
    pub keys_lost: usize,
    /// Sum of lost deltas.
    pub clicks_lost: i64,
    /// Keys whose extraction timed out. The counter may have been cleared
    /// without its delta being known, so those clicks may be lost.
    pub keys_uncertain: usize,
    /// True if the walk stopped before the cursor wrapped around.
    pub aborted: bool,
}

/// Tuning for [`ClickFlusher`].
#[derive(Debug, Clone, Copy)]
pub struct FlusherSettings {
    pub interval: Duration,
    pub batch_size: usize,
    pub store_timeout: Duration,
}

impl Default for FlusherSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            batch_size: 100,
            store_timeout: Duration::from_secs(5),
        }
    }
}

enum KeyOutcome {
    Empty,
    Flushed(i64),
    Lost(CounterLost),
    Uncertain,
}

/// Background process that drains volatile counters into the durable store.
///
/// The flusher never locks a code; it relies on the cache's atomic
/// extract-and-clear and the store's atomic increment.
pub struct ClickFlusher<L: LinkRepository> {
    cache: Arc<dyn CacheService>,
    links: Arc<L>,
    settings: FlusherSettings,
    stop_tx: watch::Sender<bool>,
    state_tx: watch::Sender<FlusherState>,
}

impl<L: LinkRepository> ClickFlusher<L> {
    pub fn new(cache: Arc<dyn CacheService>, links: Arc<L>, settings: FlusherSettings) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (state_tx, _) = watch::channel(FlusherState::Idle);

        Self {
            cache,
            links,
            settings,
            stop_tx,
            state_tx,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FlusherState {
        *self.state_tx.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<FlusherState> {
        self.state_tx.subscribe()
    }

    /// Requests the run loop to stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    fn is_stopping(&self, shutdown: &watch::Receiver<bool>) -> bool {
        *self.stop_tx.borrow() || *shutdown.borrow()
    }

    /// Runs flush cycles on a fixed interval until `shutdown` turns `true`,
    /// its sender is dropped, or [`Self::stop`] is called.
    ///
    /// The first cycle runs one full interval after the call.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut stop = self.stop_tx.subscribe();
        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            batch_size = self.settings.batch_size,
            "Click flusher started"
        );

        while !self.is_stopping(&shutdown) {
            let due = tokio::select! {
                _ = ticker.tick() => true,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        debug!("Click flusher shutdown sender dropped");
                        break;
                    }
                    false
                }
                _ = stop.changed() => false,
            };

            if due {
                let report = self.flush_cycle(Some(&shutdown)).await;
                log_report(&report);
            }
        }

        self.state_tx.send_replace(FlusherState::Stopped);
        info!("Click flusher stopped");
    }

    /// Runs one full cycle over the counter keyspace.
    pub async fn flush_once(&self) -> FlushReport {
        self.flush_cycle(None).await
    }

    async fn flush_cycle(&self, shutdown: Option<&watch::Receiver<bool>>) -> FlushReport {
        let mut report = FlushReport::default();
        let mut cursor = 0u64;

        'walk: loop {
            self.state_tx.send_replace(FlusherState::Scanning);

            let page = timeout(
                self.settings.store_timeout,
                self.cache.scan_click_codes(cursor, self.settings.batch_size),
            )
            .await;

            let (next_cursor, codes) = match page {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(cursor, error = %e, "Click counter scan failed, retrying next tick");
                    report.aborted = true;
                    break;
                }
                Err(_) => {
                    warn!(cursor, "Click counter scan timed out, retrying next tick");
                    report.aborted = true;
                    break;
                }
            };

            report.keys_scanned += codes.len();

            for code in codes {
                if shutdown.is_some_and(|rx| self.is_stopping(rx)) {
                    debug!("Flush cycle interrupted by shutdown");
                    report.aborted = true;
                    break 'walk;
                }

                match self.flush_key(&code).await {
                    KeyOutcome::Empty => {}
                    KeyOutcome::Flushed(delta) => {
                        report.keys_flushed += 1;
                        report.clicks_flushed += delta;
                    }
                    KeyOutcome::Lost(lost) => {
                        error!(code = %lost.code, delta = lost.delta, error = %lost, "Click delta lost");
                        report.keys_lost += 1;
                        report.clicks_lost += lost.delta;
                    }
                    KeyOutcome::Uncertain => {
                        error!(code = %code, "Click counter extraction timed out, delta may be lost");
                        report.keys_uncertain += 1;
                    }
                }
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        metrics::counter!("linkcache_clicks_flushed_total").increment(report.clicks_flushed as u64);
        metrics::counter!("linkcache_clicks_lost_total").increment(report.clicks_lost as u64);
        metrics::counter!("linkcache_click_extractions_uncertain_total")
            .increment(report.keys_uncertain as u64);

        self.state_tx.send_replace(FlusherState::Idle);
        report
    }

    async fn flush_key(&self, code: &str) -> KeyOutcome {
        self.state_tx.send_replace(FlusherState::Extracting);

        let delta = match timeout(self.settings.store_timeout, self.cache.take_clicks(code)).await {
            Ok(Ok(Some(delta))) if delta > 0 => delta,
            Ok(Ok(_)) => return KeyOutcome::Empty,
            Ok(Err(e)) => {
                warn!(code = %code, error = %e, "Failed to extract click counter");
                return KeyOutcome::Empty;
            }
            // The extraction may still have run server-side.
            Err(_) => return KeyOutcome::Uncertain,
        };

        self.state_tx.send_replace(FlusherState::Merging);

        let merged = timeout(
            self.settings.store_timeout,
            self.links.increment_clicks(code, delta),
        )
        .await;

        match merged {
            Ok(Ok(true)) => {
                debug!(code = %code, delta, "Merged click delta");
                KeyOutcome::Flushed(delta)
            }
            Ok(Ok(false)) => KeyOutcome::Lost(CounterLost {
                code: code.to_string(),
                delta,
                reason: "no durable link with this code".to_string(),
            }),
            Ok(Err(e)) => KeyOutcome::Lost(lost(code, delta, &e)),
            Err(_) => KeyOutcome::Lost(CounterLost {
                code: code.to_string(),
                delta,
                reason: format!("timed out after {:?}", self.settings.store_timeout),
            }),
        }
    }
}

fn lost(code: &str, delta: i64, error: &StoreError) -> CounterLost {
    CounterLost {
        code: code.to_string(),
        delta,
        reason: error.to_string(),
    }
}

fn log_report(report: &FlushReport) {
    if report.keys_scanned == 0 && !report.aborted {
        debug!("Flush cycle found no click counters");
        return;
    }

    info!(
        keys_scanned = report.keys_scanned,
        keys_flushed = report.keys_flushed,
        clicks_flushed = report.clicks_flushed,
        keys_lost = report.keys_lost,
        clicks_lost = report.clicks_lost,
        keys_uncertain = report.keys_uncertain,
        aborted = report.aborted,
        "Flush cycle finished"
    );
}
