//! # Periodic Publisher
//!
//! Runs a tick at a fixed period until stopped.
//!
//! - A failing or panicking tick is logged and counted; the loop keeps
//!   going. Halting the command stream to a physical actuator is itself
//!   unsafe.
//! - `degraded_after` consecutive failures flip health to `Degraded`; the
//!   next success flips it back. Both transitions go to the health callback.
//! - After [`PeriodicPublisher::stop`] returns no new tick begins. A tick
//!   already running is allowed to finish; `stop` waits for it.
//! - The stop signal is raised before `stop` first suspends. A `stop` future
//!   dropped early still ends the loop, and the loop stays registered until
//!   it has exited, so `start` cannot spawn a second one alongside it.

use futures::FutureExt;
use link_types::LinkError;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Health of the periodic stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherHealth {
    Healthy,
    Degraded { consecutive_failures: u64 },
}

/// Invoked on every health transition.
pub type HealthCallback = Arc<dyn Fn(PublisherHealth) + Send + Sync>;

#[derive(Default)]
struct Counters {
    ticks: AtomicU64,
    failures: AtomicU64,
    consecutive: AtomicU64,
    degraded: AtomicBool,
}

struct Running {
    handle: JoinHandle<()>,
    /// Held for the duration of each tick.
    gate: Arc<tokio::sync::Mutex<()>>,
    stop: watch::Sender<bool>,
}

pub struct PeriodicPublisher {
    name: String,
    degraded_after: u64,
    counters: Arc<Counters>,
    on_health: Option<HealthCallback>,
    running: Mutex<Option<Running>>,
}

impl PeriodicPublisher {
    pub fn new(name: impl Into<String>, degraded_after: u64) -> Self {
        Self {
            name: name.into(),
            degraded_after: degraded_after.max(1),
            counters: Arc::new(Counters::default()),
            on_health: None,
            running: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_health_callback(mut self, callback: HealthCallback) -> Self {
        self.on_health = Some(callback);
        self
    }

    /// Start invoking `tick` every `interval`. The first tick fires
    /// immediately.
    ///
    /// Returns `Ok(false)` without side effects if already running.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` for a zero interval or when called outside a Tokio
    /// runtime.
    pub fn start<F, Fut>(&self, interval: Duration, mut tick: F) -> Result<bool, LinkError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), LinkError>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(LinkError::InvalidRequest("interval must be positive".into()));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LinkError::InvalidRequest("periodic publisher needs a Tokio runtime".into())
        })?;

        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!(publisher = %self.name, "Already running");
            return Ok(false);
        }

        let gate = Arc::new(tokio::sync::Mutex::new(()));
        let loop_gate = gate.clone();
        let (stop, mut stop_rx) = watch::channel(false);
        let counters = self.counters.clone();
        let on_health = self.on_health.clone();
        let name = self.name.clone();
        let degraded_after = self.degraded_after;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                let open = loop_gate.lock().await;
                if *stop_rx.borrow() {
                    break;
                }
                let outcome = AssertUnwindSafe(async { tick().await })
                    .catch_unwind()
                    .await;
                drop(open);

                counters.ticks.fetch_add(1, Ordering::Relaxed);
                match outcome {
                    Ok(Ok(())) => on_success(&name, &counters, on_health.as_ref()),
                    Ok(Err(e)) => on_failure(
                        &name,
                        &counters,
                        degraded_after,
                        on_health.as_ref(),
                        &e.to_string(),
                    ),
                    Err(_) => on_failure(
                        &name,
                        &counters,
                        degraded_after,
                        on_health.as_ref(),
                        "tick panicked",
                    ),
                }
            }
            debug!(publisher = %name, "Periodic loop exited");
        });

        *running = Some(Running { handle, gate, stop });
        info!(
            publisher = %self.name,
            interval_us = interval.as_micros() as u64,
            "Periodic publisher started"
        );
        Ok(true)
    }

    /// Stop the loop. Waits for an in-flight tick, then guarantees no
    /// further tick begins. Returns `false` if no loop was registered.
    ///
    /// If this future is dropped before completing, the loop still exits
    /// after its current tick; a later `stop` finishes the cleanup.
    pub async fn stop(&self) -> bool {
        let gate = {
            let running = self.running.lock();
            let Some(r) = running.as_ref() else {
                return false;
            };
            r.stop.send_replace(true);
            r.gate.clone()
        };

        // Any tick that began before the signal finishes here.
        drop(gate.lock().await);

        let finished = {
            let mut running = self.running.lock();
            match running.as_ref() {
                Some(r) if Arc::ptr_eq(&r.gate, &gate) => running.take(),
                _ => None,
            }
        };
        if let Some(r) = finished {
            r.handle.abort();
            let _ = r.handle.await;
            info!(publisher = %self.name, "Periodic publisher stopped");
        }
        true
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Ticks invoked since creation, successful or not.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.counters.ticks.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.counters.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u64 {
        self.counters.consecutive.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn health(&self) -> PublisherHealth {
        if self.counters.degraded.load(Ordering::Relaxed) {
            PublisherHealth::Degraded {
                consecutive_failures: self.consecutive_failures(),
            }
        } else {
            PublisherHealth::Healthy
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PeriodicPublisher {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.stop.send_replace(true);
            running.handle.abort();
        }
    }
}

fn on_success(name: &str, counters: &Counters, on_health: Option<&HealthCallback>) {
    counters.consecutive.store(0, Ordering::Relaxed);
    if counters.degraded.swap(false, Ordering::Relaxed) {
        info!(publisher = %name, "Periodic publisher recovered");
        if let Some(cb) = on_health {
            cb(PublisherHealth::Healthy);
        }
    }
}

fn on_failure(
    name: &str,
    counters: &Counters,
    degraded_after: u64,
    on_health: Option<&HealthCallback>,
    reason: &str,
) {
    counters.failures.fetch_add(1, Ordering::Relaxed);
    let consecutive = counters.consecutive.fetch_add(1, Ordering::Relaxed) + 1;
    warn!(publisher = %name, consecutive, error = %reason, "Periodic tick failed");

    if consecutive >= degraded_after && !counters.degraded.swap(true, Ordering::Relaxed) {
        error!(publisher = %name, consecutive, "Periodic publisher degraded");
        if let Some(cb) = on_health {
            cb(PublisherHealth::Degraded {
                consecutive_failures: consecutive,
            });
        }
    }
}
