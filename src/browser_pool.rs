//! Browser pool management
//!
//! Chrome is expensive to launch and degrades across many print jobs, so the
//! pool leases long-lived instances to renders and relaunches them on a
//! render-count and age budget. A slot that is over budget or whose CDP
//! handler has died is recycled in place at lease time; a background watchdog
//! relaunches crashed slots between leases. Each slot gets its own profile
//! directory and debugging port through the instance-id aware browser config.

use crate::{create_browser_config_with_instance_id, Config, RenderError};
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Sizing and recycling budget for the pool.
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Number of Chrome processes actually launched
    pub size: usize,
    /// Renders a slot may serve before it is relaunched
    pub max_renders_per_slot: usize,
    /// Age after which a slot is relaunched regardless of usage
    pub max_slot_age: Duration,
}

impl PoolLimits {
    /// Derive the pool shape from the render configuration.
    ///
    /// A render holds its browser for the whole print, so slots beyond the
    /// concurrency cap could never be leased; the configured pool size is
    /// clamped to `max_concurrent_renders`.
    pub fn from_config(config: &Config) -> Self {
        Self {
            size: config
                .browser_pool_size
                .min(config.max_concurrent_renders)
                .max(1),
            max_renders_per_slot: 64,
            max_slot_age: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotStatus {
    /// Waiting in the queue for a lease
    Idle,
    /// Currently owned by a render
    Leased,
    /// Relaunch failed; the watchdog retries it
    Failed,
}

/// One pooled Chrome process.
#[derive(Debug)]
pub struct BrowserSlot {
    pub id: usize,
    pub browser: Arc<Mutex<Browser>>,
    handler: tokio::task::JoinHandle<()>,
    created_at: Instant,
    last_used: Instant,
    renders_completed: usize,
    status: SlotStatus,
}

impl BrowserSlot {
    fn handler_died(&self) -> bool {
        self.handler.is_finished()
    }

    fn over_budget(&self, limits: &PoolLimits) -> bool {
        self.renders_completed >= limits.max_renders_per_slot
            || self.created_at.elapsed() > limits.max_slot_age
    }

    async fn close(self) {
        let _ = self.browser.lock().await.close().await;
        self.handler.abort();
    }
}

/// A leased browser. Dropping the lease returns the slot to the pool; the
/// semaphore permit travels with the lease, so the gate reflects renders
/// actually holding a browser.
pub struct BrowserLease {
    pub browser: Arc<Mutex<Browser>>,
    pub slot_id: usize,
    pool: Arc<BrowserPool>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        let pool = self.pool.clone();
        let slot_id = self.slot_id;

        tokio::spawn(async move {
            pool.release(slot_id).await;
        });
    }
}

pub struct BrowserPool {
    slots: Arc<Mutex<Vec<BrowserSlot>>>,
    idle: Arc<Mutex<VecDeque<usize>>>,
    lease_gate: Arc<Semaphore>,
    limits: PoolLimits,
    config: Config,
    is_shutting_down: Arc<AtomicBool>,
}

impl BrowserPool {
    pub async fn new(config: Config) -> Result<Self, RenderError> {
        let limits = PoolLimits::from_config(&config);
        let pool = Self {
            slots: Arc::new(Mutex::new(Vec::with_capacity(limits.size))),
            idle: Arc::new(Mutex::new(VecDeque::with_capacity(limits.size))),
            lease_gate: Arc::new(Semaphore::new(limits.size)),
            limits,
            config,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
        };

        pool.launch_all().await?;
        pool.spawn_watchdog();

        Ok(pool)
    }

    pub fn limits(&self) -> &PoolLimits {
        &self.limits
    }

    async fn launch_all(&self) -> Result<(), RenderError> {
        let mut slots = self.slots.lock().await;
        let mut idle = self.idle.lock().await;

        for id in 0..self.limits.size {
            // Stagger launches so profiles and ports settle
            if id > 0 {
                sleep(Duration::from_millis(500)).await;
            }

            let slot = Self::launch_slot(&self.config, id).await?;
            slots.push(slot);
            idle.push_back(id);
            info!("Browser slot {} launched", id);
        }

        info!("Browser pool ready with {} slots", slots.len());
        Ok(())
    }

    async fn launch_slot(config: &Config, id: usize) -> Result<BrowserSlot, RenderError> {
        let browser_config = create_browser_config_with_instance_id(config, Some(id));

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| RenderError::BrowserLaunchFailed(e.to_string()))?;

        // The CDP handler stream must be polled for the browser to function.
        // When it stops, the slot is recycled on the next lease or watchdog pass.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        Ok(BrowserSlot {
            id,
            browser: Arc::new(Mutex::new(browser)),
            handler: handler_task,
            created_at: Instant::now(),
            last_used: Instant::now(),
            renders_completed: 0,
            status: SlotStatus::Idle,
        })
    }

    /// Lease a browser, recycling the slot first if it is over budget or its
    /// handler has died.
    pub async fn acquire(&self) -> Result<BrowserLease, RenderError> {
        if self.is_shutting_down.load(Ordering::Relaxed) {
            return Err(RenderError::BrowserUnavailable);
        }

        let permit = self
            .lease_gate
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| RenderError::BrowserUnavailable)?;

        for _ in 0..self.limits.size {
            let slot_id = self.next_idle_slot().await?;

            match self.lease_slot(slot_id).await {
                Ok(browser) => {
                    return Ok(BrowserLease {
                        browser,
                        slot_id,
                        pool: Arc::new(self.clone()),
                        _permit: permit,
                    });
                }
                Err(e) => {
                    warn!("Browser slot {} failed to lease: {}", slot_id, e);
                    continue;
                }
            }
        }

        Err(RenderError::BrowserUnavailable)
    }

    /// The permit guarantees a slot is (or is about to be) idle, but releases
    /// run in a spawned task, so the queue can lag a returning lease by a beat.
    async fn next_idle_slot(&self) -> Result<usize, RenderError> {
        for _ in 0..50 {
            if let Some(id) = self.idle.lock().await.pop_front() {
                return Ok(id);
            }
            sleep(Duration::from_millis(10)).await;
        }

        Err(RenderError::BrowserUnavailable)
    }

    async fn lease_slot(&self, slot_id: usize) -> Result<Arc<Mutex<Browser>>, RenderError> {
        let needs_recycle = {
            let slots = self.slots.lock().await;
            let slot = slots.get(slot_id).ok_or(RenderError::BrowserUnavailable)?;
            slot.handler_died()
                || slot.status == SlotStatus::Failed
                || slot.over_budget(&self.limits)
        };

        if needs_recycle {
            info!("Recycling browser slot {} before lease", slot_id);
            if let Err(e) = self.restart_slot(slot_id).await {
                // Leave it queued; the watchdog retries between leases
                self.mark_failed(slot_id).await;
                self.idle.lock().await.push_back(slot_id);
                return Err(e);
            }
        }

        let mut slots = self.slots.lock().await;
        let slot = slots
            .get_mut(slot_id)
            .ok_or(RenderError::BrowserUnavailable)?;
        slot.status = SlotStatus::Leased;
        slot.last_used = Instant::now();
        slot.renders_completed += 1;

        Ok(slot.browser.clone())
    }

    async fn release(&self, slot_id: usize) {
        {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(slot_id) {
                Some(slot) => {
                    if slot.status == SlotStatus::Leased {
                        slot.status = SlotStatus::Idle;
                    }
                }
                None => return,
            }
        }

        self.idle.lock().await.push_back(slot_id);
    }

    async fn mark_failed(&self, slot_id: usize) {
        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(slot_id) {
            slot.status = SlotStatus::Failed;
        }
    }

    /// Relaunch a slot's Chrome process. The fresh instance is launched
    /// before the slot lock is taken; if a lease won the race in between,
    /// the fresh instance is discarded and the active slot kept.
    pub async fn restart_slot(&self, slot_id: usize) -> Result<(), RenderError> {
        let fresh = Self::launch_slot(&self.config, slot_id).await?;

        let replaced = {
            let mut slots = self.slots.lock().await;
            match slots.get_mut(slot_id) {
                Some(slot) if slot.status == SlotStatus::Leased => Err(fresh),
                Some(slot) => Ok(std::mem::replace(slot, fresh)),
                None => return Err(RenderError::BrowserUnavailable),
            }
        };

        match replaced {
            Ok(old) => {
                old.close().await;
                info!("Browser slot {} relaunched", slot_id);
            }
            Err(fresh) => fresh.close().await,
        }

        Ok(())
    }

    fn spawn_watchdog(&self) {
        let pool = Arc::new(self.clone());
        let is_shutting_down = self.is_shutting_down.clone();

        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(30));
            tick.tick().await; // skip the immediate first tick

            while !is_shutting_down.load(Ordering::Relaxed) {
                tick.tick().await;
                pool.restart_crashed_slots().await;
            }
        });
    }

    async fn restart_crashed_slots(&self) {
        let crashed: Vec<usize> = {
            let slots = self.slots.lock().await;
            slots
                .iter()
                .filter(|slot| {
                    slot.status != SlotStatus::Leased
                        && (slot.handler_died() || slot.status == SlotStatus::Failed)
                })
                .map(|slot| slot.id)
                .collect()
        };

        for slot_id in crashed {
            warn!("Watchdog relaunching browser slot {}", slot_id);
            if let Err(e) = self.restart_slot(slot_id).await {
                error!("Failed to relaunch browser slot {}: {}", slot_id, e);
            }
        }
    }

    pub async fn health_check(&self) -> Vec<SlotHealth> {
        let slots = self.slots.lock().await;

        slots
            .iter()
            .map(|slot| SlotHealth {
                id: slot.id,
                status: slot.status,
                renders_completed: slot.renders_completed,
                age: slot.created_at.elapsed(),
                idle_time: slot.last_used.elapsed(),
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        info!("Shutting down browser pool...");
        self.is_shutting_down.store(true, Ordering::Relaxed);

        // Wait for outstanding leases to drain
        for _ in 0..50 {
            if self.lease_gate.available_permits() == self.limits.size {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }

        let mut slots = self.slots.lock().await;
        for slot in slots.drain(..) {
            slot.close().await;
        }
        self.idle.lock().await.clear();

        info!("Browser pool shutdown complete");
    }

    pub async fn get_stats(&self) -> BrowserPoolStats {
        let slots = self.slots.lock().await;

        let mut idle_slots = 0;
        let mut leased_slots = 0;
        let mut failed_slots = 0;
        let mut total_renders = 0;

        for slot in slots.iter() {
            total_renders += slot.renders_completed;
            match slot.status {
                SlotStatus::Idle => idle_slots += 1,
                SlotStatus::Leased => leased_slots += 1,
                SlotStatus::Failed => failed_slots += 1,
            }
        }

        BrowserPoolStats {
            total_slots: slots.len(),
            idle_slots,
            leased_slots,
            failed_slots,
            total_renders,
        }
    }
}

impl Clone for BrowserPool {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            idle: self.idle.clone(),
            lease_gate: self.lease_gate.clone(),
            limits: self.limits.clone(),
            config: self.config.clone(),
            is_shutting_down: self.is_shutting_down.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SlotHealth {
    pub id: usize,
    pub status: SlotStatus,
    pub renders_completed: usize,
    pub age: Duration,
    pub idle_time: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserPoolStats {
    pub total_slots: usize,
    pub idle_slots: usize,
    pub leased_slots: usize,
    pub failed_slots: usize,
    pub total_renders: usize,
}
