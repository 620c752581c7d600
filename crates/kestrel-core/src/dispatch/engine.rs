//! Engine assembly and lifecycle.
//!
//! [`Engine::start`] builds every shared structure from configuration,
//! spawns the pinned dispatcher and worker threads, and hands back the
//! engine handle together with the [`IngressCourier`] the caller feeds
//! packets through. All state is owned here; nothing global.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::core::config::{Config, PolicyConfig};
use crate::dispatch::dispatcher::{Dispatcher, DispatcherSetup};
use crate::dispatch::egress::EgressSink;
use crate::dispatch::occupancy::{EngineStats, Occupancy, StatsSnapshot};
use crate::dispatch::policy::QueuePolicy;
use crate::dispatch::preempt::PreemptLines;
use crate::dispatch::queue::TaskQueues;
use crate::dispatch::slots::SlotArray;
use crate::dispatch::worker::WorkerCore;
use crate::dispatch::workload::Workload;
use crate::ingress::IngressCourier;
use crate::structures::handoff::IngressHandoff;
use crate::structures::pool::{ContextBudget, RequestPool};
use crate::system::affinity::pin_current_thread;
use crate::system::clock::Clock;
use crate::types::error::ConfigError;
use crate::types::ids::{QueueId, WorkerMap};

/// A running engine: one dispatcher core plus one core per roster entry.
pub struct Engine {
    shutdown: Arc<AtomicBool>,
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    occupancy: Arc<Occupancy>,
    stats: Arc<EngineStats>,
}

impl Engine {
    /// Build and start the engine. Returns the handle and the ingress
    /// courier the caller pumps packets through.
    pub fn start(
        config: &Config,
        workload: Arc<dyn Workload>,
        egress: Arc<dyn EgressSink>,
    ) -> Result<(Engine, IngressCourier), ConfigError> {
        config.validate()?;
        let workers = config.scheduler.workers.len();
        let map = WorkerMap::new(config.scheduler.workers.clone());
        let clock = Clock::new();

        let pool = RequestPool::new(config.capacity.requests);
        let budget = ContextBudget::new(config.capacity.contexts);
        let occupancy = Arc::new(Occupancy::new(workers));
        let stats = Arc::new(EngineStats::default());
        let lines = Arc::new(PreemptLines::new(workers));
        let slots = SlotArray::new(workers);
        // Every live task owns a pooled request, so a slab as large as the
        // pool can never run out for reinsertions.
        let queues = TaskQueues::new(workers, pool.capacity());
        let (producer, consumer) = IngressHandoff::split();
        let shutdown = Arc::new(AtomicBool::new(false));

        let policy = match &config.scheduler.policy {
            PolicyConfig::CoreGranular => QueuePolicy::CoreGranular,
            PolicyConfig::ObjectiveAware { objectives_ns } => QueuePolicy::ObjectiveAware {
                objectives_ns: objectives_ns.clone(),
            },
        };

        let mut dispatcher = Dispatcher::new(DispatcherSetup {
            slots: slots.dispatcher_view(),
            queues,
            policy,
            occupancy: Arc::clone(&occupancy),
            stats: Arc::clone(&stats),
            lines: Arc::clone(&lines),
            budget,
            ingress: consumer,
            head_reinsert: config.scheduler.head_reinsertion.clone(),
            preemption_delay_ns: config.scheduler.preemption_delay_ns,
            clock,
        });
        let dispatcher_core = config.scheduler.dispatcher_core;
        let dispatcher_shutdown = Arc::clone(&shutdown);
        let dispatcher_handle = std::thread::Builder::new()
            .name("kestrel-dispatcher".into())
            .spawn(move || {
                if let Some(core) = dispatcher_core {
                    pin_current_thread(core);
                }
                dispatcher.run(&dispatcher_shutdown);
            })
            .map_err(ConfigError::Io)?;

        let mut worker_handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let mut core = WorkerCore::new(
                index,
                slots.worker_view(index),
                Arc::clone(&lines),
                Arc::clone(&occupancy),
                Arc::clone(&stats),
                Arc::clone(&egress),
                Arc::clone(&workload),
                map.clone(),
            );
            let pin = config
                .scheduler
                .worker_cores
                .as_ref()
                .map(|cores| cores[index]);
            let worker_shutdown = Arc::clone(&shutdown);
            let handle = std::thread::Builder::new()
                .name(format!("kestrel-worker-{index}"))
                .spawn(move || {
                    if let Some(core_id) = pin {
                        pin_current_thread(core_id);
                    }
                    core.run(&worker_shutdown);
                })
                .map_err(ConfigError::Io)?;
            worker_handles.push(handle);
        }

        let courier = IngressCourier::new(
            producer,
            pool,
            map,
            config.capacity.reassembly_cells,
            Arc::clone(&stats),
            egress,
            clock,
            config.scheduler.cluster_id,
            config.ingress.parent_id,
            config.ingress.keep_alive_interval_us,
        );

        Ok((
            Engine {
                shutdown,
                dispatcher: Some(dispatcher_handle),
                workers: worker_handles,
                occupancy,
                stats,
            },
            courier,
        ))
    }

    /// Point-in-time engine counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Live occupancy of one worker.
    pub fn queue_length(&self, worker: u16) -> u32 {
        self.occupancy.len(QueueId(worker))
    }

    /// True when no worker has live work.
    pub fn is_idle(&self) -> bool {
        self.occupancy.is_empty()
    }

    /// Stop all cores and join them, returning the final counters.
    pub fn shutdown(mut self) -> StatsSnapshot {
        self.stop();
        self.stats.snapshot()
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.dispatcher.take() {
            let _ = handle.join();
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
