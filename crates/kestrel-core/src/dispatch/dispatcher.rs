//! The dispatcher core.
//!
//! A single core owns every task queue and services every worker slot pair
//! in a non-blocking polling loop: reclaim finished and preempted work,
//! refill idle workers per the active queue policy, fire the preemption
//! watch on over-budget tasks, and drain the ingress batch. Nothing here
//! ever blocks; backpressure is expressed by declining to start new work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::dispatch::occupancy::{EngineStats, Occupancy};
use crate::dispatch::policy::QueuePolicy;
use crate::dispatch::preempt::PreemptLines;
use crate::dispatch::queue::{Task, TaskCategory, TaskQueues};
use crate::dispatch::slots::{DispatchBody, DispatcherSlots, ResponseFlag};
use crate::structures::handoff::{Arrival, IngressConsumer};
use crate::structures::pool::ContextBudget;
use crate::types::ids::QueueId;
use crate::types::request::Request;
use crate::system::clock::Clock;

/// Everything the dispatcher needs at construction.
pub(crate) struct DispatcherSetup {
    /// Dispatcher-side slot view.
    pub slots: DispatcherSlots,
    /// The task queues, owned outright from here on.
    pub queues: TaskQueues,
    /// Active dequeue policy.
    pub policy: QueuePolicy,
    /// Shared occupancy state.
    pub occupancy: Arc<Occupancy>,
    /// Shared counters.
    pub stats: Arc<EngineStats>,
    /// Preemption lines.
    pub lines: Arc<PreemptLines>,
    /// Execution context budget.
    pub budget: Arc<ContextBudget>,
    /// Consumer side of the ingress handoff.
    pub ingress: IngressConsumer,
    /// Per-queue preference: reinsert preempted tasks at the head (true)
    /// or the tail (false).
    pub head_reinsert: Vec<bool>,
    /// Preemption delay, nanoseconds from dispatch to signal.
    pub preemption_delay_ns: u64,
    /// Engine time base.
    pub clock: Clock,
}

/// The dispatcher core state and loop.
pub struct Dispatcher {
    slots: DispatcherSlots,
    queues: TaskQueues,
    policy: QueuePolicy,
    occupancy: Arc<Occupancy>,
    stats: Arc<EngineStats>,
    lines: Arc<PreemptLines>,
    budget: Arc<ContextBudget>,
    ingress: IngressConsumer,
    // Finished requests awaiting return to the ingress free-list.
    fini: Vec<Box<Request>>,
    // Per-worker dispatch timestamp and one-shot preemption arming.
    dispatch_ns: Vec<u64>,
    armed: Vec<bool>,
    head_reinsert: Vec<bool>,
    preemption_delay_ns: u64,
    clock: Clock,
    scratch: Vec<Arrival>,
}

impl Dispatcher {
    pub(crate) fn new(setup: DispatcherSetup) -> Self {
        let workers = setup.slots.workers();
        let mut head_reinsert = setup.head_reinsert;
        head_reinsert.resize(workers, true);
        Self {
            slots: setup.slots,
            queues: setup.queues,
            policy: setup.policy,
            occupancy: setup.occupancy,
            stats: setup.stats,
            lines: setup.lines,
            budget: setup.budget,
            ingress: setup.ingress,
            fini: Vec::new(),
            dispatch_ns: vec![0; workers],
            armed: vec![false; workers],
            head_reinsert,
            preemption_delay_ns: setup.preemption_delay_ns,
            clock: setup.clock,
            scratch: Vec::new(),
        }
    }

    /// Run until the shutdown flag rises. Pure polling; the periodic yield
    /// keeps unpinned deployments from starving sibling threads.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        tracing::info!(workers = self.slots.workers(), "dispatcher running");
        let mut iterations = 0u64;
        while !shutdown.load(Ordering::Relaxed) {
            self.poll();
            iterations = iterations.wrapping_add(1);
            if iterations & 0xFFF == 0 {
                std::thread::yield_now();
            }
        }
        tracing::info!("dispatcher stopped");
    }

    /// One loop iteration: service every worker, then drain ingress.
    pub fn poll(&mut self) {
        let now = self.clock.now_ns();
        for worker in 0..self.slots.workers() {
            self.handle_worker(worker, now);
        }
        self.drain_ingress(now);
    }

    fn handle_worker(&mut self, worker: usize, now: u64) {
        match self.slots.response_flag(worker) {
            ResponseFlag::Running => self.preempt_watch(worker, now),
            ResponseFlag::Finished => {
                self.handle_finished(worker);
                self.dispatch_next(worker, now);
            }
            ResponseFlag::Preempted => {
                self.handle_preempted(worker);
                self.dispatch_next(worker, now);
            }
            ResponseFlag::Processed => self.dispatch_next(worker, now),
        }
    }

    /// Reclaim a clean completion: the request goes to the free-list, the
    /// worker's occupancy drops, and a fully drained worker with a pending
    /// notify-owed flag is settled — the worker itself already told the
    /// upstream scheduler via its now-idle completion.
    fn handle_finished(&mut self, worker: usize) {
        let body = self.slots.take_response(worker);
        match body.req {
            Some(req) => self.fini.push(req),
            None => tracing::warn!(worker, "finished response carried no request"),
        }
        let remaining = self.occupancy.decrement(body.queue);
        if remaining == 0 && self.occupancy.is_notify_owed(body.queue) {
            self.occupancy.settle(body.queue);
        }
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        self.armed[worker] = false;
        self.slots.mark_processed(worker);
    }

    /// Reinsert a preempted task so it runs again before strictly newer
    /// work (or behind it, where the queue is configured for tail
    /// reinsertion). Occupancy is untouched: the task is still live.
    fn handle_preempted(&mut self, worker: usize) {
        let body = self.slots.take_response(worker);
        self.stats.preemptions.fetch_add(1, Ordering::Relaxed);
        let (Some(runnable), Some(req)) = (body.runnable, body.req) else {
            tracing::error!(worker, "preempted response missing context or request");
            panic!("preempted response missing context or request");
        };
        let task = Task {
            runnable: Some(runnable),
            ticket: None,
            req,
            queue: body.queue,
            category: body.category,
            enqueued_ns: body.enqueued_ns,
        };
        let result = if self.head_reinsert[body.queue.index()] {
            self.queues.enqueue_head(task)
        } else {
            self.queues.enqueue_tail(task)
        };
        if result.is_err() {
            // The slab is sized to the request pool, so a live task always
            // has a node available.
            tracing::error!(worker, "task arena full while reinserting preempted task");
            panic!("task arena full while reinserting preempted task");
        }
        self.armed[worker] = false;
        self.slots.mark_processed(worker);
    }

    /// Refill an eligible worker from the queues per the active policy.
    fn dispatch_next(&mut self, worker: usize, now: u64) {
        let Some(queue) = self
            .policy
            .select(&self.queues, QueueId(worker as u16), now)
        else {
            return;
        };
        let Some(task) = self.queues.dequeue(queue) else {
            return;
        };
        self.stats
            .note_queue_wait(now.saturating_sub(task.enqueued_ns));
        self.slots.dispatch(
            worker,
            DispatchBody {
                runnable: task.runnable,
                ticket: task.ticket,
                req: Some(task.req),
                queue: task.queue,
                category: task.category,
                enqueued_ns: task.enqueued_ns,
            },
        );
        self.dispatch_ns[worker] = now;
        self.armed[worker] = true;
    }

    /// Signal a worker whose current task overran the preemption delay.
    /// One-shot per dispatch: once fired, nothing is re-signaled until the
    /// next dispatch arms the watch again.
    fn preempt_watch(&mut self, worker: usize, now: u64) {
        if self.armed[worker]
            && now.saturating_sub(self.dispatch_ns[worker]) > self.preemption_delay_ns
        {
            self.armed[worker] = false;
            self.lines.line(worker).raise();
        }
    }

    /// Consume one published ingress batch: admit every arrival, then hand
    /// freed requests back toward the ingress free-list.
    fn drain_ingress(&mut self, now: u64) {
        let Some(mut batch) = self.ingress.try_drain() else {
            return;
        };
        let mut arrivals = std::mem::take(&mut self.scratch);
        while let Some(arrival) = batch.pop_arrival() {
            arrivals.push(arrival);
        }
        while let Some(req) = self.fini.pop() {
            if let Err(req) = batch.push_freed(req) {
                self.fini.push(req);
                break;
            }
        }
        batch.finish();
        for arrival in arrivals.drain(..) {
            self.admit(arrival, now);
        }
        self.scratch = arrivals;
    }

    /// Admit one arrival into its queue. A request that cannot get an
    /// execution context is returned to the free-list immediately — never
    /// silently lost — and nothing is accounted for it.
    fn admit(&mut self, arrival: Arrival, now: u64) {
        let Arrival { req, queue } = arrival;
        let Some(ticket) = self.budget.acquire() else {
            tracing::debug!(queue = %queue, "context budget exhausted, declining request");
            self.stats.declined.fetch_add(1, Ordering::Relaxed);
            self.fini.push(req);
            return;
        };
        self.occupancy.increment(queue);
        // An idle-selected arrival means the upstream scheduler just popped
        // this worker from its idle set; the worker owes it a now-idle
        // message when it next drains.
        if req.idle_selected() && !self.occupancy.is_notify_owed(queue) {
            self.occupancy.mark_notify_owed(queue);
        }
        let task = Task {
            runnable: None,
            ticket: Some(ticket),
            req,
            queue,
            category: TaskCategory::Fresh,
            enqueued_ns: now,
        };
        if let Err(task) = self.queues.enqueue_tail(task) {
            self.occupancy.decrement(queue);
            self.stats.declined.fetch_add(1, Ordering::Relaxed);
            self.fini.push(task.req);
            return;
        }
        self.stats.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Tasks waiting in one queue. Test and introspection hook.
    pub fn queue_len(&self, queue: QueueId) -> usize {
        self.queues.len(queue)
    }

    /// Finished requests not yet returned to the ingress side.
    pub fn fini_len(&self) -> usize {
        self.fini.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_INGRESS_BATCH;
    use crate::dispatch::runnable::RunOutcome;
    use crate::dispatch::slots::{ResponseBody, SlotArray, WorkerSlot};
    use crate::structures::handoff::{IngressHandoff, IngressProducer};
    use crate::structures::pool::RequestPool;

    struct Rig {
        dispatcher: Dispatcher,
        worker: WorkerSlot,
        producer: IngressProducer,
        pool: Arc<RequestPool>,
        occupancy: Arc<Occupancy>,
        stats: Arc<EngineStats>,
        lines: Arc<PreemptLines>,
    }

    fn rig(contexts: usize, preemption_delay_ns: u64) -> Rig {
        let slots = SlotArray::new(1);
        let occupancy = Arc::new(Occupancy::new(1));
        let stats = Arc::new(EngineStats::default());
        let lines = Arc::new(PreemptLines::new(1));
        let pool = RequestPool::new(32);
        let budget = ContextBudget::new(contexts);
        let (producer, consumer) = IngressHandoff::split();
        let dispatcher = Dispatcher::new(DispatcherSetup {
            slots: slots.dispatcher_view(),
            queues: TaskQueues::new(1, pool.capacity()),
            policy: QueuePolicy::CoreGranular,
            occupancy: Arc::clone(&occupancy),
            stats: Arc::clone(&stats),
            lines: Arc::clone(&lines),
            budget,
            ingress: consumer,
            head_reinsert: vec![true],
            preemption_delay_ns,
            clock: Clock::new(),
        });
        Rig {
            dispatcher,
            worker: slots.worker_view(0),
            producer,
            pool,
            occupancy,
            stats,
            lines,
        }
    }

    fn publish(rig: &mut Rig, count: usize, idle_selected: bool) {
        let mut batch = rig.producer.try_open().expect("producer side open");
        for _ in 0..count {
            let mut req = rig.pool.acquire().expect("pool request");
            req.begin(QueueId(0), 1, idle_selected);
            batch
                .push(Arrival {
                    req,
                    queue: QueueId(0),
                })
                .unwrap();
        }
        batch.publish();
    }

    #[test]
    fn admission_enqueues_and_accounts() {
        // Goal: a drained batch lands in the queue with occupancy tracked.
        let mut rig = rig(4, u64::MAX);
        rig.worker.init();
        publish(&mut rig, 3, false);
        // Workers are serviced before the ingress drain, so the batch lands
        // on the first poll and the idle worker is refilled on the second.
        rig.dispatcher.poll();
        assert_eq!(rig.dispatcher.queue_len(QueueId(0)), 3);
        assert_eq!(rig.occupancy.len(QueueId(0)), 3);
        assert_eq!(rig.stats.snapshot().admitted, 3);
        rig.dispatcher.poll();
        assert_eq!(rig.dispatcher.queue_len(QueueId(0)), 2);
        assert!(rig.worker.try_claim().is_some());
    }

    #[test]
    fn finished_report_frees_request_and_settles_idle() {
        // Goal: FINISHED → request on the free-list path, occupancy down,
        // notify-owed settled at zero, slot processed and refilled.
        let mut rig = rig(4, u64::MAX);
        rig.worker.init();
        publish(&mut rig, 1, true);
        rig.dispatcher.poll();
        assert!(rig.occupancy.is_notify_owed(QueueId(0)));

        rig.dispatcher.poll();
        let body = rig.worker.try_claim().expect("dispatched task");
        rig.worker.respond(
            ResponseBody {
                runnable: None,
                req: body.req,
                queue: body.queue,
                category: TaskCategory::Resumed,
                enqueued_ns: body.enqueued_ns,
            },
            RunOutcome::Finished,
        );
        rig.dispatcher.poll();
        assert_eq!(rig.occupancy.len(QueueId(0)), 0);
        assert!(!rig.occupancy.is_notify_owed(QueueId(0)));
        assert_eq!(rig.stats.snapshot().completed, 1);
        assert_eq!(rig.dispatcher.fini_len(), 1);

        // The next batch exchange returns the freed request to the pool.
        let before = rig.pool.available();
        publish(&mut rig, 0, false);
        rig.dispatcher.poll();
        let mut batch = rig.producer.try_open().unwrap();
        let freed = batch.take_freed().expect("freed request returned");
        rig.pool.release(freed);
        assert_eq!(rig.pool.available(), before + 1);
    }

    #[test]
    fn preempted_report_reinserts_at_head() {
        // Goal: a preempted task outruns a later arrival in dispatch order,
        // and its occupancy is not double-counted.
        let mut rig = rig(4, u64::MAX);
        rig.worker.init();
        publish(&mut rig, 2, false);
        rig.dispatcher.poll();
        rig.dispatcher.poll();
        let first = rig.worker.try_claim().expect("first dispatch");
        let first_ns = first.enqueued_ns;

        // Report a preemption without a real coroutine: build a runnable
        // that finishes instantly if ever resumed.
        let runnable = crate::dispatch::runnable::Runnable::fresh(
            None,
            crate::dispatch::workload::WorkRequest {
                header: crate::types::message::Message {
                    kind: crate::types::message::MessageKind::NewTask,
                    cluster_id: 0,
                    src_id: 0,
                    dst_id: 0,
                    queue_depth: 0,
                    seq_num: 0,
                    client_id: 0,
                    request_id: 0,
                    payload_len: 0,
                    run_ns: 0,
                    gen_ns: 0,
                },
                payload: bytes::Bytes::new(),
            },
            crate::dispatch::runnable::BodyEnv {
                workload: Arc::new(Noop),
                egress: Arc::new(crate::dispatch::egress::NullSink),
                occupancy: Arc::clone(&rig.occupancy),
                stats: Arc::clone(&rig.stats),
                lines: Arc::clone(&rig.lines),
                queue: QueueId(0),
                src_wire_id: 1,
            },
        );
        rig.worker.respond(
            ResponseBody {
                runnable: Some(runnable),
                req: first.req,
                queue: first.queue,
                category: TaskCategory::Resumed,
                enqueued_ns: first_ns,
            },
            RunOutcome::Preempted,
        );
        rig.dispatcher.poll();

        // Occupancy still counts both live tasks.
        assert_eq!(rig.occupancy.len(QueueId(0)), 2);
        assert_eq!(rig.stats.snapshot().preemptions, 1);

        // The redispatched slot must carry the preempted task (same enqueue
        // stamp, resumed category), not the second arrival.
        let redispatched = rig.worker.try_claim().expect("resumed dispatch");
        assert_eq!(redispatched.category, TaskCategory::Resumed);
        assert_eq!(redispatched.enqueued_ns, first_ns);
        assert!(redispatched.runnable.is_some());
    }

    #[test]
    fn context_exhaustion_declines_without_accounting() {
        // Goal: with a spent context budget the admission is declined, the
        // request heads back to the free-list and occupancy never moves.
        let mut rig = rig(1, u64::MAX);
        rig.worker.init();
        publish(&mut rig, 2, false);
        rig.dispatcher.poll();
        assert_eq!(rig.occupancy.len(QueueId(0)), 1);
        assert_eq!(rig.stats.snapshot().admitted, 1);
        assert_eq!(rig.stats.snapshot().declined, 1);
        assert_eq!(rig.dispatcher.fini_len(), 1);
    }

    #[test]
    fn preemption_watch_fires_once_per_dispatch() {
        // Goal: an over-budget RUNNING task draws exactly one signal.
        let mut rig = rig(4, 0);
        rig.worker.init();
        publish(&mut rig, 1, false);
        rig.dispatcher.poll();
        rig.dispatcher.poll();
        let _body = rig.worker.try_claim().expect("dispatched");

        // Delay of zero: already elapsed. First poll raises the line.
        std::thread::sleep(std::time::Duration::from_millis(1));
        rig.dispatcher.poll();
        assert!(rig.lines.line(0).consume());
        // Second poll must not re-raise: the watch is one-shot.
        rig.dispatcher.poll();
        assert!(!rig.lines.line(0).is_raised());
    }

    #[test]
    fn freed_requests_flow_back_bounded_by_batch() {
        // Goal: freed requests return through the exchange at most one
        // batch at a time, and every one eventually makes it back.
        let mut rig = rig(MAX_INGRESS_BATCH, u64::MAX);
        rig.worker.init();
        for _ in 0..2 {
            publish(&mut rig, MAX_INGRESS_BATCH, false);
            rig.dispatcher.poll();
            // Drain everything through the worker.
            loop {
                rig.dispatcher.poll();
                let Some(body) = rig.worker.try_claim() else {
                    break;
                };
                rig.worker.respond(
                    ResponseBody {
                        runnable: None,
                        req: body.req,
                        queue: body.queue,
                        category: TaskCategory::Resumed,
                        enqueued_ns: body.enqueued_ns,
                    },
                    RunOutcome::Finished,
                );
            }
            rig.dispatcher.poll();
        }
        // 16 tasks finished; the second round's exchange already carried one
        // full batch back, so exactly one batch worth remains inside.
        assert_eq!(rig.dispatcher.fini_len(), MAX_INGRESS_BATCH);

        // Reclaim the travelled batch on the producer side, then run one
        // more empty exchange for the remainder.
        let mut batch = rig.producer.try_open().expect("cell is idle");
        let mut reclaimed = 0;
        while let Some(req) = batch.take_freed() {
            rig.pool.release(req);
            reclaimed += 1;
        }
        batch.publish();
        assert_eq!(reclaimed, MAX_INGRESS_BATCH);
        rig.dispatcher.poll();
        assert_eq!(rig.dispatcher.fini_len(), 0);
    }

    struct Noop;
    impl crate::dispatch::workload::Workload for Noop {
        fn run(
            &self,
            _req: &crate::dispatch::workload::WorkRequest,
            _irq: &crate::dispatch::workload::Interrupts<'_>,
        ) -> Option<bytes::Bytes> {
            None
        }
    }
}
