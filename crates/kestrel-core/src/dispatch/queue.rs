//! Per-worker task queues.
//!
//! One singly linked FIFO per worker, all nodes drawn from one fixed slab
//! with an index free-list. The queues are owned and mutated only by the
//! dispatcher core, so plain `&mut` access is all the synchronization they
//! need. `enqueue_head` exists for exactly one caller: reinserting a
//! preempted task ahead of strictly newer arrivals, so resumed work — which
//! is cheaper to finish than to restart — runs first.

use crate::dispatch::runnable::Runnable;
use crate::structures::pool::ContextTicket;
use crate::types::ids::QueueId;
use crate::types::request::Request;

/// Why a task is in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCategory {
    /// Fresh arrival; the worker parses the payload and builds a context.
    Fresh,
    /// Previously suspended execution; the worker resumes it directly.
    Resumed,
}

/// One queued unit of work, bound to a request and a target queue.
#[derive(Debug)]
pub struct Task {
    /// Suspended execution for resumed tasks; `None` for fresh ones.
    pub runnable: Option<Runnable>,
    /// Context reservation for fresh tasks; travels into the runnable.
    pub ticket: Option<ContextTicket>,
    /// The request this task serves.
    pub req: Box<Request>,
    /// Target queue index.
    pub queue: QueueId,
    /// Fresh or resumed.
    pub category: TaskCategory,
    /// Enqueue timestamp, nanoseconds; preserved across preemption.
    pub enqueued_ns: u64,
}

struct Node {
    task: Option<Task>,
    next: Option<u32>,
}

struct Fifo {
    head: Option<u32>,
    tail: Option<u32>,
    len: u32,
}

/// All per-worker FIFOs plus their shared node slab.
pub struct TaskQueues {
    nodes: Vec<Node>,
    free: Vec<u32>,
    queues: Vec<Fifo>,
}

impl TaskQueues {
    /// Build `num_queues` empty queues over a slab of `capacity` nodes.
    pub fn new(num_queues: usize, capacity: usize) -> Self {
        let nodes = (0..capacity)
            .map(|_| Node {
                task: None,
                next: None,
            })
            .collect();
        Self {
            nodes,
            free: (0..capacity as u32).rev().collect(),
            queues: (0..num_queues)
                .map(|_| Fifo {
                    head: None,
                    tail: None,
                    len: 0,
                })
                .collect(),
        }
    }

    /// Number of queues.
    pub fn num_queues(&self) -> usize {
        self.queues.len()
    }

    /// Tasks waiting in one queue.
    pub fn len(&self, queue: QueueId) -> usize {
        self.queues[queue.index()].len as usize
    }

    /// True when the queue holds no tasks.
    pub fn is_empty(&self, queue: QueueId) -> bool {
        self.queues[queue.index()].head.is_none()
    }

    /// Enqueue timestamp of the task at the head, if any.
    pub fn head_timestamp(&self, queue: QueueId) -> Option<u64> {
        let head = self.queues[queue.index()].head?;
        self.nodes[head as usize]
            .task
            .as_ref()
            .map(|t| t.enqueued_ns)
    }

    fn alloc(&mut self, task: Task) -> Result<u32, Task> {
        match self.free.pop() {
            Some(idx) => {
                self.nodes[idx as usize].task = Some(task);
                self.nodes[idx as usize].next = None;
                Ok(idx)
            }
            None => Err(task),
        }
    }

    /// Append a task to the tail of its queue. On a full slab the task is
    /// handed back so the caller can decline the admission.
    pub fn enqueue_tail(&mut self, task: Task) -> Result<(), Task> {
        let q = task.queue.index();
        let idx = self.alloc(task)?;
        let fifo = &mut self.queues[q];
        match fifo.tail {
            Some(tail) => {
                self.nodes[tail as usize].next = Some(idx);
                fifo.tail = Some(idx);
            }
            None => {
                fifo.head = Some(idx);
                fifo.tail = Some(idx);
            }
        }
        fifo.len += 1;
        Ok(())
    }

    /// Reinsert a task at the head of its queue, ahead of newer arrivals.
    pub fn enqueue_head(&mut self, task: Task) -> Result<(), Task> {
        let q = task.queue.index();
        let idx = self.alloc(task)?;
        let fifo = &mut self.queues[q];
        match fifo.head {
            Some(head) => {
                self.nodes[idx as usize].next = Some(head);
                fifo.head = Some(idx);
            }
            None => {
                fifo.head = Some(idx);
                fifo.tail = Some(idx);
            }
        }
        fifo.len += 1;
        Ok(())
    }

    /// Remove and return the task at the head of a queue.
    pub fn dequeue(&mut self, queue: QueueId) -> Option<Task> {
        let fifo = &mut self.queues[queue.index()];
        let idx = fifo.head?;
        let node = &mut self.nodes[idx as usize];
        let task = node.task.take().expect("queued node holds a task");
        fifo.head = node.next;
        if fifo.head.is_none() {
            fifo.tail = None;
        }
        fifo.len -= 1;
        node.next = None;
        self.free.push(idx);
        Some(task)
    }
}
