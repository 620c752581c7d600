//! Microbenchmarks over the hot dispatcher paths: queue churn, policy
//! selection and the wire codec.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use kestrel_core::dispatch::{QueuePolicy, Task, TaskCategory, TaskQueues};
use kestrel_core::types::ids::QueueId;
use kestrel_core::types::message::{Message, MessageKind};
use kestrel_core::types::request::Request;

fn task(queue: u16, enqueued_ns: u64) -> Task {
    let mut req = Box::new(Request::blank());
    req.begin(QueueId(queue), 1, false);
    Task {
        runnable: None,
        ticket: None,
        req,
        queue: QueueId(queue),
        category: TaskCategory::Fresh,
        enqueued_ns,
    }
}

fn bench_queue_churn(c: &mut Criterion) {
    c.bench_function("enqueue_dequeue_cycle", |b| {
        let mut queues = TaskQueues::new(1, 1024);
        b.iter(|| {
            queues.enqueue_tail(task(0, 1)).unwrap();
            black_box(queues.dequeue(QueueId(0)));
        });
    });

    c.bench_function("head_reinsertion", |b| {
        let mut queues = TaskQueues::new(1, 1024);
        for i in 0..64 {
            queues.enqueue_tail(task(0, i)).unwrap();
        }
        b.iter(|| {
            let t = queues.dequeue(QueueId(0)).unwrap();
            queues.enqueue_head(t).unwrap();
        });
    });
}

fn bench_policy_select(c: &mut Criterion) {
    let mut queues = TaskQueues::new(16, 1024);
    for q in 0..16 {
        for i in 0..8 {
            queues.enqueue_tail(task(q, (q as u64) * 100 + i)).unwrap();
        }
    }
    let policy = QueuePolicy::ObjectiveAware {
        objectives_ns: (1..=16).map(|o| o * 1_000).collect(),
    };
    c.bench_function("objective_aware_select_16_queues", |b| {
        b.iter(|| black_box(policy.select(&queues, QueueId(0), 1_000_000)));
    });
}

fn bench_codec(c: &mut Criterion) {
    let msg = Message {
        kind: MessageKind::TaskDone,
        cluster_id: 1,
        src_id: 2,
        dst_id: 3,
        queue_depth: 4,
        seq_num: 5,
        client_id: 6,
        request_id: 7,
        payload_len: 8,
        run_ns: 9,
        gen_ns: 10,
    };
    c.bench_function("message_encode", |b| b.iter(|| black_box(msg.encode())));
    let wire = msg.encode();
    c.bench_function("message_decode", |b| {
        b.iter(|| black_box(Message::decode(&wire).unwrap()))
    });
}

criterion_group!(benches, bench_queue_churn, bench_policy_select, bench_codec);
criterion_main!(benches);
