//! Throughput benchmark for direct send and broadcast through an `AgentManager`.
#![allow(missing_docs)]

use criterion::{criterion_group, criterion_main, Criterion};
use multi_agent_network::{AgentManager, MessagingConfig};
use serde_json::json;
use tokio::runtime::Runtime;

fn direct_send(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = MessagingConfig::production();
    let manager = rt.block_on(async { AgentManager::new(&config) });
    let a1 = manager.create_agent(None, None).unwrap();
    let a2 = manager.create_agent(None, None).unwrap();

    c.bench_function("agent_manager_send_message", |b| {
        b.iter(|| {
            rt.block_on(manager.send_message(a1, a2, "bench", json!({"n": 1})))
                .unwrap();
        });
    });
}

fn broadcast(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = MessagingConfig::production();
    let manager = rt.block_on(async { AgentManager::new(&config) });
    let sender = manager.create_agent(None, None).unwrap();
    for _ in 0..9 {
        manager.create_agent(None, None).unwrap();
    }

    c.bench_function("agent_manager_broadcast_message", |b| {
        b.iter(|| {
            rt.block_on(manager.broadcast_message(sender, "bench", json!({"n": 1})))
                .unwrap();
        });
    });
}

criterion_group!(benches, direct_send, broadcast);
criterion_main!(benches);
