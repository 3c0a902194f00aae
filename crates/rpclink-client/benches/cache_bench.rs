// Criterion benchmarks for the rpclink-client connection cache
//
// Run benchmarks with:
//   cargo bench -p rpclink-client
//
// For detailed output with plots:
//   cargo bench -p rpclink-client -- --save-baseline main

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rpclink_client::{ClientTransport, ClientTransportConfig, MemoryConnector, ShardPolicy};
use rpclink_common::transport::JsonCodec;
use rpclink_common::{Address, Request};
use serde_json::json;
use tokio::runtime::Runtime;

fn transport(runtime: &Runtime, shard_policy: ShardPolicy) -> ClientTransport<MemoryConnector> {
    ClientTransport::with_runtime(
        MemoryConnector::echo(),
        JsonCodec,
        ClientTransportConfig { shard_policy },
        runtime.handle().clone(),
    )
}

fn bench_create(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let mut group = c.benchmark_group("create");

    for (name, policy) in [
        ("global_hit", ShardPolicy::Global),
        ("per_thread_hit", ShardPolicy::PerThread { shards: 8 }),
    ] {
        let transport = transport(&runtime, policy);
        let address = Address::new("node", 4801);
        runtime
            .block_on(transport.create(address.clone()).connection())
            .unwrap();

        group.bench_function(name, |b| {
            b.iter(|| transport.create(black_box(address.clone())));
        });
    }

    group.finish();
}

fn bench_request_response(c: &mut Criterion) {
    let runtime = Runtime::new().unwrap();
    let transport = transport(&runtime, ShardPolicy::Global);
    let channel = transport.create(Address::new("node", 4801));
    let request = Request::new("echo", json!({"value": 42}));

    c.bench_function("memory_request_response", |b| {
        b.to_async(&runtime)
            .iter(|| channel.request_response(black_box(&request)));
    });
}

criterion_group!(benches, bench_create, bench_request_response);
criterion_main!(benches);
