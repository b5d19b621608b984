//! End-to-end dispatcher to endpoint benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use emuctl_client::{Dispatcher, Endpoint, Transport, TransportConfig};
use emuctl_protocol::Opcode;
use emuctl_server::{CommandSink, ReceivedCommand, Server, ServerConfig, ServerError};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

struct DiscardSink;

impl CommandSink for DiscardSink {
    fn deliver(&self, command: &ReceivedCommand) -> Result<(), ServerError> {
        black_box(command);
        Ok(())
    }
}

struct TestSetup {
    _rt: Runtime,
    server: Arc<Server>,
    dispatcher: Dispatcher,
}

fn setup_server_and_dispatcher() -> TestSetup {
    let rt = Runtime::new().unwrap();

    let listener = rt
        .block_on(TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Arc::new(Server::new(ServerConfig::new(addr), Arc::new(DiscardSink)));
    let server_clone = server.clone();
    rt.spawn(async move {
        let _ = server_clone.serve(listener).await;
    });

    let config = TransportConfig::new(Endpoint::from_addr(addr));
    let dispatcher = Dispatcher::new(Arc::new(Transport::new(config)));
    dispatcher.transport().connect().unwrap();

    TestSetup {
        _rt: rt,
        server,
        dispatcher,
    }
}

fn bench_dispatch(c: &mut Criterion) {
    let setup = setup_server_and_dispatcher();

    let mut group = c.benchmark_group("e2e_dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("snapshot_save", |b| {
        b.iter(|| black_box(setup.dispatcher.snapshot_save()));
    });
    group.bench_function("generic_send", |b| {
        let mut arg = 0u64;
        b.iter(|| {
            arg = arg.wrapping_add(1);
            black_box(setup.dispatcher.send(Opcode::GsExternalCommand, arg))
        });
    });

    group.finish();
    setup.server.shutdown();
}

fn bench_concurrent_dispatch(c: &mut Criterion) {
    let setup = setup_server_and_dispatcher();

    let mut group = c.benchmark_group("e2e_concurrent_dispatch");
    group.throughput(Throughput::Elements(400));

    group.bench_function("4x100", |b| {
        b.iter(|| {
            std::thread::scope(|s| {
                for _ in 0..4 {
                    let dispatcher = setup.dispatcher.clone();
                    s.spawn(move || {
                        for _ in 0..100 {
                            black_box(dispatcher.step_exec());
                        }
                    });
                }
            });
        });
    });

    group.finish();
    setup.server.shutdown();
}

criterion_group!(benches, bench_dispatch, bench_concurrent_dispatch);
criterion_main!(benches);
