//! End-to-end client-server benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glint_client::Client;
use glint_highlight::HtmlRenderer;
use glint_server::{Server, ServerConfig, ServiceContext};
use std::sync::Arc;
use tokio::runtime::Runtime;

struct TestSetup {
    _server_handle: tokio::task::JoinHandle<()>,
    client: Client,
}

fn setup_server_and_client(rt: &Runtime) -> TestSetup {
    // Find available port
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let ctx = ServiceContext::new(Arc::new(HtmlRenderer::bundled().unwrap()));
    let server = Arc::new(Server::new(ServerConfig::new(addr), ctx));

    let server_clone = server.clone();
    let server_handle = rt.spawn(async move {
        let _ = server_clone.run().await;
    });

    // Give server time to start
    std::thread::sleep(std::time::Duration::from_millis(100));

    let client = rt.block_on(async { Client::connect(addr).await.unwrap() });

    TestSetup {
        _server_handle: server_handle,
        client,
    }
}

fn bench_highlight_latency(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let setup = setup_server_and_client(&rt);

    let mut group = c.benchmark_group("e2e_highlight");

    for size in [10, 100, 1000] {
        let code = "local x = 1\n".repeat(size);

        group.throughput(Throughput::Bytes(code.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &code, |b, code| {
            b.to_async(&rt).iter(|| async {
                black_box(setup.client.highlight(Some("lua"), code).await.unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_highlight_latency);
criterion_main!(benches);
