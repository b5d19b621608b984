//! Dispatcher to debug endpoint over loopback TCP.

use emuctl_client::{ConnectionState, Delivery, Dispatcher, Endpoint, Transport, TransportConfig};
use emuctl_protocol::Opcode;
use emuctl_server::{ChannelSink, ReceivedCommand, Server, ServerConfig, ServerError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct Running {
    server: Arc<Server>,
    rx: mpsc::UnboundedReceiver<ReceivedCommand>,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start_on(addr: SocketAddr) -> (Running, SocketAddr) {
    let listener = TcpListener::bind(addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (sink, rx) = ChannelSink::new();
    let server = Arc::new(Server::new(ServerConfig::new(addr), Arc::new(sink)));
    let task = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };
    (Running { server, rx, task }, addr)
}

fn dispatcher_for(addr: SocketAddr) -> Dispatcher {
    let config = TransportConfig::new(Endpoint::from_addr(addr))
        .with_connect_timeout(Duration::from_millis(500))
        .with_write_timeout(Duration::from_millis(500));
    Dispatcher::new(Arc::new(Transport::new(config)))
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<ReceivedCommand>) -> ReceivedCommand {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("command within timeout")
        .expect("sink open")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_operation_arrives_in_order() {
    let (mut running, addr) = start_on("127.0.0.1:0".parse().unwrap()).await;
    let dispatcher = dispatcher_for(addr);

    let deliveries = {
        let dispatcher = dispatcher.clone();
        tokio::task::spawn_blocking(move || {
            Opcode::ALL
                .iter()
                .enumerate()
                .map(|(i, op)| dispatcher.send(*op, i as u64))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap()
    };
    assert!(deliveries.iter().all(|d| *d == Delivery::Sent));

    for (i, op) in Opcode::ALL.iter().enumerate() {
        let command = recv(&mut running.rx).await;
        assert_eq!(command.opcode, *op);
        assert_eq!(command.argument, i as u64);
    }

    let stats = dispatcher.transport().stats().snapshot();
    assert_eq!(stats.connect_attempts, 1);
    assert_eq!(stats.frames_sent, Opcode::ALL.len() as u64);

    running.server.shutdown();
    running.task.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_connection() {
    let (mut running, addr) = start_on("127.0.0.1:0".parse().unwrap()).await;
    let dispatcher = dispatcher_for(addr);

    let mut workers = Vec::new();
    for worker in 0..4u64 {
        let dispatcher = dispatcher.clone();
        workers.push(tokio::task::spawn_blocking(move || {
            for seq in 0..25u64 {
                dispatcher.gs_external_command_with((worker << 32) | seq);
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let mut last_seq = [None::<u64>; 4];
    for _ in 0..100 {
        let command = recv(&mut running.rx).await;
        assert_eq!(command.opcode, Opcode::GsExternalCommand);
        let worker = (command.argument >> 32) as usize;
        let seq = command.argument & 0xffff_ffff;
        if let Some(prev) = last_seq[worker] {
            assert!(seq > prev, "worker {} out of order", worker);
        }
        last_seq[worker] = Some(seq);
    }
    assert!(last_seq.iter().all(|s| *s == Some(24)));
    assert_eq!(
        running
            .server
            .stats()
            .connections_total
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );

    running.server.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reconnects_after_endpoint_restart() {
    let (mut first, addr) = start_on("127.0.0.1:0".parse().unwrap()).await;
    let dispatcher = dispatcher_for(addr);

    let d = dispatcher.clone();
    let delivery = tokio::task::spawn_blocking(move || d.stop_exec())
        .await
        .unwrap();
    assert!(delivery.is_sent());
    assert_eq!(recv(&mut first.rx).await.opcode, Opcode::StopExec);

    first.server.shutdown();
    first.task.await.unwrap().unwrap();

    let (mut second, _) = start_on(addr).await;

    // The first write after the peer went away may still be accepted locally;
    // keep sending until the new endpoint sees a frame.
    let d = dispatcher.clone();
    tokio::task::spawn_blocking(move || {
        for _ in 0..10 {
            d.start_exec();
            std::thread::sleep(Duration::from_millis(20));
        }
    })
    .await
    .unwrap();

    let command = recv(&mut second.rx).await;
    assert_eq!(command.opcode, Opcode::StartExec);
    assert_eq!(dispatcher.transport().state(), ConnectionState::Connected);
    assert!(dispatcher.transport().stats().snapshot().connect_attempts >= 2);

    second.server.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_drops_while_endpoint_down() {
    let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let dispatcher = dispatcher_for(addr);
    let d = dispatcher.clone();
    let delivery = tokio::task::spawn_blocking(move || d.soft_reset())
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Dropped);
    assert_eq!(dispatcher.transport().stats().snapshot().commands_dropped, 1);

    let (mut running, _) = start_on(addr).await;
    let d = dispatcher.clone();
    let delivery = tokio::task::spawn_blocking(move || d.soft_reset())
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Sent);
    assert_eq!(recv(&mut running.rx).await.opcode, Opcode::SoftReset);

    running.server.shutdown();
}
