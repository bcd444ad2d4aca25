//! RemoteWorker talking to a WorkerServer over loopback TCP.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{Behavior, FakeSimulator, request, sample_run, write_netlist};
use simsweep_raw::decode;
use simsweep_worker::{LocalWorker, OutputRef, RemoteWorker, RunFailure, Worker, WorkerId, WorkerServer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Harness {
  address: SocketAddr,
  simulator: Arc<FakeSimulator>,
  shutdown: CancellationToken,
  _scratch: tempfile::TempDir,
}

impl Drop for Harness {
  fn drop(&mut self) {
    self.shutdown.cancel();
  }
}

async fn start_server(behavior: Behavior) -> Harness {
  let scratch = tempfile::tempdir().unwrap();
  let simulator = Arc::new(FakeSimulator::new(behavior));
  let local = LocalWorker::new(
    WorkerId::new("server-local"),
    2,
    scratch.path().join("runs"),
    simulator.clone(),
  );
  let server = Arc::new(WorkerServer::new(Arc::new(local), scratch.path().join("inbox")));

  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let address = listener.local_addr().unwrap();
  let shutdown = CancellationToken::new();
  tokio::spawn(server.serve(listener, shutdown.clone()));

  Harness {
    address,
    simulator,
    shutdown,
    _scratch: scratch,
  }
}

fn client(address: SocketAddr) -> RemoteWorker {
  RemoteWorker::new(address.to_string(), 2, Duration::from_secs(5))
}

#[tokio::test]
async fn test_remote_success_ships_outputs() {
  let harness = start_server(Behavior::SucceedWithLog("m: x=1\n".to_string())).await;
  let input = tempfile::tempdir().unwrap();
  let worker = client(harness.address);

  let output = worker
    .run(
      request(write_netlist(input.path()), Duration::from_secs(5)),
      CancellationToken::new(),
    )
    .await
    .unwrap();

  assert_eq!(output.worker.as_str(), format!("remote:{}", harness.address));
  assert!(output.scratch_dir.is_none());
  let OutputRef::Inline(raw) = &output.raw else {
    panic!("expected inline output, got {:?}", output.raw);
  };
  assert_eq!(decode(raw).unwrap(), sample_run());
  let log = output.log.unwrap().read().await.unwrap();
  assert_eq!(&log[..], b"m: x=1\n");
}

#[tokio::test]
async fn test_remote_failure_is_propagated() {
  let harness = start_server(Behavior::Exit(4)).await;
  let input = tempfile::tempdir().unwrap();

  let err = client(harness.address)
    .run(
      request(write_netlist(input.path()), Duration::from_secs(5)),
      CancellationToken::new(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, RunFailure::Crash { exit_code: Some(4), .. }), "{err:?}");
}

#[tokio::test]
async fn test_resubmitted_attempt_runs_once() {
  let harness = start_server(Behavior::Succeed).await;
  let input = tempfile::tempdir().unwrap();
  let worker = client(harness.address);
  let request = request(write_netlist(input.path()), Duration::from_secs(5));

  let first = worker
    .run(request.clone(), CancellationToken::new())
    .await
    .unwrap();
  let second = worker
    .run(request.clone(), CancellationToken::new())
    .await
    .unwrap();
  assert_eq!(first.raw, second.raw);
  assert_eq!(harness.simulator.invocations(), 1);

  let mut retry = request;
  retry.attempt = 2;
  worker.run(retry, CancellationToken::new()).await.unwrap();
  assert_eq!(harness.simulator.invocations(), 2);
}

#[tokio::test]
async fn test_cancel_kills_remote_simulator() {
  let harness = start_server(Behavior::Hang).await;
  let input = tempfile::tempdir().unwrap();

  let cancel = CancellationToken::new();
  let trigger = cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(100)).await;
    trigger.cancel();
  });

  let err = client(harness.address)
    .run(request(write_netlist(input.path()), Duration::from_secs(60)), cancel)
    .await
    .unwrap_err();
  assert_eq!(err, RunFailure::Cancelled);

  for _ in 0..100 {
    if harness.simulator.killed() == 1 {
      return;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
  }
  panic!("server did not stop the simulator after the client hung up");
}

#[tokio::test]
async fn test_unreachable_worker() {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let address = listener.local_addr().unwrap();
  drop(listener);

  let input = tempfile::tempdir().unwrap();
  let err = client(address)
    .run(
      request(write_netlist(input.path()), Duration::from_secs(5)),
      CancellationToken::new(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, RunFailure::Transport { .. }), "{err:?}");
}
