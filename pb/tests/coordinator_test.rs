//! Integration tests for the request coordinator
//!
//! These drive a spawned coordinator through its public handle, the way
//! backends and the RPC proxy do.

mod common;

use std::sync::{Arc, Mutex};

use postback::backend::Backend;
use postback::coordinator::{
    CallError, CoordinatorConfig, CoordinatorMetrics, CoordinatorState, Outcome, ReloadReason, handler,
};
use postback::rpc::{RpcError, RpcProxy};
use postback::transport::{Response, Target, TransportError};
use proptest::prelude::*;
use serde_json::{Value, json};

use common::{EchoTransport, FnTransport, body, recorder, spawn, spawn_manual, target};

fn paused_config() -> CoordinatorConfig {
    CoordinatorConfig {
        contact_timeout_ms: 1_000,
        reload_delay_ms: 100,
        ..Default::default()
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn test_second_call_waits_for_first() {
    let (h, mut issued) = spawn_manual(CoordinatorConfig::default());
    let (ha, mut ra) = recorder();
    let (hb, mut rb) = recorder();

    h.coord.submit(target("/a"), ha).unwrap();
    h.coord.submit(target("/b"), hb).unwrap();

    let (first, reply_a) = issued.recv().await.unwrap();
    assert_eq!(first.url().path(), "/a");

    let metrics = h.coord.metrics().await.unwrap();
    assert_eq!(metrics.state, CoordinatorState::InFlight);
    assert_eq!(metrics.queue_depth, 1);
    assert!(issued.try_recv().is_err(), "B must not be issued while A is in flight");

    reply_a.send(Ok(Response::new(200, "A"))).unwrap();
    let (path, outcome) = ra.recv().await.unwrap();
    assert_eq!(path, "/a");
    assert_eq!(body(&outcome), "A");

    let (second, reply_b) = issued.recv().await.unwrap();
    assert_eq!(second.url().path(), "/b");
    reply_b.send(Ok(Response::new(200, "B"))).unwrap();
    let (path, outcome) = rb.recv().await.unwrap();
    assert_eq!(path, "/b");
    assert_eq!(body(&outcome), "B");

    let metrics = h.coord.metrics().await.unwrap();
    assert_eq!(metrics.state, CoordinatorState::Idle);
    assert_eq!(metrics.dispatched, 2);
    assert_eq!(metrics.delivered, 2);

    h.coord.shutdown().unwrap();
    assert_eq!(h.task.await.unwrap(), None);
}

#[tokio::test]
async fn test_queue_is_fifo() {
    let (h, mut issued) = spawn_manual(CoordinatorConfig::default());
    let mut receivers = Vec::new();

    for path in ["/a", "/b", "/c"] {
        let (hx, rx) = recorder();
        h.coord.submit(target(path), hx).unwrap();
        receivers.push(rx);
    }

    let mut order = Vec::new();
    for _ in 0..3 {
        let (issued_target, reply) = issued.recv().await.unwrap();
        let path = issued_target.url().path().to_string();
        reply.send(Ok(Response::new(200, path.clone()))).unwrap();
        order.push(path);
    }
    assert_eq!(order, vec!["/a", "/b", "/c"]);

    for (rx, expected) in receivers.iter_mut().zip(["/a", "/b", "/c"]) {
        let (_, outcome) = rx.recv().await.unwrap();
        assert_eq!(body(&outcome), expected);
    }

    let metrics = h.coord.metrics().await.unwrap();
    assert_eq!(metrics.peak_queue_depth, 2);
    h.coord.shutdown().unwrap();
}

// =============================================================================
// Coalescing
// =============================================================================

#[tokio::test]
async fn test_shared_handler_sees_only_latest_result() {
    let (h, mut issued) = spawn_manual(CoordinatorConfig::default());
    let (hx, mut rx_x) = recorder();
    let (shared, mut rx_shared) = recorder();

    h.coord.submit(target("/x"), hx).unwrap();
    h.coord.submit(target("/a"), shared.clone()).unwrap();
    h.coord.submit(target("/b"), shared).unwrap();

    for payload in ["X", "A", "B"] {
        let (_, reply) = issued.recv().await.unwrap();
        reply.send(Ok(Response::new(200, payload))).unwrap();
    }

    let (_, outcome) = rx_x.recv().await.unwrap();
    assert_eq!(body(&outcome), "X");

    let (path, outcome) = rx_shared.recv().await.unwrap();
    assert_eq!(path, "/b");
    assert_eq!(body(&outcome), "B");

    let metrics = h.coord.metrics().await.unwrap();
    assert_eq!(metrics.coalesced, 1);
    assert_eq!(metrics.delivered, 2);
    assert!(rx_shared.try_recv().is_err(), "A's result must be skipped");

    h.coord.shutdown().unwrap();
}

#[tokio::test]
async fn test_errors_are_never_coalesced() {
    let (h, mut issued) = spawn_manual(CoordinatorConfig::default());
    let (shared, mut rx_shared) = recorder();

    h.coord.submit(target("/a"), shared.clone()).unwrap();
    h.coord.submit(target("/b"), shared).unwrap();

    let (_, reply_a) = issued.recv().await.unwrap();
    reply_a
        .send(Err(TransportError::Status {
            status: 500,
            body: "boom".to_string(),
        }))
        .unwrap();

    let (path, outcome) = rx_shared.recv().await.unwrap();
    assert_eq!(path, "/a");
    assert!(matches!(
        outcome,
        Err(CallError::Transport(TransportError::Status { status: 500, .. }))
    ));

    // The queue still advances after the error
    let (next, reply_b) = issued.recv().await.unwrap();
    assert_eq!(next.url().path(), "/b");
    reply_b.send(Ok(Response::new(200, "B"))).unwrap();
    let (_, outcome) = rx_shared.recv().await.unwrap();
    assert_eq!(body(&outcome), "B");

    assert_eq!(h.lifecycle.errors.lock().unwrap().len(), 1);
    let metrics = h.coord.metrics().await.unwrap();
    assert_eq!(metrics.coalesced, 0);
    assert_eq!(metrics.transport_errors, 1);

    h.coord.shutdown().unwrap();
}

// =============================================================================
// Contact loss
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_late_answer_after_timeout_forces_reload() {
    let (h, mut issued) = spawn_manual(paused_config());
    let (ha, mut ra) = recorder();

    h.coord.submit(target("/a"), ha).unwrap();
    let (_, reply_a) = issued.recv().await.unwrap();

    // Nothing answers, so the timer fires and the probe goes out
    let (probe, _probe_reply) = issued.recv().await.unwrap();
    assert_eq!(probe.url().path(), "/status.txt");
    assert_eq!(ra.recv().await.unwrap(), ("/a".to_string(), Err(CallError::ContactLost)));

    reply_a.send(Ok(Response::new(200, "late"))).unwrap();

    assert_eq!(h.task.await.unwrap(), Some(ReloadReason::ContactRestored));
    assert_eq!(*h.lifecycle.reloads.lock().unwrap(), vec![ReloadReason::ContactRestored]);
    assert!(ra.recv().await.is_none(), "the late answer is never delivered");
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_and_status_answer_reload_once() {
    let (h, mut issued) = spawn_manual(paused_config());
    let (ha, _ra) = recorder();

    h.coord.submit(target("/a"), ha).unwrap();
    let (_, reply_a) = issued.recv().await.unwrap();
    let (_, status_reply) = issued.recv().await.unwrap();

    let lost_at = tokio::time::Instant::now();
    reply_a.send(Ok(Response::new(200, "late"))).unwrap();
    status_reply.send(Ok(Response::new(200, "ok"))).unwrap();

    assert_eq!(h.task.await.unwrap(), Some(ReloadReason::ContactRestored));
    assert_eq!(*h.lifecycle.reloads.lock().unwrap(), vec![ReloadReason::ContactRestored]);
    assert!(lost_at.elapsed() >= std::time::Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_failed_probe_forces_reload() {
    let (h, mut issued) = spawn_manual(paused_config());
    let (ha, _ra) = recorder();

    h.coord.submit(target("/a"), ha).unwrap();
    let (_, _reply_a) = issued.recv().await.unwrap();

    let (_, probe_reply) = issued.recv().await.unwrap();
    probe_reply
        .send(Err(TransportError::Network("connection refused".to_string())))
        .unwrap();

    assert_eq!(h.task.await.unwrap(), Some(ReloadReason::ProbeFailed));
    assert_eq!(*h.lifecycle.reloads.lock().unwrap(), vec![ReloadReason::ProbeFailed]);
}

#[tokio::test(start_paused = true)]
async fn test_queued_calls_are_dropped_at_reload() {
    let (h, mut issued) = spawn_manual(paused_config());
    let (ha, _ra) = recorder();

    h.coord.submit(target("/a"), ha).unwrap();
    let (_, _reply_a) = issued.recv().await.unwrap();

    let coord = h.coord.clone();
    let queued = tokio::spawn(async move { coord.call(target("/b")).await });

    let (_, _probe_reply) = issued.recv().await.unwrap();

    assert_eq!(h.task.await.unwrap(), Some(ReloadReason::ProbeTimedOut));
    assert_eq!(queued.await.unwrap(), Err(CallError::Shutdown));
    assert!(h.coord.is_closed());
}

// =============================================================================
// Backends and RPC
// =============================================================================

fn echo_url(t: &Target) -> Result<Response, TransportError> {
    Ok(Response::new(200, t.url().as_str()))
}

#[tokio::test]
async fn test_backend_refreshes_coalesce_across_subscribers() {
    let h = spawn(CoordinatorConfig::default(), Arc::new(FnTransport(echo_url)));
    let backend = Backend::new(h.coord.clone(), "http://localhost:9000/status.xml?");
    backend.set_global_arg("player=a&");

    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in ["progress", "playlist"] {
        let seen = Arc::clone(&seen);
        backend.add_handler(handler(move |_: &Target, outcome: &Outcome| {
            if let Ok(response) = outcome {
                seen.lock().unwrap().push(format!("{}: {}", name, response.text()));
            }
        }));
    }

    backend.submit("p0=pause").unwrap();
    backend.submit("p0=play").unwrap();

    // FIFO: once this answers, both backend calls have been handled
    h.coord.call(target("/status.txt")).await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "progress: http://localhost:9000/status.xml?player=a&p0=play",
            "playlist: http://localhost:9000/status.xml?player=a&p0=play",
        ]
    );
    assert_eq!(h.coord.metrics().await.unwrap().coalesced, 1);
    h.coord.shutdown().unwrap();
}

fn rpc_server(t: &Target) -> Result<Response, TransportError> {
    let request: Value = serde_json::from_str(t.body().unwrap_or("null"))?;
    let reply = match request {
        Value::Array(calls) => Value::Array(calls.iter().map(|c| json!({ "result": c["method"] })).collect()),
        call => json!({ "result": call["method"], "error": null }),
    };
    Ok(Response::new(200, reply.to_string()))
}

#[tokio::test]
async fn test_rpc_batch_returns_last_reply() {
    let h = spawn(CoordinatorConfig::default(), Arc::new(FnTransport(rpc_server)));
    let proxy = RpcProxy::new("http://localhost:9000/jsonrpc.js");

    proxy.queue_call("mixer", vec![json!("volume"), json!(30)]);
    let result = proxy.call(&h.coord, "status", vec![json!("-")]).await.unwrap();
    assert_eq!(result, json!("status"));
    assert_eq!(proxy.pending(), 0);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    proxy
        .submit(&h.coord, "play", vec![], move |reply| {
            let _ = tx.send(reply);
        })
        .unwrap();
    assert_eq!(rx.recv().await.unwrap(), Ok(json!("play")));

    h.coord.shutdown().unwrap();
}

#[tokio::test]
async fn test_rpc_missing_endpoint() {
    let not_found = |_: &Target| -> Result<Response, TransportError> {
        Err(TransportError::Status {
            status: 404,
            body: String::new(),
        })
    };
    let h = spawn(CoordinatorConfig::default(), Arc::new(FnTransport(not_found)));
    let proxy = RpcProxy::new("http://localhost:9000/jsonrpc.js");

    let err = proxy.call(&h.coord, "status", vec![]).await.unwrap_err();
    assert_eq!(
        err,
        RpcError::EndpointMissing {
            url: "http://localhost:9000/jsonrpc.js".to_string()
        }
    );
    h.coord.shutdown().unwrap();
}

// =============================================================================
// Properties
// =============================================================================

/// Submit one call per flag (true = shared handler), then a sentinel call
async fn run_burst(shared: &[bool]) -> (Vec<usize>, usize, CoordinatorMetrics) {
    let transport = Arc::new(EchoTransport::default());
    let h = spawn(CoordinatorConfig::default(), transport.clone());

    let log = Arc::new(Mutex::new(Vec::new()));
    let record = {
        let log = Arc::clone(&log);
        move |t: &Target, _: &Outcome| {
            let index: usize = t.url().path().trim_start_matches('/').parse().unwrap();
            log.lock().unwrap().push(index);
        }
    };
    let shared_handler = handler(record.clone());

    for (i, &is_shared) in shared.iter().enumerate() {
        let h_i = if is_shared {
            shared_handler.clone()
        } else {
            handler(record.clone())
        };
        h.coord.submit(target(&format!("/{}", i)), h_i).unwrap();
    }

    h.coord.call(target("/sentinel")).await.unwrap();
    let metrics = h.coord.metrics().await.unwrap();
    h.coord.shutdown().unwrap();
    h.task.await.unwrap();

    let delivered = log.lock().unwrap().clone();
    (delivered, transport.peak(), metrics)
}

proptest! {
    #[test]
    fn prop_single_slot_fifo_and_coalescing(shared in prop::collection::vec(any::<bool>(), 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let (delivered, peak, metrics) = rt.block_on(run_burst(&shared));

        // A shared-handler result is skipped iff a later shared call was queued behind it
        let expected: Vec<usize> = (0..shared.len())
            .filter(|&i| !(shared[i] && shared[i + 1..].iter().any(|&s| s)))
            .collect();

        prop_assert_eq!(peak, 1);
        prop_assert_eq!(metrics.dispatched, shared.len() as u64 + 1);
        prop_assert_eq!(metrics.coalesced, (shared.len() - expected.len()) as u64);
        prop_assert_eq!(delivered, expected);
    }
}
