mod support;

use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{Events, Harness, Note, Scripted};
use tokio_util::sync::CancellationToken;
use triage_client::shell::PERSISTENT_NOTIFICATION;
use triage_client::storage::Storage;
use triage_client::types::SyntheticCause;
use triage_client::{CallDescriptor, Reply};

fn capture() -> (Arc<Mutex<Vec<Reply>>>, impl FnOnce(Reply) + Send + 'static) {
    let slot = Arc::new(Mutex::new(Vec::new()));
    let sink = slot.clone();
    (slot, move |reply| sink.lock().unwrap().push(reply))
}

fn traced(events: &Events, descriptor: CallDescriptor) -> CallDescriptor {
    let (s, f, z) = (events.clone(), events.clone(), events.clone());
    descriptor
        .on_enter(events.hook("enter"))
        .on_exit(events.hook("exit"))
        .on_success(move |r| s.push(format!("success:{}", r.status_code())))
        .on_failure(move |r| f.push(format!("failure:{}", r.status_code())))
        .on_finalize(move |r| z.push(format!("finalize:{}", r.status_code())))
}

#[tokio::test(start_paused = true)]
async fn success_runs_callbacks_in_order_once() {
    let h = Harness::new([Scripted::ok(json!({"items": [1, 2, 3]}))]).await;
    let events = Events::default();

    h.client
        .call(traced(&events, CallDescriptor::get("/api/v4/alert/")))
        .await;

    assert_eq!(
        events.take(),
        vec!["enter", "exit", "success:200", "finalize:200"]
    );
    assert_eq!(h.transport.request_count(), 1);
    assert!(h.notifier.notes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn gateway_errors_retry_with_doubling_delay() {
    let h = Harness::new([
        Scripted::status(502),
        Scripted::status(502),
        Scripted::ok(json!({"done": true})),
    ])
    .await;
    let events = Events::default();
    let (replies, on_success) = capture();

    h.client
        .call(
            CallDescriptor::get("/api/v4/submission/abc/")
                .on_enter(events.hook("enter"))
                .on_exit(events.hook("exit"))
                .on_success(on_success),
        )
        .await;

    let replies = replies.lock().unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].payload(), &json!({"done": true}));

    let errors = h.notifier.errors();
    assert_eq!(errors.len(), 2);
    for (message, duration) in &errors {
        assert_eq!(message, "API server unreachable, retrying...");
        assert_eq!(*duration, Some(PERSISTENT_NOTIFICATION));
    }
    // Stale "unreachable" notification is cleared once the call resolves.
    assert_eq!(h.notifier.notes().last(), Some(&Note::Dismiss));

    let gaps = h.transport.gaps();
    assert_eq!(gaps.len(), 2);
    assert!(gaps[0] >= Duration::from_millis(32) && gaps[0] < Duration::from_millis(40));
    assert!(gaps[1] >= Duration::from_millis(64) && gaps[1] < Duration::from_millis(72));
    let total: Duration = gaps.iter().sum();
    assert!(total >= Duration::from_millis(96) && total < Duration::from_millis(110));

    // Enter/exit run on every attempt.
    assert_eq!(
        events.take(),
        vec!["enter", "exit", "enter", "exit", "enter", "exit"]
    );
}

#[tokio::test(start_paused = true)]
async fn missing_envelope_field_is_invalid() {
    let h = Harness::new([Scripted::json(
        200,
        json!({"api_response": {}, "api_status_code": 200, "api_server_version": "4.5"}),
    )])
    .await;
    let events = Events::default();

    h.client
        .call(traced(&events, CallDescriptor::get("/api/v4/alert/")))
        .await;

    assert_eq!(events.take(), vec!["enter", "exit"]);
    assert_eq!(
        h.notifier.errors(),
        vec![("Invalid data returned by the API server".to_string(), None)]
    );
}

#[tokio::test(start_paused = true)]
async fn cached_get_hits_network_once() {
    let h = Harness::new([Scripted::ok(json!({"classification": "TLP:CLEAR"}))]).await;

    let (first, on_first) = capture();
    h.client
        .call(
            CallDescriptor::get("/api/v4/user/settings/")
                .allow_cache(true)
                .on_success(on_first),
        )
        .await;

    let events = Events::default();
    let (second, on_second) = capture();
    let finalized = events.clone();
    h.client
        .call(
            CallDescriptor::get("/api/v4/user/settings/")
                .allow_cache(true)
                .on_enter(events.hook("enter"))
                .on_exit(events.hook("exit"))
                .on_success(on_second)
                .on_finalize(move |_| finalized.push("finalize")),
        )
        .await;

    assert_eq!(h.transport.request_count(), 1);
    let first = first.lock().unwrap();
    let second = second.lock().unwrap();
    assert_eq!(first[0].payload(), second[0].payload());
    assert!(second[0].is_cached());
    // No exit callback on a cache hit.
    assert_eq!(events.take(), vec!["enter", "finalize"]);
    assert_eq!(h.client.cache().stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn uncacheable_calls_always_go_to_the_network() {
    let h = Harness::new([Scripted::ok(json!(1)), Scripted::ok(json!(2))]).await;
    for _ in 0..2 {
        h.client.call(CallDescriptor::get("/api/v4/alert/")).await;
    }
    assert_eq!(h.transport.request_count(), 2);
    assert!(h.session.keys().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_calls_are_not_cached() {
    let h = Harness::new([
        Scripted::envelope(404, "not found", json!(null)),
        Scripted::ok(json!("fresh")),
    ])
    .await;
    for _ in 0..2 {
        h.client
            .call(
                CallDescriptor::get("/api/v4/file/info/x/")
                    .allow_cache(true)
                    .on_failure(|_| {}),
            )
            .await;
    }
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn daily_quota_reloads_without_finalize() {
    let h = Harness::new([Scripted::envelope(
        503,
        "daily API quota exceeded",
        json!(null),
    )])
    .await;
    let events = Events::default();

    h.client
        .call(traced(&events, CallDescriptor::get("/api/v4/alert/")))
        .await;

    assert_eq!(h.shell.reloads(), 1);
    assert_eq!(events.take(), vec!["enter", "exit"]);
    assert_eq!(h.transport.request_count(), 1);
    assert!(h.notifier.notes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unauthorized_reloads_unless_suppressed() {
    let h = Harness::new([
        Scripted::envelope(401, "session expired", json!(null)),
        Scripted::envelope(401, "bad password", json!(null)),
    ])
    .await;

    h.client.call(CallDescriptor::post("/api/v4/user/x/")).await;
    assert_eq!(h.shell.reloads(), 1);

    let events = Events::default();
    h.client
        .call(traced(
            &events,
            CallDescriptor::post("/api/v4/auth/login/").reload_on_unauthorized(false),
        ))
        .await;
    assert_eq!(h.shell.reloads(), 1);
    assert_eq!(
        events.take(),
        vec!["enter", "exit", "failure:401", "finalize:401"]
    );
}

#[tokio::test(start_paused = true)]
async fn concurrency_quota_retries_silently() {
    let h = Harness::new([
        Scripted::envelope(503, "concurrent API quota reached", json!(null)),
        Scripted::ok(json!("ok")),
    ])
    .await;
    let (replies, on_success) = capture();

    h.client
        .call(CallDescriptor::get("/api/v4/search/").on_success(on_success))
        .await;

    assert_eq!(replies.lock().unwrap().len(), 1);
    assert_eq!(h.transport.request_count(), 2);
    assert!(h.notifier.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn submission_quota_is_a_plain_failure() {
    let h = Harness::new([Scripted::envelope(
        503,
        "daily submission quota reached",
        json!(null),
    )])
    .await;

    h.client.call(CallDescriptor::post("/api/v4/submit/")).await;

    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(
        h.notifier.errors(),
        vec![("daily submission quota reached".to_string(), None)]
    );
    assert_eq!(h.shell.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn transport_failure_becomes_invalid_failure() {
    let h = Harness::new([Scripted::Unreachable]).await;
    let (replies, on_failure) = capture();

    h.client
        .call(CallDescriptor::get("/api/v4/alert/").on_failure(on_failure))
        .await;

    let replies = replies.lock().unwrap();
    assert_eq!(replies[0].status_code(), 400);
    assert_eq!(
        replies[0].error_message(),
        "Invalid data returned by the API server"
    );
    assert_eq!(replies[0].synthetic_cause(), Some(SyntheticCause::Transport));
    assert_eq!(replies[0].envelope().server_version, "4.5.0.0");
}

#[tokio::test(start_paused = true)]
async fn undecodable_body_is_treated_as_transport_failure() {
    let h = Harness::new([Scripted::raw(
        200,
        vec![("content-type", "text/html".into())],
        b"<html>login</html>",
    )])
    .await;

    h.client.call(CallDescriptor::get("/api/v4/alert/")).await;

    assert_eq!(
        h.notifier.errors(),
        vec![("Invalid data returned by the API server".to_string(), None)]
    );
}

#[tokio::test(start_paused = true)]
async fn quota_headers_are_reported_on_every_attempt() {
    let h = Harness::new([
        Scripted::envelope(503, "concurrent API quota reached", json!(null))
            .with_header("x-remaining-quota-api", "0"),
        Scripted::envelope(404, "missing", json!(null))
            .with_header("x-remaining-quota-api", "9")
            .with_header("x-remaining-quota-submission", "4"),
    ])
    .await;

    h.client
        .call(CallDescriptor::get("/api/v4/alert/").on_failure(|_| {}))
        .await;

    assert_eq!(*h.quota.api.lock().unwrap(), vec![0, 9]);
    assert_eq!(*h.quota.submission.lock().unwrap(), vec![4]);
}

#[tokio::test(start_paused = true)]
async fn xsrf_token_follows_the_cookie() {
    let h = Harness::new([
        Scripted::ok(json!(null)).with_header("set-cookie", "XSRF-TOKEN=abc123; Path=/"),
        Scripted::ok(json!(null)),
    ])
    .await;
    h.client.set_xsrf_token("initial");

    h.client.call(CallDescriptor::get("/api/v4/a/")).await;
    h.client.call(CallDescriptor::get("/api/v4/b/")).await;

    let requests = h.transport.requests();
    assert_eq!(requests[0].request.headers["x-xsrf-token"], "initial");
    assert_eq!(requests[1].request.headers["x-xsrf-token"], "abc123");
    assert_eq!(h.client.xsrf_token(), "abc123");
}

#[tokio::test(start_paused = true)]
async fn bodies_are_serialized_only_for_json() {
    let h = Harness::new([Scripted::ok(json!(null)), Scripted::ok(json!(null))]).await;

    h.client
        .call(CallDescriptor::post("/api/v4/search/").json(json!({"query": "id:*"})))
        .await;
    h.client
        .call(
            CallDescriptor::put("/api/v4/signature/add/")
                .content_type("text/plain")
                .json(json!("rule test { condition: true }")),
        )
        .await;

    let requests = h.transport.requests();
    assert_eq!(
        requests[0].request.body.as_deref(),
        Some(&br#"{"query":"id:*"}"#[..])
    );
    assert_eq!(requests[0].request.headers["content-type"], "application/json");
    assert_eq!(
        requests[1].request.body.as_deref(),
        Some(&b"rule test { condition: true }"[..])
    );
    assert_eq!(requests[1].request.headers["content-type"], "text/plain");
}

#[tokio::test(start_paused = true)]
async fn custom_first_delay() {
    let h = Harness::new([Scripted::status(502), Scripted::ok(json!(null))]).await;

    h.client
        .call(CallDescriptor::get("/api/v4/alert/").retry_after(Duration::from_millis(500)))
        .await;

    let gaps = h.transport.gaps();
    assert!(gaps[0] >= Duration::from_millis(500) && gaps[0] < Duration::from_millis(510));
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_backoff_stops_the_call() {
    let h = Harness::new([Scripted::status(502), Scripted::ok(json!(null))]).await;
    let events = Events::default();
    let token = CancellationToken::new();

    let handle = h.client.spawn_call(traced(
        &events,
        CallDescriptor::get("/api/v4/alert/").cancel_token(token.clone()),
    ));
    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    handle.await.unwrap();

    assert_eq!(h.transport.request_count(), 1);
    assert_eq!(events.take(), vec!["enter", "exit"]);
}

#[tokio::test(start_paused = true)]
async fn concurrent_calls_are_independent() {
    let h = Harness::new([Scripted::ok(json!("a")), Scripted::ok(json!("b"))]).await;
    let (replies, _) = capture();

    let mut handles = Vec::new();
    for path in ["/api/v4/a/", "/api/v4/b/"] {
        let sink = replies.clone();
        handles.push(h.client.spawn_call(
            CallDescriptor::get(path).on_success(move |r| sink.lock().unwrap().push(r)),
        ));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(replies.lock().unwrap().len(), 2);
    assert_eq!(h.transport.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn fetch_returns_payload_or_failed_reply() {
    let h = Harness::new([
        Scripted::ok(json!({"total": 2})),
        Scripted::envelope(404, "Alert not found", json!(null)),
    ])
    .await;

    let payload = h.client.fetch(CallDescriptor::get("/api/v4/alert/")).await;
    assert_eq!(payload.unwrap().unwrap(), json!({"total": 2}));

    let failed = h
        .client
        .fetch(CallDescriptor::get("/api/v4/alert/missing/"))
        .await
        .unwrap()
        .unwrap_err();
    assert_eq!(failed.status_code(), 404);
    assert_eq!(failed.error_message(), "Alert not found");
    // The failure was handed back, so nothing was shown.
    assert!(h.notifier.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn fetch_has_no_outcome_after_reload() {
    let h = Harness::new([Scripted::envelope(401, "session expired", json!(null))]).await;

    let outcome = h.client.fetch(CallDescriptor::get("/api/v4/alert/")).await;

    assert!(outcome.is_none());
    assert_eq!(h.shell.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn fetch_overrides_existing_handlers() {
    let h = Harness::new([Scripted::ok(json!("pong"))]).await;
    let events = Events::default();

    let outcome = h
        .client
        .fetch(traced(&events, CallDescriptor::get("/api/v4/ping/")))
        .await;

    assert_eq!(outcome.unwrap().unwrap(), json!("pong"));
    assert_eq!(events.take(), vec!["enter", "exit", "finalize:200"]);
}

#[tokio::test(start_paused = true)]
async fn string_status_code_is_a_failure() {
    let h = Harness::new([Scripted::json(
        200,
        json!({
            "api_error_message": "",
            "api_response": {"id": 1},
            "api_server_version": "4.5.0.42",
            "api_status_code": "200"
        }),
    )])
    .await;
    let events = Events::default();
    let (failures, on_failure) = capture();

    h.client
        .call(
            traced(&events, CallDescriptor::get("/api/v4/alert/1/").allow_cache(true))
                .on_failure(on_failure),
        )
        .await;

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].status_code(), 0);
    assert_eq!(failures[0].payload(), &json!({"id": 1}));
    assert_eq!(events.take(), vec!["enter", "exit", "finalize:0"]);
    assert!(h.notifier.errors().is_empty());
    assert!(h.session.keys().await.unwrap().is_empty());
}
