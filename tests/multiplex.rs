//! Blocking-adapter integration tests: lazy resolution, targeted gathering,
//! backpressure, orphan reconciliation and error translation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use weave_http::adapter::WeaveAdapter;
use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
use weave_http::transport::{
    ConnectionInfo, HttpProtocol, PromiseToken, RawBody, RawResponse, TransportPool,
};
use weave_http::{AdapterConfig, PreparedRequest, SendOptions, TransportError, WeaveError};

fn get(url: &str) -> PreparedRequest {
    PreparedRequest::get(url).unwrap()
}

fn raw_with_token(token: PromiseToken, status: u16, body: &'static [u8]) -> RawResponse {
    RawResponse {
        status: StatusCode::from_u16(status).unwrap(),
        reason: None,
        headers: HeaderMap::new(),
        token: Some(token),
        conn: ConnectionInfo {
            protocol: HttpProtocol::H2,
            peer_addr: None,
            secure: true,
        },
        body: RawBody::Full(bytes::Bytes::from_static(body)),
    }
}

#[test]
fn gather_on_empty_registry_is_idempotent() {
    let adapter = WeaveAdapter::new(MemoryPool::with_connections(1));
    for _ in 0..5 {
        adapter.gather_all(None).unwrap();
        adapter.gather_all(Some(3)).unwrap();
    }
    assert_eq!(adapter.pending_promises(), 0);
}

#[test]
fn targeted_gather_resolves_exactly_the_requested_response() {
    let pool = MemoryPool::with_connections(2);
    for body in ["one", "two", "three"] {
        pool.script(ScriptedResponse::new(200).with_body(body));
    }

    let adapter = WeaveAdapter::new(pool);
    let responses: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|path| {
            adapter
                .send(
                    get(&format!("https://example.com/{path}")),
                    SendOptions::multiplexed(),
                )
                .unwrap()
        })
        .collect();

    assert!(responses.iter().all(|r| r.is_lazy()));

    adapter.gather(&responses[1..2], None).unwrap();

    assert!(responses[0].is_lazy());
    assert!(!responses[1].is_lazy());
    assert!(responses[2].is_lazy());
    assert_eq!(responses[1].text().unwrap(), "two");
    assert_eq!(adapter.pending_promises(), 2);

    adapter.gather_all(None).unwrap();
    assert_eq!(responses[0].text().unwrap(), "one");
    assert_eq!(responses[2].text().unwrap(), "three");
}

#[test]
fn backpressure_drains_before_exceeding_the_ceiling() {
    let pool = MemoryPool::with_connections(1);
    for _ in 0..3 {
        pool.script(ScriptedResponse::new(200).with_body("done"));
    }

    let adapter = WeaveAdapter::with_config(
        pool,
        AdapterConfig {
            max_in_flight_multiplexed: Some(2),
            ..Default::default()
        },
    );

    let first = adapter
        .send(get("https://example.com/1"), SendOptions::multiplexed())
        .unwrap();
    let second = adapter
        .send(get("https://example.com/2"), SendOptions::multiplexed())
        .unwrap();
    assert_eq!(adapter.pending_promises(), 2);

    // The third multiplexed send hits the ceiling: a full drain runs before
    // the new exchange is issued.
    let third = adapter
        .send(get("https://example.com/3"), SendOptions::multiplexed())
        .unwrap();

    assert!(!first.is_lazy());
    assert!(!second.is_lazy());
    assert!(third.is_lazy());
    assert_eq!(adapter.pending_promises(), 1);
}

#[test]
fn orphaned_completion_reconciles_once_registered() {
    let pool = Arc::new(MemoryPool::with_connections(1));
    let adapter = WeaveAdapter::new(Arc::clone(&pool));

    // A completion arrives for a token nobody registered yet.
    let race_token = PromiseToken::new();
    pool.inject_ready(raw_with_token(race_token.clone(), 200, b"race"));

    // An unrelated exchange forces a drain cycle; the race response gets
    // buffered as an orphan instead of erroring.
    pool.script(ScriptedResponse::new(200).with_body("unrelated"));
    let unrelated = adapter
        .send(get("https://example.com/other"), SendOptions::multiplexed())
        .unwrap();
    adapter.gather_all(None).unwrap();
    assert_eq!(unrelated.text().unwrap(), "unrelated");

    // Registration catches up: a new exchange reuses the raced token.
    pool.script(ScriptedResponse::new(200).with_body("fresh").with_token(race_token));
    let late = adapter
        .send(get("https://example.com/late"), SendOptions::multiplexed())
        .unwrap();
    adapter.gather_all(None).unwrap();

    // The orphan wins over the freshly polled duplicate.
    assert!(!late.is_lazy());
    assert_eq!(late.text().unwrap(), "race");
    assert_eq!(adapter.pending_promises(), 0);
}

#[test]
fn max_fetch_bounds_a_drain() {
    let pool = MemoryPool::with_connections(1);
    pool.script(ScriptedResponse::new(200).with_body("first"));
    pool.script(ScriptedResponse::new(200).with_body("second"));

    let adapter = WeaveAdapter::new(pool);
    let first = adapter
        .send(get("https://example.com/1"), SendOptions::multiplexed())
        .unwrap();
    let second = adapter
        .send(get("https://example.com/2"), SendOptions::multiplexed())
        .unwrap();

    adapter.gather_all(Some(1)).unwrap();
    assert!(!first.is_lazy());
    assert!(second.is_lazy());
    assert_eq!(adapter.pending_promises(), 1);

    adapter.gather_all(None).unwrap();
    assert!(!second.is_lazy());
}

#[test]
fn unrecognized_promise_is_a_multiplexing_error() {
    let pool = Arc::new(MemoryPool::with_connections(1));
    let adapter = WeaveAdapter::new(Arc::clone(&pool));

    pool.script(ScriptedResponse::new(200).with_body("stolen"));
    let resp = adapter
        .send(get("https://example.com/x"), SendOptions::multiplexed())
        .unwrap();

    // Drain the pool behind the adapter's back; the token is now unknown.
    pool.poll_next().unwrap().unwrap();

    let err = adapter.gather(&[resp], None).unwrap_err();
    assert!(matches!(err, WeaveError::Multiplexing(_)));
}

#[test]
fn gathering_after_close_fails() {
    let pool = MemoryPool::with_connections(1);
    pool.script(ScriptedResponse::new(200).with_body("never"));

    let adapter = WeaveAdapter::new(pool);
    let resp = adapter
        .send(get("https://example.com/x"), SendOptions::multiplexed())
        .unwrap();
    assert!(resp.is_lazy());

    adapter.close();

    assert!(matches!(
        adapter.gather(&[resp.clone()], None),
        Err(WeaveError::Multiplexing(_))
    ));
    assert!(matches!(
        adapter.send(get("https://example.com/y"), SendOptions::new()),
        Err(WeaveError::Multiplexing(_))
    ));
    // The abandoned response stays lazy and keeps failing inspection.
    assert!(resp.is_lazy());
    assert!(matches!(resp.status(), Err(WeaveError::Multiplexing(_))));
}

#[test]
fn transport_failures_translate_into_the_taxonomy() {
    let cases: Vec<(TransportError, fn(&WeaveError) -> bool)> = vec![
        (TransportError::Connect("refused".into()), |e| {
            matches!(e, WeaveError::Connection(_))
        }),
        (TransportError::Timeout("deadline".into()), |e| {
            matches!(e, WeaveError::Timeout(_))
        }),
        (TransportError::Certificate("self-signed".into()), |e| {
            matches!(e, WeaveError::Certificate(_))
        }),
        (TransportError::Proxy("tunnel refused".into()), |e| {
            matches!(e, WeaveError::Proxy(_))
        }),
    ];

    for (transport_err, check) in cases {
        let pool = MemoryPool::with_connections(1);
        pool.script(ScriptedResponse::new(200).failing(transport_err));
        let adapter = WeaveAdapter::new(pool);
        let err = adapter
            .send(get("https://example.com/x"), SendOptions::multiplexed())
            .unwrap_err();
        assert!(check(&err), "unexpected mapping: {err:?}");
    }
}

#[test]
fn malformed_proxy_url_fails_before_any_transport_call() {
    let pool = Arc::new(MemoryPool::with_connections(1));
    pool.script(ScriptedResponse::new(200));
    let adapter = WeaveAdapter::new(Arc::clone(&pool));

    let mut options = SendOptions::new();
    options.proxies.insert("https".into(), "http://".into());

    let err = adapter
        .send(get("https://example.com/x"), options)
        .unwrap_err();
    assert!(matches!(err, WeaveError::Proxy(_)));
    // The script entry was never consumed.
    assert_eq!(pool.script_count(), 1);
}

#[test]
fn callbacks_fire_during_issue() {
    let pool = MemoryPool::with_connections(1);
    pool.script(ScriptedResponse::new(201));

    let adapter = WeaveAdapter::new(pool);
    let connections = Arc::new(AtomicUsize::new(0));
    let uploaded = Arc::new(AtomicUsize::new(0));

    let mut options = SendOptions::new();
    let seen = Arc::clone(&connections);
    options.on_post_connection = Some(Arc::new(move |info: &ConnectionInfo| {
        assert!(info.secure);
        seen.fetch_add(1, Ordering::SeqCst);
    }));
    let sent = Arc::clone(&uploaded);
    options.on_upload_body = Some(Arc::new(move |bytes, total| {
        assert_eq!(total, Some(bytes));
        sent.fetch_add(bytes as usize, Ordering::SeqCst);
    }));

    let request = PreparedRequest::new(http::Method::POST, "https://example.com/upload")
        .unwrap()
        .with_body("payload");
    let resp = adapter.send(request, options).unwrap();

    assert_eq!(resp.status().unwrap(), StatusCode::CREATED);
    assert_eq!(connections.load(Ordering::SeqCst), 1);
    assert_eq!(uploaded.load(Ordering::SeqCst), "payload".len());
}

#[test]
fn response_hooks_see_the_resolved_response() {
    let pool = MemoryPool::with_connections(1);
    pool.script(ScriptedResponse::new(200).with_body("hooked"));

    let adapter = WeaveAdapter::new(pool);
    let observed = Arc::new(AtomicUsize::new(0));

    let mut options = SendOptions::multiplexed();
    let counter = Arc::clone(&observed);
    options.hooks.push(Arc::new(move |resp: &weave_http::Response| {
        assert!(!resp.is_lazy());
        assert_eq!(resp.status().unwrap(), StatusCode::OK);
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    adapter.send(get("https://example.com/x"), options).unwrap();
    adapter.gather_all(None).unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_senders_share_one_adapter() {
    let pool = MemoryPool::with_connections(4);
    for i in 0..8 {
        pool.script(ScriptedResponse::new(200).with_body(format!("body-{i}")));
    }

    let adapter = Arc::new(WeaveAdapter::new(pool));
    let mut handles = Vec::new();
    for i in 0..8 {
        let adapter = Arc::clone(&adapter);
        handles.push(std::thread::spawn(move || {
            adapter
                .send(
                    PreparedRequest::get(&format!("https://example.com/{i}")).unwrap(),
                    SendOptions::multiplexed(),
                )
                .unwrap()
        }));
    }
    let responses: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(adapter.pending_promises(), 8);
    adapter.gather_all(None).unwrap();
    assert_eq!(adapter.pending_promises(), 0);
    for resp in &responses {
        assert_eq!(resp.status().unwrap(), StatusCode::OK);
        assert!(resp.text().unwrap().starts_with("body-"));
    }
}
