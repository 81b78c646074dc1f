//! Cross-module smoke tests.

use crate::adapter::WeaveAdapter;
use crate::options::SendOptions;
use crate::request::PreparedRequest;
use crate::transport::memory::{MemoryPool, ScriptedResponse};

#[test]
fn plain_send_materializes_inline() {
    let pool = MemoryPool::with_connections(1);
    pool.script(
        ScriptedResponse::new(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok": true}"#),
    );

    let adapter = WeaveAdapter::new(pool);
    let resp = adapter
        .send(
            PreparedRequest::get("https://example.com/status").unwrap(),
            SendOptions::new(),
        )
        .unwrap();

    assert!(!resp.is_lazy());
    assert_eq!(resp.status().unwrap(), http::StatusCode::OK);
    let decoded: serde_json::Value = resp.json().unwrap();
    assert_eq!(decoded["ok"], serde_json::Value::Bool(true));
    assert_eq!(adapter.pending_promises(), 0);
}

#[test]
fn multiplexed_send_stays_lazy_until_gathered() {
    let pool = MemoryPool::with_connections(1);
    pool.script(ScriptedResponse::new(200).with_body("later"));

    let adapter = WeaveAdapter::new(pool);
    let resp = adapter
        .send(
            PreparedRequest::get("https://example.com/slow").unwrap(),
            SendOptions::multiplexed(),
        )
        .unwrap();

    assert!(resp.is_lazy());
    assert_eq!(adapter.pending_promises(), 1);

    adapter.gather_all(None).unwrap();
    assert!(!resp.is_lazy());
    assert_eq!(resp.text().unwrap(), "later");
    assert_eq!(adapter.pending_promises(), 0);
}

#[test]
fn cookies_flow_into_both_jars() {
    let pool = MemoryPool::with_connections(1);
    pool.script(
        ScriptedResponse::new(200)
            .with_header("set-cookie", "sid=abc123; Path=/")
            .with_body("ok"),
    );

    let adapter = WeaveAdapter::new(pool);
    let options = SendOptions::multiplexed();
    let session_jar = options.cookie_jar.clone();

    let resp = adapter
        .send(
            PreparedRequest::get("https://example.com/login").unwrap(),
            options,
        )
        .unwrap();
    adapter.gather_all(None).unwrap();

    assert_eq!(
        session_jar.get("example.com", "sid").as_deref(),
        Some("abc123")
    );
    assert_eq!(
        resp.cookies().unwrap().get("example.com", "sid").as_deref(),
        Some("abc123")
    );
}
