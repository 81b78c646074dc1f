//! Fan out several multiplexed requests over one adapter, then gather them
//! together.
//!
//! Run with: `cargo run --example mux_fanout`

use anyhow::Result;
use weave_http::adapter::WeaveAdapter;
use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
use weave_http::{PreparedRequest, SendOptions};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let pool = MemoryPool::with_connections(4);
    for i in 0..5 {
        pool.script(
            ScriptedResponse::new(200)
                .with_header("content-type", "application/json")
                .with_body(format!(r#"{{"resource": {i}}}"#)),
        );
    }

    let adapter = WeaveAdapter::new(pool);

    let responses: Vec<_> = (0..5)
        .map(|i| {
            adapter.send(
                PreparedRequest::get(&format!("https://api.example.com/items/{i}"))?,
                SendOptions::multiplexed(),
            )
        })
        .collect::<weave_http::Result<_>>()?;

    tracing::info!(
        pending = adapter.pending_promises(),
        "issued everything; nothing resolved yet"
    );

    adapter.gather_all(None)?;

    for resp in &responses {
        let payload: serde_json::Value = resp.json()?;
        tracing::info!(status = %resp.status()?, %payload, "resolved");
    }

    adapter.close();
    Ok(())
}
