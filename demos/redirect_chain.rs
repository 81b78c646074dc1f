//! Follow a redirect chain transparently on a multiplexed exchange.
//!
//! Run with: `cargo run --example redirect_chain`

use anyhow::Result;
use weave_http::adapter::AsyncWeaveAdapter;
use weave_http::transport::memory::{MemoryPool, ScriptedResponse};
use weave_http::{PreparedRequest, SendOptions};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let pool = MemoryPool::with_connections(2);
    pool.script(ScriptedResponse::new(301).with_location("https://example.com/moved"));
    pool.script(ScriptedResponse::new(302).with_location("https://example.com/final"));
    pool.script(ScriptedResponse::new(200).with_body("you made it"));

    let adapter = AsyncWeaveAdapter::new(pool);

    let resp = adapter
        .send(
            PreparedRequest::get("https://example.com/start")?,
            SendOptions::multiplexed(),
        )
        .await?;
    tracing::info!(lazy = resp.is_lazy(), "request issued");

    adapter.gather(&[resp.clone()], None).await?;

    tracing::info!(
        status = %resp.status()?,
        url = %resp.url()?,
        hops = resp.history()?.len(),
        body = %resp.text()?,
        "chain settled"
    );
    for (i, hop) in resp.history()?.iter().enumerate() {
        tracing::info!(hop = i, status = %hop.status()?, url = %hop.url()?, "history entry");
    }

    adapter.close().await;
    Ok(())
}
