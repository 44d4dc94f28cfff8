//! Polls a shared segment and prints every delivered message.
//!
//! Run with: `cargo run --example shm_reader -- [segment-name]`

use courier::prelude::*;

#[derive(Default)]
struct PrintHandler;

#[async_trait::async_trait]
impl Handler<String> for PrintHandler {
    async fn invoke(&self, message: String) -> HandlerResult {
        println!("[Reader] {}", message);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "courier-demo".to_string());
    let mailbox =
        SharedMemoryContext::<String, PrintHandler>::new(&name, HandlerFactory::default())?;

    let cancel = CancellationToken::new();
    let poller = mailbox.start(cancel.clone());
    println!("Polling {} (Ctrl+C to stop)", mailbox.segment_path().display());

    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("[Reader] Failed to wait for Ctrl+C: {}", e);
    }
    cancel.cancel();
    if let Err(e) = poller.await {
        eprintln!("[Reader] Poller task failed: {}", e);
    }

    Ok(())
}
