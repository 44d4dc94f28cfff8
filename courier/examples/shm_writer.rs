//! Writes a numbered message into a shared segment once per second.
//!
//! Run with: `cargo run --example shm_writer -- [segment-name]`
//! and start `shm_reader` with the same name in another terminal.

use courier::prelude::*;
use std::time::Duration;

struct Unused;

#[async_trait::async_trait]
impl Handler<String> for Unused {
    async fn invoke(&self, _message: String) -> HandlerResult {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let name = std::env::args().nth(1).unwrap_or_else(|| "courier-demo".to_string());
    let mailbox = SharedMemoryContext::<String, _>::new(&name, HandlerFactory::new(|| Unused))?;
    println!("Writing to {}", mailbox.segment_path().display());

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut sequence = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = ticker.tick() => {
                sequence += 1;
                let message = format!("hello #{}", sequence);
                mailbox.write(&message).await?;
                println!("[Writer] {}", message);
            }
        }
    }

    Ok(())
}
