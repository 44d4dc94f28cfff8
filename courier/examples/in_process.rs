//! Two independent in-process queues sharing one context.
//!
//! Run with: `cargo run --example in_process`

use async_trait::async_trait;
use courier::prelude::*;
use std::time::Duration;

#[derive(Debug)]
struct Order {
    id: u64,
    quantity: u32,
}

#[derive(Default)]
struct OrderHandler;

#[async_trait]
impl Handler<Order> for OrderHandler {
    async fn invoke(&self, order: Order) -> HandlerResult {
        if order.quantity == 0 {
            return Err(format!("order {} has no quantity", order.id).into());
        }
        tracing::info!("Order {} x{} processed", order.id, order.quantity);
        Ok(())
    }
}

#[derive(Default)]
struct AuditHandler;

#[async_trait]
impl Handler<String> for AuditHandler {
    async fn invoke(&self, entry: String) -> HandlerResult {
        tracing::info!("Audit: {}", entry);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = ChannelContext::new(ChannelConfig::default());

    for id in 0..10 {
        let order = Order {
            id,
            quantity: (id % 4) as u32,
        };
        ctx.write::<Order, OrderHandler>(order, true).await?;
        ctx.write::<String, AuditHandler>(format!("order {} submitted", id), false)
            .await?;
    }

    tokio::time::sleep(Duration::from_millis(200)).await;

    if let Some(stats) = ctx.stats::<Order, OrderHandler>(QueueMode::Bounded) {
        println!(
            "orders: enqueued={} completed={} failed={}",
            stats.enqueued, stats.completed, stats.failed
        );
    }
    println!("queues: {}", ctx.queue_count());

    Ok(())
}
