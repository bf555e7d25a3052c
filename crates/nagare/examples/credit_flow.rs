//! Credit-based flow control between a producer task and a consumer.
//!
//! Run with: `cargo run --example credit_flow`

use std::sync::Arc;
use std::time::Duration;

use nagare::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let credits = Arc::new(CreditController::new(4));
    let (tx, stream) = Stream::channel(16);

    // Producer: one credit per emitted item, waiting when exhausted.
    let producer_credits = Arc::clone(&credits);
    let producer = tokio::spawn(async move {
        for i in 0..12i64 {
            producer_credits.consume(1).await;
            if tx.send(Ok(Value::Int(i))).await.is_err() {
                return;
            }
        }
    });

    // Consumer: grant a credit back after handling each item.
    let consumer_credits = Arc::clone(&credits);
    let received = stream
        .for_each(move |v| {
            println!("received {v} (credits left: {})", consumer_credits.available());
            consumer_credits.grant(1);
        })
        .await;
    producer.await?;
    received?;

    // Admission control for the same pipeline, driven by load snapshots.
    let admission = DynamicBackpressure::new(
        64,
        10.0,
        AdaptiveBackpressure::new(100.0, 10.0, 1.0, 10_000.0),
    );
    let calm = LoadMetrics {
        queue_size: 3,
        processing_rate: 90.0,
        input_rate: 80.0,
        latency_ms: 6.0,
        memory_usage: 4096,
    };
    println!("calm load admitted: {}", admission.admit(&calm).is_accept());

    let overloaded = LoadMetrics {
        queue_size: 64,
        latency_ms: 35.0,
        ..calm
    };
    println!(
        "overloaded admitted: {}",
        admission.admit(&overloaded).is_accept()
    );

    // A windowed limiter bounds bursts independently of credits.
    let limiter = WindowedRateLimiter::new(1000, 5);
    let now = 0u64;
    let admitted = (0..8).filter(|i| limiter.try_acquire(now + i * 50)).count();
    println!("burst admitted {admitted}/8 within one second");

    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}
