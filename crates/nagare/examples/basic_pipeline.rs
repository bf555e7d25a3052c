//! Bulk pipeline over an in-memory source, plus a windowed aggregate.
//!
//! Run with: `cargo run --example basic_pipeline`

use nagare::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Fused map→filter over a dense source runs through the array kernel.
    let doubled_evens = Stream::range(1, 11)
        .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
        .filter(|v| v.as_i64().unwrap_or(0) % 4 == 0)
        .to_array()
        .await?;
    println!("doubled evens: {doubled_evens:?}");

    // Running totals via scan; `last()` gives the reduce-style answer.
    let total = Stream::range(1, 101)
        .scan(
            |acc, v| Value::Int(acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0)),
            0,
        )
        .last()
        .await?;
    println!("sum of 1..=100: {total:?}");

    // Sliding mean over a noisy signal.
    let signal: Vec<f64> = (0..32).map(|i| f64::from(i % 7)).collect();
    let smoothed = Stream::from_values(signal)
        .windowed_aggregate(4, WindowOp::Mean)
        .to_array()
        .await?;
    println!("smoothed ({} points)", smoothed.len());

    // Numeric kernels transform whole f32 batches per item.
    let batch = F32Batch::from_vec(vec![1.0, 4.0, 9.0, 16.0]);
    let roots = Stream::from_values([Value::Batch(batch)])
        .map_kernel("sqrt", KernelParams::new())?
        .first()
        .await?;
    println!("roots: {roots:?}");

    Ok(())
}
