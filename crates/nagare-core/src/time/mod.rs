//! # Time-Ordered & Composite Operators
//!
//! Operators that cannot fuse into a per-item function because they
//! reorder items in time or consume multiple sources. Each is an
//! independent stream whose base is a bounded queue driven by a
//! background producer task:
//!
//! ```text
//! ┌──────────┐   items    ┌──────────┐   bounded    ┌──────────┐
//! │ upstream │ ─────────> │ producer │ ──queue────> │ consumer │
//! │          │            │  task    │              │  awaits  │
//! └──────────┘            └──────────┘              └──────────┘
//! ```
//!
//! Producers suspend on the upstream, on timers, and on the queue when
//! the consumer lags. Dropping the consuming stream cancels the producer
//! through its token and aborts the task, releasing timers and queue
//! slots on every exit path.
//!
//! All operators here require an ambient tokio runtime at construction.

mod buffer;
mod combine;
mod flatten;
pub(crate) mod queue;
mod rate;
mod retry;

pub use combine::{combine, combine_latest, merge, zip};
pub use queue::CancelToken;

pub(crate) use buffer::{buffer, buffer_time};
pub(crate) use flatten::{concat_map, switch_map};
pub(crate) use rate::{debounce, throttle};
pub(crate) use retry::retry;

use std::time::Duration;

use crate::stream::Stream;
use crate::value::Value;

use queue::spawn_op;

/// Emits `Int(0)`, `Int(1)`, … every `period`, starting one period after
/// construction, until cancelled or dropped.
#[must_use]
pub fn interval(period: Duration) -> Stream {
    interval_with_token(period, CancelToken::new())
}

/// [`interval`] with an externally-owned cancellation token.
#[must_use]
pub fn interval_with_token(period: Duration, external: CancelToken) -> Stream {
    spawn_op("interval", move |tx, token| async move {
        let start = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut n: i64 = 0;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                () = external.cancelled() => break,
                _ = ticker.tick() => {
                    if tx.send(Ok(Value::Int(n))).await.is_err() {
                        break;
                    }
                    n += 1;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_with_take() {
        let out = Stream::interval(Duration::from_millis(10))
            .take(3)
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_external_cancellation() {
        let token = CancelToken::new();
        let stream = interval_with_token(Duration::from_millis(10), token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(35)).await;
            token.cancel();
        });

        // Ticks at 10, 20, 30; cancellation at 35 completes the stream.
        let out = stream.to_array().await.unwrap();
        assert_eq!(ints(&out), vec![0, 1, 2]);
    }
}
