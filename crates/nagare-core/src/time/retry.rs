//! Upstream retry with linear backoff.

use std::time::Duration;

use futures::StreamExt;
use tracing::debug;

use crate::stream::Stream;

use super::queue::spawn_op;

/// Re-attempts the upstream pull after an error, up to `max_attempts`
/// times with backoff `delay · attempt`. A successful item resets the
/// attempt counter. Emitted items are never rewound.
pub(crate) fn retry(parent: Stream, max_attempts: u32, delay: Duration) -> Stream {
    spawn_op("retry", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        let mut attempt: u32 = 0;
        loop {
            let item = tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => item,
            };
            match item {
                Some(Ok(v)) => {
                    attempt = 0;
                    if tx.send(Ok(v)).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    attempt += 1;
                    if attempt > max_attempts {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    debug!(attempt, max_attempts, "upstream error, backing off");
                    tokio::select! {
                        () = token.cancelled() => break,
                        () = tokio::time::sleep(delay * attempt) => {}
                    }
                }
                None => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use crate::error::StreamError;
    use crate::value::Value;

    use super::*;

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_skips_transient_errors() {
        let (tx, rx) = mpsc::channel::<Result<Value, StreamError>>(16);
        tokio::spawn(async move {
            let _ = tx.send(Ok(Value::Int(1))).await;
            let _ = tx.send(Err(StreamError::source("transient"))).await;
            let _ = tx.send(Ok(Value::Int(2))).await;
        });

        let out = Stream::from_channel(rx)
            .retry(3, Duration::from_millis(10))
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let (tx, rx) = mpsc::channel::<Result<Value, StreamError>>(16);
        tokio::spawn(async move {
            for _ in 0..5 {
                let _ = tx.send(Err(StreamError::source("persistent"))).await;
            }
        });

        let result = Stream::from_channel(rx)
            .retry(2, Duration::from_millis(1))
            .to_array()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_attempt_counter() {
        let (tx, rx) = mpsc::channel::<Result<Value, StreamError>>(16);
        tokio::spawn(async move {
            // Two separate single-error bursts; each is under the limit
            // only if successes reset the counter.
            let _ = tx.send(Err(StreamError::source("e1"))).await;
            let _ = tx.send(Ok(Value::Int(1))).await;
            let _ = tx.send(Err(StreamError::source("e2"))).await;
            let _ = tx.send(Ok(Value::Int(2))).await;
        });

        let out = Stream::from_channel(rx)
            .retry(1, Duration::from_millis(1))
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 2]);
    }
}
