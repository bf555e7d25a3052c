//! Rate-shaping operators: `debounce` and `throttle`.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use crate::stream::Stream;

use super::queue::spawn_op;

/// Emits the latest upstream item once `period` elapses without a newer
/// arrival; the pending item flushes on upstream completion.
pub(crate) fn debounce(parent: Stream, period: Duration) -> Stream {
    spawn_op("debounce", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        let mut pending = None;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => match item {
                    Some(Ok(v)) => pending = Some(v),
                    Some(Err(e)) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        if let Some(v) = pending.take() {
                            let _ = tx.send(Ok(v)).await;
                        }
                        break;
                    }
                },
                // Re-created every loop turn, so each arrival resets the
                // quiet period.
                () = tokio::time::sleep(period), if pending.is_some() => {
                    if let Some(v) = pending.take() {
                        if tx.send(Ok(v)).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Emits the first item immediately, then drops arrivals within `period`
/// of the last emission.
pub(crate) fn throttle(parent: Stream, period: Duration) -> Stream {
    spawn_op("throttle", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        let mut last_emit: Option<Instant> = None;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => match item {
                    Some(Ok(v)) => {
                        let now = Instant::now();
                        let open = last_emit.map_or(true, |t| now.duration_since(t) >= period);
                        if open {
                            last_emit = Some(now);
                            if tx.send(Ok(v)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}
