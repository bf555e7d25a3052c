//! Chunking operators: `buffer` and `buffer_time`.

use std::time::Duration;

use futures::StreamExt;
use tokio::time::Instant;

use crate::stream::Stream;
use crate::value::Value;

use super::queue::spawn_op;

/// Collects items into fixed-size tuples; the remainder flushes on
/// completion.
///
/// # Panics
///
/// Panics if `size` is zero.
pub(crate) fn buffer(parent: Stream, size: usize) -> Stream {
    assert!(size > 0, "buffer size must be positive");
    spawn_op("buffer", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        let mut chunk: Vec<Value> = Vec::with_capacity(size);
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => match item {
                    Some(Ok(v)) => {
                        chunk.push(v);
                        if chunk.len() == size {
                            let full = std::mem::replace(&mut chunk, Vec::with_capacity(size));
                            if tx.send(Ok(Value::tuple(full))).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Err(e)) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        if !chunk.is_empty() {
                            let _ = tx.send(Ok(Value::tuple(chunk))).await;
                        }
                        break;
                    }
                },
            }
        }
    })
}

/// Collects items into tuples flushed on a timer.
///
/// The window opens on the first arrival; each tick emits the window if
/// non-empty; the remainder flushes on completion.
pub(crate) fn buffer_time(parent: Stream, period: Duration) -> Stream {
    spawn_op("buffer_time", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        let mut window: Vec<Value> = Vec::new();
        let mut deadline = Instant::now();
        let mut armed = false;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => match item {
                    Some(Ok(v)) => {
                        if !armed {
                            deadline = Instant::now() + period;
                            armed = true;
                        }
                        window.push(v);
                    }
                    Some(Err(e)) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        if !window.is_empty() {
                            let _ = tx.send(Ok(Value::tuple(window))).await;
                        }
                        break;
                    }
                },
                () = tokio::time::sleep_until(deadline), if armed => {
                    if !window.is_empty() {
                        let flushed = std::mem::take(&mut window);
                        if tx.send(Ok(Value::tuple(flushed))).await.is_err() {
                            break;
                        }
                    }
                    deadline += period;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple_ints(v: &Value) -> Vec<i64> {
        v.as_list()
            .unwrap()
            .iter()
            .map(|x| x.as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_buffer_chunks_and_flushes_remainder() {
        let out = Stream::from_values([1, 2, 3, 4, 5])
            .buffer(2)
            .to_array()
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(tuple_ints(&out[0]), vec![1, 2]);
        assert_eq!(tuple_ints(&out[1]), vec![3, 4]);
        assert_eq!(tuple_ints(&out[2]), vec![5]);
    }

    #[tokio::test]
    async fn test_buffer_exact_multiple() {
        let out = Stream::from_values([1, 2, 3, 4])
            .buffer(2)
            .to_array()
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(tuple_ints(&out[1]), vec![3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_time_splits_on_ticks() {
        use tokio::sync::mpsc;

        use crate::error::StreamError;

        let (feed, rx) = mpsc::channel::<Result<Value, StreamError>>(16);
        tokio::spawn(async move {
            let start = Instant::now();
            for (at_ms, value) in [(0u64, 1i64), (2, 2), (15, 3), (40, 4)] {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                if feed.send(Ok(Value::Int(value))).await.is_err() {
                    return;
                }
            }
        });

        // 10ms windows: [1, 2] flushed at the t=10 tick, [3] at the t=20
        // tick, [4] flushed on completion.
        let out = Stream::from_channel(rx)
            .buffer_time(Duration::from_millis(10))
            .to_array()
            .await
            .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(tuple_ints(&out[0]), vec![1, 2]);
        assert_eq!(tuple_ints(&out[1]), vec![3]);
        assert_eq!(tuple_ints(&out[2]), vec![4]);
    }

    #[tokio::test]
    async fn test_buffer_time_empty_stream() {
        let out = Stream::empty()
            .buffer_time(Duration::from_millis(5))
            .to_array()
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
