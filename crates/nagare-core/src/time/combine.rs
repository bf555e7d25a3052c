//! Multi-stream combinators: `merge`, `zip`, and `combine_latest`.

use futures::stream::{self, StreamExt};

use crate::stream::Stream;
use crate::value::Value;

use super::queue::spawn_op;

/// Interleaves all sources in arrival order.
///
/// Per-source order is preserved; no order is guaranteed across sources.
/// Completes once every source has completed.
#[must_use]
pub fn merge(streams: Vec<Stream>) -> Stream {
    spawn_op("merge", move |tx, token| async move {
        let mut all = stream::select_all(streams.into_iter().map(Stream::into_value_stream));
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = all.next() => match item {
                    Some(it) => {
                        if tx.send(it).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    })
}

/// Pairs the n-th item of every source into a tuple; completes as soon
/// as any source completes.
#[must_use]
pub fn zip(streams: Vec<Stream>) -> Stream {
    spawn_op("zip", move |tx, token| async move {
        let mut inputs: Vec<_> = streams
            .into_iter()
            .map(Stream::into_value_stream)
            .collect();
        if inputs.is_empty() {
            return;
        }
        'outer: loop {
            let mut tuple = Vec::with_capacity(inputs.len());
            for input in &mut inputs {
                let item = tokio::select! {
                    () = token.cancelled() => break 'outer,
                    item = input.next() => item,
                };
                match item {
                    Some(Ok(v)) => tuple.push(v),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(e)).await;
                        break 'outer;
                    }
                    None => break 'outer,
                }
            }
            if tx.send(Ok(Value::tuple(tuple))).await.is_err() {
                break;
            }
        }
    })
}

/// Sequential combination of sources into tuples; alias of [`zip`].
#[must_use]
pub fn combine(streams: Vec<Stream>) -> Stream {
    zip(streams)
}

/// Emits the tuple of latest values whenever any source yields, once
/// every source has produced at least one value.
#[must_use]
pub fn combine_latest(streams: Vec<Stream>) -> Stream {
    spawn_op("combine_latest", move |tx, token| async move {
        let width = streams.len();
        if width == 0 {
            return;
        }
        let indexed = streams.into_iter().enumerate().map(|(i, s)| {
            s.into_value_stream().map(move |item| (i, item)).boxed()
        });
        let mut all = stream::select_all(indexed);
        let mut latest: Vec<Option<Value>> = vec![None; width];
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                next = all.next() => match next {
                    Some((i, Ok(v))) => {
                        latest[i] = Some(v);
                        if latest.iter().all(Option::is_some) {
                            let tuple = Value::tuple(
                                latest.iter().map(|o| o.clone().unwrap_or_default()).collect(),
                            );
                            if tx.send(Ok(tuple)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some((_, Err(e))) => {
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                    None => break,
                },
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use tokio::time::Instant;

    use crate::error::StreamError;

    use super::*;

    fn timed_source(items: Vec<(u64, Value)>) -> Stream {
        let (tx, rx) = mpsc::channel::<Result<Value, StreamError>>(16);
        tokio::spawn(async move {
            let start = Instant::now();
            for (at_ms, value) in items {
                tokio::time::sleep_until(start + Duration::from_millis(at_ms)).await;
                if tx.send(Ok(value)).await.is_err() {
                    return;
                }
            }
        });
        Stream::from_channel(rx)
    }

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_merge_preserves_per_source_order() {
        let a = Stream::from_values([1, 2, 3]);
        let b = Stream::from_values([10, 20]);
        let out = a.merge(b).to_array().await.unwrap();

        assert_eq!(out.len(), 5);
        let got = ints(&out);
        let from_a: Vec<i64> = got.iter().copied().filter(|&x| x < 10).collect();
        let from_b: Vec<i64> = got.iter().copied().filter(|&x| x >= 10).collect();
        assert_eq!(from_a, vec![1, 2, 3]);
        assert_eq!(from_b, vec![10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_interleaves_in_arrival_order() {
        let a = timed_source(vec![(0, Value::Int(1)), (20, Value::Int(3))]);
        let b = timed_source(vec![(10, Value::Int(2)), (30, Value::Int(4))]);
        let out = merge(vec![a, b]).to_array().await.unwrap();
        assert_eq!(ints(&out), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_zip_completes_on_shortest() {
        let a = Stream::from_values([1, 2, 3]);
        let b = Stream::from_values([10, 20]);
        let out = a.zip(b).to_array().await.unwrap();

        assert_eq!(out.len(), 2);
        let first = out[0].as_list().unwrap();
        assert_eq!(first[0], Value::Int(1));
        assert_eq!(first[1], Value::Int(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_combine_latest_waits_for_all_then_tracks_latest() {
        // A: a1@10, a2@30. B: 1@20, 2@40. Expected (a1,1), (a2,1), (a2,2).
        let a = timed_source(vec![(10, Value::from("a1")), (30, Value::from("a2"))]);
        let b = timed_source(vec![(20, Value::Int(1)), (40, Value::Int(2))]);
        let out = a.combine_latest(b).to_array().await.unwrap();

        let pairs: Vec<(String, i64)> = out
            .iter()
            .map(|v| {
                let items = v.as_list().unwrap();
                (
                    items[0].as_str().unwrap().to_owned(),
                    items[1].as_i64().unwrap(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("a1".to_owned(), 1),
                ("a2".to_owned(), 1),
                ("a2".to_owned(), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_of_nothing_completes() {
        let out = merge(Vec::new()).to_array().await.unwrap();
        assert!(out.is_empty());
    }
}
