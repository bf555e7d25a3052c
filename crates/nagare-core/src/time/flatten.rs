//! Higher-order operators: `concat_map` and `switch_map`.

use std::sync::Arc;

use futures::stream::StreamExt;

use crate::stream::{Stream, ValueStream};
use crate::value::Value;

use super::queue::spawn_op;

/// Maps each outer item to an inner stream.
pub(crate) type InnerFn = Arc<dyn Fn(Value) -> Stream + Send + Sync>;

/// Fully drains each inner stream before advancing to the next outer
/// item; inner emissions keep their order.
pub(crate) fn concat_map(parent: Stream, f: InnerFn) -> Stream {
    spawn_op("concat_map", move |tx, token| async move {
        let mut upstream = parent.into_value_stream();
        'outer: loop {
            let item = tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next() => item,
            };
            match item {
                Some(Ok(v)) => {
                    let mut inner = f(v).into_value_stream();
                    loop {
                        let inner_item = tokio::select! {
                            () = token.cancelled() => break 'outer,
                            item = inner.next() => item,
                        };
                        match inner_item {
                            Some(it) => {
                                if tx.send(it).await.is_err() {
                                    break 'outer;
                                }
                            }
                            None => break,
                        }
                    }
                }
                Some(Err(e)) => {
                    if tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    })
}

/// Switches to a fresh inner stream on every outer item, cancelling the
/// previous inner. Emissions after a switch belong to the latest inner
/// only.
pub(crate) fn switch_map(parent: Stream, f: InnerFn) -> Stream {
    spawn_op("switch_map", move |tx, token| async move {
        let mut upstream = parent.into_value_stream().fuse();
        let mut inner: Option<ValueStream> = None;
        let mut outer_done = false;
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                item = upstream.next(), if !outer_done => match item {
                    Some(Ok(v)) => {
                        // Replacing the previous inner drops it, which
                        // aborts any producers feeding it.
                        inner = Some(f(v).into_value_stream());
                    }
                    Some(Err(e)) => {
                        if tx.send(Err(e)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        outer_done = true;
                        if inner.is_none() {
                            break;
                        }
                    }
                },
                item = async {
                    match inner.as_mut() {
                        Some(active) => active.next().await,
                        None => None,
                    }
                }, if inner.is_some() => match item {
                    Some(it) => {
                        if tx.send(it).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        inner = None;
                        if outer_done {
                            break;
                        }
                    }
                },
            }
        }
    })
}
