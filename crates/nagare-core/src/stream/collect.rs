//! Finalizers and execution dispatch.
//!
//! Materializing a pipeline picks the cheapest legal path:
//!
//! 1. Dense base (`Array`/`Batch`) + fusion on + all-sync stages → array
//!    kernel, unrolled when large enough and no `take` is present.
//! 2. Dense base + async stage → async fused path; stateless chains fan
//!    out with bounded concurrency and input-order results, stateful
//!    chains evaluate sequentially so cursors and accumulators stay
//!    coherent.
//! 3. Everything else → generic async iteration, fused per item (or
//!    interpreted when fusion is disabled).
//!
//! A sync fused evaluation that reports an async stage hands the item and
//! the remainder of the stream to the async evaluator on the *same*
//! pipeline instance; no cursor or accumulator resets.

use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::compiler::{eval_stateless, FusedPipeline, Interpreter, KernelExit, Step};
use crate::config::{EngineConfig, JitMode};
use crate::error::{ErrorPolicy, StreamError};
use crate::operator::Op;
use crate::value::Value;

use super::{Pipeline, Source, Stream};

/// Boxed async stream of pipeline output, as exposed by
/// [`Stream::into_stream`].
pub type ValueStream = BoxStream<'static, Result<Value, StreamError>>;

/// Evaluates one item, resolving a sync→async handoff on the spot.
async fn drive(fused: &mut FusedPipeline, value: Value) -> Step {
    if fused.has_async() {
        return fused.apply_async(value).await;
    }
    match fused.apply(value) {
        Step::AsyncDetected(v) => fused.apply_async(v).await,
        step => step,
    }
}

impl Stream {
    /// Exposes the pipeline as a pull-based async stream of results.
    ///
    /// Dropping the stream cancels any background producers feeding it.
    #[must_use]
    pub fn into_stream(self) -> ValueStream {
        self.into_value_stream()
    }

    pub(crate) fn into_value_stream(self) -> ValueStream {
        let config = EngineConfig::snapshot();
        let Pipeline { base, ops, policy } = self.flatten();
        let raw = base.into_item_stream();
        if ops.is_empty() {
            return raw;
        }
        if config.fusion_enabled {
            fused_value_stream(raw, FusedPipeline::new(ops, policy))
        } else {
            interp_value_stream(raw, Interpreter::new(ops, policy))
        }
    }

    /// Materializes every emission into a vector.
    ///
    /// # Errors
    ///
    /// Surfaces source faults, unconditional faults, and operator faults
    /// under a `Terminate` policy.
    pub async fn to_array(self) -> Result<Vec<Value>, StreamError> {
        let config = EngineConfig::snapshot();
        let Pipeline { base, ops, policy } = self.flatten();
        match base {
            Source::Array(values) => collect_dense(values, ops, policy, &config).await,
            Source::Batch(batch) => {
                let values = batch
                    .as_slice()
                    .iter()
                    .map(|&x| Value::Float(f64::from(x)))
                    .collect();
                collect_dense(values, ops, policy, &config).await
            }
            other => collect_stream(other.into_item_stream(), ops, policy, &config).await,
        }
    }

    /// Returns the first emission, if any.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn first(self) -> Result<Option<Value>, StreamError> {
        let mut items = self.into_value_stream();
        match items.next().await {
            None | Some(Err(StreamError::Cancelled)) => Ok(None),
            Some(Ok(v)) => Ok(Some(v)),
            Some(Err(e)) => Err(e),
        }
    }

    /// Returns the final emission, if any.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn last(self) -> Result<Option<Value>, StreamError> {
        let mut items = self.into_value_stream();
        let mut last = None;
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(last),
                Some(Ok(v)) => last = Some(v),
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Counts emissions.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn count(self) -> Result<usize, StreamError> {
        let mut items = self.into_value_stream();
        let mut n = 0;
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(n),
                Some(Ok(_)) => n += 1,
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Returns true if every emission satisfies the predicate.
    /// Short-circuits on the first failure.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn all<F>(self, predicate: F) -> Result<bool, StreamError>
    where
        F: Fn(&Value) -> bool,
    {
        let mut items = self.into_value_stream();
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(true),
                Some(Ok(v)) if predicate(&v) => {}
                Some(Ok(_)) => return Ok(false),
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Returns true if any emission satisfies the predicate.
    /// Short-circuits on the first hit.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn some<F>(self, predicate: F) -> Result<bool, StreamError>
    where
        F: Fn(&Value) -> bool,
    {
        let mut items = self.into_value_stream();
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(false),
                Some(Ok(v)) if predicate(&v) => return Ok(true),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Folds all emissions into a single value.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn reduce<F>(self, f: F, seed: impl Into<Value>) -> Result<Value, StreamError>
    where
        F: Fn(Value, Value) -> Value,
    {
        let mut items = self.into_value_stream();
        let mut acc = seed.into();
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(acc),
                Some(Ok(v)) => acc = f(acc, v),
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Drives the pipeline, invoking the callback per emission.
    ///
    /// # Errors
    ///
    /// Same as [`to_array`](Self::to_array).
    pub async fn for_each<F>(self, mut f: F) -> Result<(), StreamError>
    where
        F: FnMut(Value),
    {
        let mut items = self.into_value_stream();
        loop {
            match items.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(()),
                Some(Ok(v)) => f(v),
                Some(Err(e)) => return Err(e),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dense collection
// ---------------------------------------------------------------------------

async fn collect_dense(
    values: Vec<Value>,
    ops: Vec<Op>,
    policy: ErrorPolicy,
    config: &EngineConfig,
) -> Result<Vec<Value>, StreamError> {
    if ops.is_empty() {
        return Ok(values);
    }

    if !config.fusion_enabled {
        debug!(items = values.len(), "collect: fusion disabled, interpreting");
        let raw = stream::iter(values.into_iter().map(Ok)).boxed();
        return collect_stream(raw, ops, policy, config).await;
    }

    let fused = FusedPipeline::new(ops, policy);

    if fused.has_async() {
        return collect_dense_async(values, fused, config).await;
    }

    if config.jit == JitMode::Off {
        debug!(items = values.len(), "collect: per-item fused path (kernels off)");
        return collect_per_item(values, fused);
    }

    collect_kernel(&values, fused, config)
}

fn collect_per_item(
    values: Vec<Value>,
    mut fused: FusedPipeline,
) -> Result<Vec<Value>, StreamError> {
    let mut out = Vec::new();
    for value in values {
        match fused.apply(value) {
            Step::Emit(v) => out.push(v),
            Step::Last(v) => {
                out.push(v);
                break;
            }
            Step::Skip => {}
            Step::Done => break,
            Step::Fault(e) => return Err(e),
            Step::AsyncDetected(_) => {
                // Screened by has_async before this path is chosen.
                return Err(StreamError::operator("async stage on the sync path"));
            }
        }
    }
    Ok(out)
}

fn collect_kernel(
    values: &[Value],
    mut fused: FusedPipeline,
    config: &EngineConfig,
) -> Result<Vec<Value>, StreamError> {
    let unrolled = !fused.has_take() && values.len() >= config.unroll_threshold;
    debug!(items = values.len(), unrolled, "collect: array kernel path");

    let mut out = Vec::new();
    let mut index = 0;
    while index < values.len() {
        let exit = if unrolled {
            fused.run_kernel_unrolled(values, index, &mut out)
        } else {
            fused.run_kernel_scalar(values, index, &mut out)
        };
        match exit {
            KernelExit::Completed | KernelExit::TakeExhausted => break,
            KernelExit::Fault { index: at, error } => {
                // Resolve the one faulting item through the guarded path,
                // then resume the kernel right after it.
                match fused.resolve_fault(error) {
                    Step::Emit(v) => out.push(v),
                    Step::Last(v) => {
                        out.push(v);
                        return Ok(out);
                    }
                    Step::Skip => {}
                    Step::Done => return Ok(out),
                    Step::Fault(e) => return Err(e),
                    Step::AsyncDetected(_) => {}
                }
                index = at + 1;
            }
        }
    }
    Ok(out)
}

async fn collect_dense_async(
    values: Vec<Value>,
    mut fused: FusedPipeline,
    config: &EngineConfig,
) -> Result<Vec<Value>, StreamError> {
    if fused.is_stateless() {
        debug!(
            items = values.len(),
            concurrency = config.async_concurrency,
            "collect: bounded-concurrency async path"
        );
        let ops = fused.ops();
        let policy = fused.policy().clone();
        // `buffered` keeps up to `async_concurrency` items in flight and
        // yields results in input order regardless of completion order.
        let mut results = stream::iter(
            values
                .into_iter()
                .map(move |v| eval_stateless(Arc::clone(&ops), policy.clone(), v)),
        )
        .buffered(config.async_concurrency.max(1));

        let mut out = Vec::new();
        while let Some(result) = results.next().await {
            match result {
                Ok(Some(v)) => out.push(v),
                Ok(None) => {}
                Err(e) => return Err(e),
            }
        }
        return Ok(out);
    }

    debug!(items = values.len(), "collect: sequential async path (stateful)");
    let mut out = Vec::new();
    for value in values {
        match fused.apply_async(value).await {
            Step::Emit(v) => out.push(v),
            Step::Last(v) => {
                out.push(v);
                break;
            }
            Step::Skip => {}
            Step::Done => break,
            Step::Fault(e) => return Err(e),
            Step::AsyncDetected(_) => {}
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Generic collection
// ---------------------------------------------------------------------------

async fn collect_stream(
    mut raw: ValueStream,
    ops: Vec<Op>,
    policy: ErrorPolicy,
    config: &EngineConfig,
) -> Result<Vec<Value>, StreamError> {
    let mut out = Vec::new();

    if ops.is_empty() {
        loop {
            match raw.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(out),
                Some(Ok(v)) => out.push(v),
                Some(Err(e)) => return Err(e),
            }
        }
    }

    if config.fusion_enabled {
        let mut fused = FusedPipeline::new(ops, policy);
        loop {
            let value = match raw.next().await {
                None | Some(Err(StreamError::Cancelled)) => return Ok(out),
                Some(Ok(v)) => v,
                Some(Err(e)) => return Err(e),
            };
            match drive(&mut fused, value).await {
                Step::Emit(v) => out.push(v),
                Step::Last(v) => {
                    out.push(v);
                    return Ok(out);
                }
                Step::Skip => {}
                Step::Done => return Ok(out),
                Step::Fault(e) => return Err(e),
                Step::AsyncDetected(_) => {}
            }
        }
    }

    let mut interp = Interpreter::new(ops, policy);
    loop {
        let value = match raw.next().await {
            None | Some(Err(StreamError::Cancelled)) => return Ok(out),
            Some(Ok(v)) => v,
            Some(Err(e)) => return Err(e),
        };
        match interp.apply(value).await {
            Step::Emit(v) => out.push(v),
            Step::Last(v) => {
                out.push(v);
                return Ok(out);
            }
            Step::Skip => {}
            Step::Done => return Ok(out),
            Step::Fault(e) => return Err(e),
            Step::AsyncDetected(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming adapters
// ---------------------------------------------------------------------------

struct FusedDrive {
    raw: ValueStream,
    fused: FusedPipeline,
    done: bool,
}

fn fused_value_stream(raw: ValueStream, fused: FusedPipeline) -> ValueStream {
    let state = FusedDrive {
        raw,
        fused,
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            match st.raw.next().await {
                None | Some(Err(StreamError::Cancelled)) => return None,
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                Some(Ok(value)) => match drive(&mut st.fused, value).await {
                    Step::Emit(v) => return Some((Ok(v), st)),
                    Step::Last(v) => {
                        st.done = true;
                        return Some((Ok(v), st));
                    }
                    Step::Skip => {}
                    Step::Done => return None,
                    Step::Fault(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                    Step::AsyncDetected(_) => {}
                },
            }
        }
    })
    .boxed()
}

struct InterpDrive {
    raw: ValueStream,
    interp: Interpreter,
    done: bool,
}

fn interp_value_stream(raw: ValueStream, interp: Interpreter) -> ValueStream {
    let state = InterpDrive {
        raw,
        interp,
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }
        loop {
            match st.raw.next().await {
                None | Some(Err(StreamError::Cancelled)) => return None,
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(e), st));
                }
                Some(Ok(value)) => match st.interp.apply(value).await {
                    Step::Emit(v) => return Some((Ok(v), st)),
                    Step::Last(v) => {
                        st.done = true;
                        return Some((Ok(v), st));
                    }
                    Step::Skip => {}
                    Step::Done => return None,
                    Step::Fault(e) => {
                        st.done = true;
                        return Some((Err(e), st));
                    }
                    Step::AsyncDetected(_) => {}
                },
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[tokio::test]
    async fn test_map_filter_to_array() {
        let out = Stream::from_values([1, 2, 3, 4, 5])
            .map(|v| Value::Int(v.as_i64().unwrap_or(0) * 2))
            .filter(|v| v.as_i64().unwrap_or(0) > 5)
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![6, 8, 10]);
    }

    #[tokio::test]
    async fn test_scan_to_array_and_last() {
        let sum = |acc: Value, v: Value| {
            Value::Int(acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0))
        };
        let out = Stream::from_values([1, 2, 3, 4, 5])
            .scan(sum, 0)
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 3, 6, 10, 15]);

        let last = Stream::from_values([1, 2, 3, 4, 5])
            .scan(sum, 0)
            .last()
            .await
            .unwrap();
        assert_eq!(last, Some(Value::Int(15)));
    }

    #[tokio::test]
    async fn test_take_skip_to_array() {
        let out = Stream::from_values([1, 2, 3, 4, 5])
            .take(3)
            .skip(1)
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_first_count_all_some_reduce() {
        let src = || Stream::from_values([1, 2, 3, 4]);

        assert_eq!(src().first().await.unwrap(), Some(Value::Int(1)));
        assert_eq!(src().count().await.unwrap(), 4);
        assert!(src().all(|v| v.as_i64().unwrap() > 0).await.unwrap());
        assert!(!src().all(|v| v.as_i64().unwrap() > 2).await.unwrap());
        assert!(src().some(|v| v.as_i64().unwrap() == 3).await.unwrap());
        assert!(!src().some(|v| v.as_i64().unwrap() == 9).await.unwrap());

        let total = src()
            .reduce(
                |acc, v| Value::Int(acc.as_i64().unwrap() + v.as_i64().unwrap()),
                0,
            )
            .await
            .unwrap();
        assert_eq!(total, Value::Int(10));
    }

    #[tokio::test]
    async fn test_empty_to_array() {
        let out = Stream::empty().to_array().await.unwrap();
        assert!(out.is_empty());

        let out = Stream::empty()
            .map(|v| v)
            .take(3)
            .to_array()
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_rescue_recovers_faulting_items() {
        let out = Stream::from_values([1, 2, 3])
            .try_map(|v| {
                if v.as_i64() == Some(2) {
                    Err(StreamError::operator("boom"))
                } else {
                    Ok(v)
                }
            })
            .rescue(|_| Some(Value::Int(99)))
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 99, 3]);
    }

    #[tokio::test]
    async fn test_terminate_policy_errors_to_array() {
        let result = Stream::from_values([1, 2, 3])
            .try_map(|v| {
                if v.as_i64() == Some(2) {
                    Err(StreamError::operator("boom"))
                } else {
                    Ok(v)
                }
            })
            .terminate_on_error()
            .to_array()
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_async_map_preserves_input_order() {
        let out = Stream::from_values((0..500).collect::<Vec<i64>>())
            .map_async(|v| async move {
                let n = v.as_i64().unwrap_or(0);
                // Later items finish sooner; output must stay in input order.
                tokio::time::sleep(std::time::Duration::from_micros(500 - u64::try_from(n).unwrap_or(0))).await;
                Ok(Value::Int(n * 2))
            })
            .to_array()
            .await
            .unwrap();
        let expected: Vec<i64> = (0..500).map(|n| n * 2).collect();
        assert_eq!(ints(&out), expected);
    }

    #[tokio::test]
    async fn test_stateful_async_chain_sequential() {
        let out = Stream::from_values([1, 2, 3])
            .map_async(|v| async move { Ok(v) })
            .scan(
                |acc, v| Value::Int(acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0)),
                0,
            )
            .to_array()
            .await
            .unwrap();
        assert_eq!(ints(&out), vec![1, 3, 6]);
    }

    #[tokio::test]
    async fn test_into_stream_adapter() {
        let mut items = Stream::from_values([1, 2, 3])
            .map(|v| Value::Int(v.as_i64().unwrap_or(0) + 10))
            .into_stream();
        let mut got = Vec::new();
        while let Some(item) = items.next().await {
            got.push(item.unwrap().as_i64().unwrap());
        }
        assert_eq!(got, vec![11, 12, 13]);
    }

    #[tokio::test]
    async fn test_batch_source_streams_floats() {
        let out = Stream::from_f32_batch(crate::value::F32Batch::from_vec(vec![1.0, 2.0]))
            .map(|v| Value::Float(v.as_f64().unwrap_or(0.0) * 3.0))
            .to_array()
            .await
            .unwrap();
        assert_eq!(out, vec![Value::Float(3.0), Value::Float(6.0)]);
    }
}
