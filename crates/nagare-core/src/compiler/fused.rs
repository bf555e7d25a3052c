//! Fused per-item pipeline evaluation.
//!
//! A [`FusedPipeline`] binds a flattened operator list to fresh per-op
//! state (scan accumulator, take/skip cursors, opaque stages) and
//! evaluates whole items through the chain in one walk. The same instance
//! serves the sync path, the array kernels, and the async path, so state
//! carries over when execution switches variant mid-stream.

use std::sync::Arc;

use crate::error::{ErrorPolicy, StreamError};
use crate::operator::{FilterFn, MapFn, Op, OpaqueStage, ScanFn};
use crate::value::Value;

/// Outcome of pushing one item through a compiled pipeline.
#[derive(Debug)]
pub enum Step {
    /// The item produced a value.
    Emit(Value),
    /// The item produced a value and the stream is now complete
    /// (`take` reached its quota).
    Last(Value),
    /// The item was dropped by a stage; the stream continues.
    Skip,
    /// The stream is complete; no value for this item. The source must
    /// not be polled again.
    Done,
    /// The fault must surface to the consumer and close the stream.
    Fault(StreamError),
    /// The pipeline contains an async stage; evaluation must go through
    /// [`FusedPipeline::apply_async`]. The item is handed back untouched;
    /// no per-item state moved.
    AsyncDetected(Value),
}

/// Per-operator state, parallel to the operator list.
pub(crate) enum OpState {
    /// Operator carries no state.
    Stateless,
    /// Scan accumulator.
    Acc(Value),
    /// Take/skip cursor.
    Cursor(u32),
    /// Instantiated opaque stage.
    Stage(OpaqueStage),
}

/// Per-item outcome before the policy guard.
pub(crate) enum RawStep {
    Emit(Value),
    Last(Value),
    Skip,
    Done,
}

fn state_fault() -> StreamError {
    StreamError::operator("pipeline state desynchronized from operator list")
}

/// A compiled pipeline: operator list + per-instantiation state + policy.
pub struct FusedPipeline {
    ops: Arc<[Op]>,
    state: Vec<OpState>,
    policy: ErrorPolicy,
    has_async: bool,
    has_take: bool,
    stateless: bool,
    exhausted: bool,
}

impl FusedPipeline {
    /// Compiles an operator list under a policy, instantiating fresh
    /// state for every stateful operator.
    #[must_use]
    pub fn new(ops: Vec<Op>, policy: ErrorPolicy) -> Self {
        let has_async = ops.iter().any(Op::is_async);
        let has_take = ops.iter().any(|op| matches!(op, Op::Take(_)));
        let stateless = !ops.iter().any(Op::is_stateful);
        let state = ops
            .iter()
            .map(|op| match op {
                Op::Scan { seed, .. } => OpState::Acc(seed.clone()),
                Op::Take(_) | Op::Skip(_) => OpState::Cursor(0),
                Op::Opaque { factory, .. } => OpState::Stage(factory()),
                _ => OpState::Stateless,
            })
            .collect();

        Self {
            ops: Arc::from(ops),
            state,
            policy,
            has_async,
            has_take,
            stateless,
            exhausted: false,
        }
    }

    /// Returns the shared operator list.
    #[must_use]
    pub fn ops(&self) -> Arc<[Op]> {
        Arc::clone(&self.ops)
    }

    /// Returns the governing error policy.
    #[must_use]
    pub fn policy(&self) -> &ErrorPolicy {
        &self.policy
    }

    /// Returns true if the pipeline has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Returns true if any stage is asynchronous.
    #[must_use]
    pub fn has_async(&self) -> bool {
        self.has_async
    }

    /// Returns true if a `take` is present (forbids the unrolled kernel).
    #[must_use]
    pub fn has_take(&self) -> bool {
        self.has_take
    }

    /// Returns true if no operator carries state.
    #[must_use]
    pub fn is_stateless(&self) -> bool {
        self.stateless
    }

    /// Returns true once a `take` has consumed its quota; the source must
    /// not be polled further.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Evaluates one item through the chain with the policy guard.
    ///
    /// Returns [`Step::AsyncDetected`] - before touching any per-item
    /// state - when the pipeline contains an async stage; the caller
    /// reroutes this item and the remainder through
    /// [`apply_async`](Self::apply_async) on the *same* instance, so
    /// accumulators and cursors continue where the sync path left off.
    pub fn apply(&mut self, value: Value) -> Step {
        if self.exhausted {
            return Step::Done;
        }
        if self.has_async {
            return Step::AsyncDetected(value);
        }
        match self.step_sync(value) {
            Ok(raw) => raw.into(),
            Err(e) => self.resolve_fault(e),
        }
    }

    /// Evaluates one item, awaiting async stages in sequence.
    pub async fn apply_async(&mut self, value: Value) -> Step {
        if self.exhausted {
            return Step::Done;
        }
        match self.step_async(value).await {
            Ok(raw) => raw.into(),
            Err(e) => self.resolve_fault(e),
        }
    }

    /// Resolves a per-item fault through the policy.
    ///
    /// Type and kernel faults bypass the policy; a rescue value
    /// short-circuits the remaining operators for the item.
    pub(crate) fn resolve_fault(&self, error: StreamError) -> Step {
        if error.bypasses_policy() {
            return Step::Fault(error);
        }
        let step = match &self.policy {
            ErrorPolicy::Propagate | ErrorPolicy::Drop => Step::Skip,
            ErrorPolicy::Rescue(handler) => handler(&error).map_or(Step::Skip, Step::Emit),
            ErrorPolicy::Terminate => Step::Fault(error),
        };
        // A fault on the item that exhausted `take` still ends the stream.
        match step {
            Step::Emit(v) if self.exhausted => Step::Last(v),
            Step::Skip if self.exhausted => Step::Done,
            other => other,
        }
    }

    /// The policy-free per-item step shared by `apply` and the array
    /// kernels. Faults are returned raw for the caller to resolve.
    pub(crate) fn step_sync(&mut self, value: Value) -> Result<RawStep, StreamError> {
        let mut v = value;
        let mut last = false;
        for i in 0..self.ops.len() {
            let passed: Option<Value> = match &self.ops[i] {
                Op::Map(MapFn::Sync(f)) => Some(f(v)?),
                Op::Filter(FilterFn::Sync(p)) => {
                    if p(&v)? {
                        Some(v)
                    } else {
                        None
                    }
                }
                Op::Scan {
                    f: ScanFn::Sync(f), ..
                } => {
                    let OpState::Acc(acc) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    let next = f(acc.clone(), v)?;
                    *acc = next.clone();
                    Some(next)
                }
                Op::Take(n) => {
                    let OpState::Cursor(seen) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    if *seen >= *n {
                        self.exhausted = true;
                        return Ok(RawStep::Done);
                    }
                    *seen += 1;
                    if *seen == *n {
                        self.exhausted = true;
                        last = true;
                    }
                    Some(v)
                }
                Op::Skip(n) => {
                    let OpState::Cursor(seen) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    if *seen < *n {
                        *seen += 1;
                        None
                    } else {
                        Some(v)
                    }
                }
                Op::Kernel { params, func, .. } => {
                    let batch = v.expect_batch()?;
                    Some(Value::Batch(func(batch, params)?))
                }
                Op::Opaque { .. } => {
                    let OpState::Stage(stage) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    stage(v)?
                }
                Op::Map(MapFn::Async(_))
                | Op::Filter(FilterFn::Async(_))
                | Op::Scan {
                    f: ScanFn::Async(_),
                    ..
                } => {
                    // `apply` screens on has_async before any state moves.
                    return Err(StreamError::operator("async stage reached the sync path"));
                }
            };
            match passed {
                Some(next) => v = next,
                None if last => return Ok(RawStep::Done),
                None => return Ok(RawStep::Skip),
            }
        }
        if last {
            Ok(RawStep::Last(v))
        } else {
            Ok(RawStep::Emit(v))
        }
    }

    async fn step_async(&mut self, value: Value) -> Result<RawStep, StreamError> {
        let ops = Arc::clone(&self.ops);
        let mut v = value;
        let mut last = false;
        for (i, op) in ops.iter().enumerate() {
            let passed: Option<Value> = match op {
                Op::Map(MapFn::Sync(f)) => Some(f(v)?),
                Op::Map(MapFn::Async(f)) => Some(f(v).await?),
                Op::Filter(FilterFn::Sync(p)) => {
                    if p(&v)? {
                        Some(v)
                    } else {
                        None
                    }
                }
                Op::Filter(FilterFn::Async(p)) => {
                    if p(v.clone()).await? {
                        Some(v)
                    } else {
                        None
                    }
                }
                Op::Scan { f, .. } => {
                    let acc = match &self.state[i] {
                        OpState::Acc(acc) => acc.clone(),
                        _ => return Err(state_fault()),
                    };
                    let next = match f {
                        ScanFn::Sync(f) => f(acc, v)?,
                        ScanFn::Async(f) => f(acc, v).await?,
                    };
                    if let OpState::Acc(acc) = &mut self.state[i] {
                        *acc = next.clone();
                    }
                    Some(next)
                }
                Op::Take(n) => {
                    let OpState::Cursor(seen) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    if *seen >= *n {
                        self.exhausted = true;
                        return Ok(RawStep::Done);
                    }
                    *seen += 1;
                    if *seen == *n {
                        self.exhausted = true;
                        last = true;
                    }
                    Some(v)
                }
                Op::Skip(n) => {
                    let OpState::Cursor(seen) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    if *seen < *n {
                        *seen += 1;
                        None
                    } else {
                        Some(v)
                    }
                }
                Op::Kernel { params, func, .. } => {
                    let batch = v.expect_batch()?;
                    Some(Value::Batch(func(batch, params)?))
                }
                Op::Opaque { .. } => {
                    let OpState::Stage(stage) = &mut self.state[i] else {
                        return Err(state_fault());
                    };
                    stage(v)?
                }
            };
            match passed {
                Some(next) => v = next,
                None if last => return Ok(RawStep::Done),
                None => return Ok(RawStep::Skip),
            }
        }
        if last {
            Ok(RawStep::Last(v))
        } else {
            Ok(RawStep::Emit(v))
        }
    }
}

impl From<RawStep> for Step {
    fn from(raw: RawStep) -> Self {
        match raw {
            RawStep::Emit(v) => Step::Emit(v),
            RawStep::Last(v) => Step::Last(v),
            RawStep::Skip => Step::Skip,
            RawStep::Done => Step::Done,
        }
    }
}

/// Evaluates one item through a *stateless* chain with no shared state,
/// for the bounded-concurrency collect path.
///
/// Returns `Ok(Some(v))` to emit, `Ok(None)` to drop, `Err` to terminate.
///
/// # Errors
///
/// Propagates unconditional faults, faults under a `Terminate` policy,
/// and misuse (a stateful operator on this path).
pub async fn eval_stateless(
    ops: Arc<[Op]>,
    policy: ErrorPolicy,
    value: Value,
) -> Result<Option<Value>, StreamError> {
    let mut v = value;
    for op in ops.iter() {
        let evaluated: Result<Option<Value>, StreamError> = match op {
            Op::Map(MapFn::Sync(f)) => f(v).map(Some),
            Op::Map(MapFn::Async(f)) => f(v).await.map(Some),
            Op::Filter(FilterFn::Sync(p)) => match p(&v) {
                Ok(true) => Ok(Some(v)),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            },
            Op::Filter(FilterFn::Async(p)) => match p(v.clone()).await {
                Ok(true) => Ok(Some(v)),
                Ok(false) => Ok(None),
                Err(e) => Err(e),
            },
            Op::Kernel { params, func, .. } => match v.expect_batch() {
                Ok(batch) => func(batch, params)
                    .map(|out| Some(Value::Batch(out)))
                    .map_err(StreamError::from),
                Err(e) => Err(e.into()),
            },
            _ => Err(StreamError::operator(
                "stateful operator on the concurrent path",
            )),
        };
        match evaluated {
            Ok(Some(next)) => v = next,
            Ok(None) => return Ok(None),
            Err(e) => {
                if e.bypasses_policy() {
                    return Err(e);
                }
                return match &policy {
                    ErrorPolicy::Propagate | ErrorPolicy::Drop => Ok(None),
                    ErrorPolicy::Rescue(handler) => Ok(handler(&e)),
                    ErrorPolicy::Terminate => Err(e),
                };
            }
        }
    }
    Ok(Some(v))
}
