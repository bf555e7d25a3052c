//! Reference interpreter.
//!
//! The deliberately simple evaluator: one stage at a time, one item at a
//! time, no kernels, no unrolling, no policy-free inner step. Runs when
//! fusion is disabled and serves as the oracle the fused variants are
//! checked against - if an optimized path and this walk ever disagree,
//! the optimized path is wrong.

use crate::error::{ErrorPolicy, StreamError};
use crate::kernel::{KernelFn, KernelParams};
use crate::operator::{FilterFn, MapFn, Op, OpaqueStage, ScanFn};
use crate::value::Value;

use super::fused::Step;

/// One instantiated stage with its state inline.
enum InterpStage {
    Map(MapFn),
    Filter(FilterFn),
    Scan { f: ScanFn, acc: Value },
    Take { n: u32, seen: u32 },
    Skip { n: u32, seen: u32 },
    Kernel { params: KernelParams, func: KernelFn },
    Opaque(OpaqueStage),
}

/// The unfused pipeline evaluator.
pub struct Interpreter {
    stages: Vec<InterpStage>,
    policy: ErrorPolicy,
    exhausted: bool,
}

impl Interpreter {
    /// Instantiates the operator list with fresh state.
    #[must_use]
    pub fn new(ops: Vec<Op>, policy: ErrorPolicy) -> Self {
        let stages = ops
            .into_iter()
            .map(|op| match op {
                Op::Map(f) => InterpStage::Map(f),
                Op::Filter(p) => InterpStage::Filter(p),
                Op::Scan { f, seed } => InterpStage::Scan { f, acc: seed },
                Op::Take(n) => InterpStage::Take { n, seen: 0 },
                Op::Skip(n) => InterpStage::Skip { n, seen: 0 },
                Op::Kernel { params, func, .. } => InterpStage::Kernel { params, func },
                Op::Opaque { factory, .. } => InterpStage::Opaque(factory()),
            })
            .collect();

        Self {
            stages,
            policy,
            exhausted: false,
        }
    }

    /// Returns true once a `take` consumed its quota.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Evaluates one item through every stage in order.
    pub async fn apply(&mut self, value: Value) -> Step {
        if self.exhausted {
            return Step::Done;
        }

        let mut v = value;
        let mut last = false;
        for i in 0..self.stages.len() {
            let evaluated: Result<Option<Value>, StreamError> = match &mut self.stages[i] {
                InterpStage::Map(MapFn::Sync(f)) => f(v).map(Some),
                InterpStage::Map(MapFn::Async(f)) => f(v).await.map(Some),
                InterpStage::Filter(FilterFn::Sync(p)) => match p(&v) {
                    Ok(true) => Ok(Some(v)),
                    Ok(false) => Ok(None),
                    Err(e) => Err(e),
                },
                InterpStage::Filter(FilterFn::Async(p)) => match p(v.clone()).await {
                    Ok(true) => Ok(Some(v)),
                    Ok(false) => Ok(None),
                    Err(e) => Err(e),
                },
                InterpStage::Scan { f, acc } => {
                    let folded = match f {
                        ScanFn::Sync(f) => f(acc.clone(), v),
                        ScanFn::Async(f) => f(acc.clone(), v).await,
                    };
                    match folded {
                        Ok(next) => {
                            *acc = next.clone();
                            Ok(Some(next))
                        }
                        Err(e) => Err(e),
                    }
                }
                InterpStage::Take { n, seen } => {
                    if *seen >= *n {
                        self.exhausted = true;
                        return Step::Done;
                    }
                    *seen += 1;
                    if *seen == *n {
                        self.exhausted = true;
                        last = true;
                    }
                    Ok(Some(v))
                }
                InterpStage::Skip { n, seen } => {
                    if *seen < *n {
                        *seen += 1;
                        Ok(None)
                    } else {
                        Ok(Some(v))
                    }
                }
                InterpStage::Kernel { params, func } => match v.expect_batch() {
                    Ok(batch) => func(batch, params)
                        .map(|out| Some(Value::Batch(out)))
                        .map_err(StreamError::from),
                    Err(e) => Err(e.into()),
                },
                InterpStage::Opaque(stage) => stage(v),
            };

            match evaluated {
                Ok(Some(next)) => v = next,
                Ok(None) if last => return Step::Done,
                Ok(None) => return Step::Skip,
                Err(e) => return self.resolve(e),
            }
        }

        if last {
            Step::Last(v)
        } else {
            Step::Emit(v)
        }
    }

    fn resolve(&self, error: StreamError) -> Step {
        if error.bypasses_policy() {
            return Step::Fault(error);
        }
        let step = match &self.policy {
            ErrorPolicy::Propagate | ErrorPolicy::Drop => Step::Skip,
            ErrorPolicy::Rescue(handler) => handler(&error).map_or(Step::Skip, Step::Emit),
            ErrorPolicy::Terminate => Step::Fault(error),
        };
        match step {
            Step::Emit(v) if self.exhausted => Step::Last(v),
            Step::Skip if self.exhausted => Step::Done,
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::FusedPipeline;
    use super::*;

    fn double() -> Op {
        Op::Map(MapFn::Sync(Arc::new(|v| {
            Ok(Value::Int(v.as_i64().unwrap_or(0) * 2))
        })))
    }

    fn over(limit: i64) -> Op {
        Op::Filter(FilterFn::Sync(Arc::new(move |v| {
            Ok(v.as_i64().unwrap_or(0) > limit)
        })))
    }

    fn sum_scan() -> Op {
        Op::Scan {
            f: ScanFn::Sync(Arc::new(|acc, v| {
                Ok(Value::Int(
                    acc.as_i64().unwrap_or(0) + v.as_i64().unwrap_or(0),
                ))
            })),
            seed: Value::Int(0),
        }
    }

    async fn interpret(ops: Vec<Op>, input: &[i64]) -> Vec<i64> {
        let mut interp = Interpreter::new(ops, ErrorPolicy::Drop);
        let mut out = Vec::new();
        for &x in input {
            match interp.apply(Value::Int(x)).await {
                Step::Emit(v) => out.push(v.as_i64().unwrap()),
                Step::Last(v) => {
                    out.push(v.as_i64().unwrap());
                    break;
                }
                Step::Skip => {}
                Step::Done => break,
                Step::Fault(e) => panic!("fault: {e}"),
                Step::AsyncDetected(_) => unreachable!("interpreter never defers"),
            }
        }
        out
    }

    #[tokio::test]
    async fn test_interpreter_matches_scenarios() {
        let out = interpret(vec![double(), over(5)], &[1, 2, 3, 4, 5]).await;
        assert_eq!(out, vec![6, 8, 10]);

        let out = interpret(vec![sum_scan()], &[1, 2, 3, 4, 5]).await;
        assert_eq!(out, vec![1, 3, 6, 10, 15]);

        let out = interpret(vec![Op::Take(3), Op::Skip(1)], &[1, 2, 3, 4, 5]).await;
        assert_eq!(out, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_interpreter_agrees_with_fused() {
        let ops = || vec![double(), over(10), sum_scan(), Op::Skip(2), Op::Take(40)];
        let input: Vec<i64> = (0..200).collect();

        let interp_out = interpret(ops(), &input).await;

        let mut fused = FusedPipeline::new(ops(), ErrorPolicy::Drop);
        let mut fused_out = Vec::new();
        for &x in &input {
            match fused.apply(Value::Int(x)) {
                Step::Emit(v) => fused_out.push(v.as_i64().unwrap()),
                Step::Last(v) => {
                    fused_out.push(v.as_i64().unwrap());
                    break;
                }
                Step::Skip => {}
                Step::Done => break,
                other => panic!("unexpected: {other:?}"),
            }
        }

        assert_eq!(interp_out, fused_out);
    }
}
