//! Array kernels over dense sources.
//!
//! When the base source is array-like, the whole chain runs as a tight
//! loop over the slice instead of item-at-a-time dispatch from the
//! execution layer. Two shapes:
//!
//! - **Scalar**: one item per iteration.
//! - **4-lane unrolled**: four explicit evaluations per iteration with a
//!   scalar remainder, mirroring the classic chunks-of-4-plus-tail shape.
//!   Only legal when the pipeline has no `take` (its global early break
//!   is incompatible with committed lanes), and only chosen for very
//!   large inputs where the per-iteration win amortizes.
//!
//! The kernels evaluate items through the policy-free step: a per-item
//! fault stops the loop at the faulting index and the executor resolves
//! that one item through the guarded path before resuming. This keeps
//! per-item semantics byte-identical to the guarded path while the happy
//! path pays no policy dispatch.

use crate::error::StreamError;
use crate::value::Value;

use super::fused::{FusedPipeline, RawStep};

/// How an array-kernel run ended.
#[derive(Debug)]
pub enum KernelExit {
    /// Every item from the start index was consumed.
    Completed,
    /// A `take` reached its quota; the source must not be polled further.
    TakeExhausted,
    /// A stage faulted at `index`. The executor resolves the fault through
    /// the guarded path and may resume at `index + 1`.
    Fault {
        /// Index into the source slice of the faulting item.
        index: usize,
        /// The raw fault.
        error: StreamError,
    },
}

impl FusedPipeline {
    /// Evaluates one item inside a kernel loop.
    ///
    /// `Ok(true)` to continue, `Ok(false)` when the stream completed.
    #[inline]
    fn kernel_item(&mut self, value: Value, out: &mut Vec<Value>) -> Result<bool, StreamError> {
        match self.step_sync(value)? {
            RawStep::Emit(v) => {
                out.push(v);
                Ok(true)
            }
            RawStep::Last(v) => {
                out.push(v);
                Ok(false)
            }
            RawStep::Skip => Ok(true),
            RawStep::Done => Ok(false),
        }
    }

    /// Runs the scalar array kernel from `start`, appending emissions to
    /// `out`.
    pub fn run_kernel_scalar(
        &mut self,
        src: &[Value],
        start: usize,
        out: &mut Vec<Value>,
    ) -> KernelExit {
        for (offset, value) in src[start..].iter().enumerate() {
            match self.kernel_item(value.clone(), out) {
                Ok(true) => {}
                Ok(false) => return KernelExit::TakeExhausted,
                Err(error) => {
                    return KernelExit::Fault {
                        index: start + offset,
                        error,
                    }
                }
            }
        }
        KernelExit::Completed
    }

    /// Four sequential evaluations; lanes stay in source order.
    #[inline]
    fn lanes4(
        &mut self,
        src: &[Value],
        base: usize,
        out: &mut Vec<Value>,
    ) -> Result<(), (usize, StreamError)> {
        let _ = self
            .kernel_item(src[base].clone(), out)
            .map_err(|e| (base, e))?;
        let _ = self
            .kernel_item(src[base + 1].clone(), out)
            .map_err(|e| (base + 1, e))?;
        let _ = self
            .kernel_item(src[base + 2].clone(), out)
            .map_err(|e| (base + 2, e))?;
        let _ = self
            .kernel_item(src[base + 3].clone(), out)
            .map_err(|e| (base + 3, e))?;
        Ok(())
    }

    /// Runs the 4-lane unrolled kernel from `start`.
    ///
    /// Callers must not select this variant for pipelines containing a
    /// `take`; the executor enforces the precondition.
    pub fn run_kernel_unrolled(
        &mut self,
        src: &[Value],
        start: usize,
        out: &mut Vec<Value>,
    ) -> KernelExit {
        debug_assert!(!self.has_take(), "unrolled kernel selected with take");

        let len = src.len().saturating_sub(start);
        let chunks = len / 4;

        for c in 0..chunks {
            let base = start + c * 4;
            if let Err((index, error)) = self.lanes4(src, base, out) {
                return KernelExit::Fault { index, error };
            }
        }

        // Scalar tail.
        self.run_kernel_scalar(src, start + chunks * 4, out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::error::ErrorPolicy;
    use crate::operator::{FilterFn, MapFn, Op, ScanFn};

    fn int_src(n: i64) -> Vec<Value> {
        (0..n).map(Value::Int).collect()
    }

    fn double() -> Op {
        Op::Map(MapFn::Sync(Arc::new(|v| {
            Ok(Value::Int(v.as_i64().unwrap_or(0) * 2))
        })))
    }

    fn odd_only() -> Op {
        Op::Filter(FilterFn::Sync(Arc::new(|v| {
            Ok(v.as_i64().unwrap_or(0) % 2 == 1)
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

    fn ints(out: &[Value]) -> Vec<i64> {
        out.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[test]
    fn test_scalar_and_unrolled_agree() {
        let src = int_src(1003);
        let ops = || vec![double(), odd_only(), sum_scan()];

        let mut scalar_out = Vec::new();
        let mut p = FusedPipeline::new(ops(), ErrorPolicy::Drop);
        assert!(matches!(
            p.run_kernel_scalar(&src, 0, &mut scalar_out),
            KernelExit::Completed
        ));

        let mut unrolled_out = Vec::new();
        let mut p = FusedPipeline::new(ops(), ErrorPolicy::Drop);
        assert!(matches!(
            p.run_kernel_unrolled(&src, 0, &mut unrolled_out),
            KernelExit::Completed
        ));

        assert_eq!(scalar_out, unrolled_out);
    }

    #[test]
    fn test_scalar_take_stops_at_quota() {
        let src = int_src(1000);
        let mut p = FusedPipeline::new(vec![Op::Take(5)], ErrorPolicy::Drop);
        let mut out = Vec::new();
        assert!(matches!(
            p.run_kernel_scalar(&src, 0, &mut out),
            KernelExit::TakeExhausted
        ));
        assert_eq!(ints(&out), vec![0, 1, 2, 3, 4]);
        assert!(p.is_exhausted());
    }

    #[test]
    fn test_fault_reports_index_and_resumes() {
        let src = int_src(10);
        let faulty = Op::Map(MapFn::Sync(Arc::new(|v| {
            if v.as_i64() == Some(6) {
                Err(StreamError::operator("boom"))
            } else {
                Ok(v)
            }
        })));

        let mut p = FusedPipeline::new(vec![faulty], ErrorPolicy::Drop);
        let mut out = Vec::new();
        let KernelExit::Fault { index, .. } = p.run_kernel_scalar(&src, 0, &mut out) else {
            panic!("expected a fault");
        };
        assert_eq!(index, 6);
        assert_eq!(ints(&out), vec![0, 1, 2, 3, 4, 5]);

        // Resume past the faulting item, as the executor does under Drop.
        assert!(matches!(
            p.run_kernel_scalar(&src, index + 1, &mut out),
            KernelExit::Completed
        ));
        assert_eq!(ints(&out), vec![0, 1, 2, 3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_unrolled_fault_index_in_lane() {
        let src = int_src(9);
        let faulty = Op::Map(MapFn::Sync(Arc::new(|v| {
            if v.as_i64() == Some(2) {
                Err(StreamError::operator("boom"))
            } else {
                Ok(v)
            }
        })));

        let mut p = FusedPipeline::new(vec![faulty], ErrorPolicy::Drop);
        let mut out = Vec::new();
        let KernelExit::Fault { index, .. } = p.run_kernel_unrolled(&src, 0, &mut out) else {
            panic!("expected a fault");
        };
        assert_eq!(index, 2);
        assert_eq!(ints(&out), vec![0, 1]);
    }

    #[test]
    fn test_unrolled_remainder_tail() {
        // Length 7: one full chunk of 4 plus a 3-item tail.
        let src = int_src(7);
        let mut p = FusedPipeline::new(vec![double()], ErrorPolicy::Drop);
        let mut out = Vec::new();
        assert!(matches!(
            p.run_kernel_unrolled(&src, 0, &mut out),
            KernelExit::Completed
        ));
        assert_eq!(ints(&out), vec![0, 2, 4, 6, 8, 10, 12]);
    }

    #[test]
    fn test_kernel_state_continues_across_runs() {
        // Scan state persists across two kernel invocations on the same
        // pipeline instance, as it must for fault-resume.
        let src = int_src(4);
        let mut p = FusedPipeline::new(vec![sum_scan()], ErrorPolicy::Drop);
        let mut out = Vec::new();
        let _ = p.run_kernel_scalar(&src[..2], 0, &mut out);
        let _ = p.run_kernel_scalar(&src[2..], 0, &mut out);
        assert_eq!(ints(&out), vec![0, 1, 3, 6]);
    }
}
