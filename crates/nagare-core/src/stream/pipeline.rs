//! Chain flattening.
//!
//! Before execution, the parent links of an operator chain are collapsed
//! into a single `(base, operators, policy)` triple: operators collect
//! inner→outer, and the outer-most stream's error policy governs the
//! whole pipeline. The chain is walked exactly once.

use smallvec::SmallVec;

use crate::error::ErrorPolicy;
use crate::operator::Op;

use super::{LocalOps, Source, Stream};

/// A flattened pipeline, ready for compilation and execution.
pub(crate) struct Pipeline {
    /// The non-stream base source.
    pub base: Source,
    /// Operators in evaluation order (inner-most first).
    pub ops: Vec<Op>,
    /// The outer-most stream's error policy.
    pub policy: ErrorPolicy,
}

impl Stream {
    /// Collapses the parent chain into a [`Pipeline`].
    pub(crate) fn flatten(self) -> Pipeline {
        let policy = self.policy.clone();

        // Levels stack up outer-most first while walking down the chain.
        let mut levels: Vec<LocalOps> = Vec::new();
        let mut current = self;
        let base = loop {
            levels.push(std::mem::take(&mut current.ops));
            match current.source {
                Source::Parent(parent) => current = *parent,
                other => break other,
            }
        };

        let mut ops = Vec::with_capacity(levels.iter().map(SmallVec::len).sum());
        for level in levels.into_iter().rev() {
            ops.extend(level);
        }

        Pipeline { base, ops, policy }
    }
}
