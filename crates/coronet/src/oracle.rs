use thiserror::Error;

use crate::constraint::{Constraint, Outcome};

/// An error reported by an external oracle. Oracle calls are never retried:
/// partial progress is unsound to resume from mid-query, so the enclosing
/// computation aborts.
#[derive(Debug, Error)]
pub enum OracleError {
	#[error("oracle backend error: {0}")]
	Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
	#[error("time budget exceeded")]
	Timeout,
}

impl OracleError {
	pub fn backend(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
		Self::Backend(error.into())
	}
}

/// Decides whether a candidate axiom is entailed by the background theory.
///
/// The closure search calls this concurrently, so implementations must be
/// stateless or keep one independent reasoning context per call.
pub trait EntailmentOracle: Sync {
	fn is_entailed(&self, candidate: &Constraint) -> Result<bool, OracleError>;
}

/// Decides whether one outcome strictly dominates another. May perform
/// external I/O and may exceed its time budget.
pub trait DominanceOracle {
	fn dominates(&self, better: &Outcome, worse: &Outcome) -> Result<bool, OracleError>;
}
