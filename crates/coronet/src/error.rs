use thiserror::Error;
use varisat::solver::SolverError;

use crate::{constraint::Outcome, oracle::OracleError};

/// Failures that abort a closure or Pareto computation.
#[derive(Debug, Error)]
pub enum Error {
	/// The entailment or dominance oracle reported an internal failure.
	#[error("oracle failure while {context}")]
	OracleFailure {
		context: String,
		#[source]
		source: OracleError,
	},
	/// The dominance oracle exceeded its time budget.
	#[error("dominance oracle timed out comparing {better} against {worse}")]
	OracleTimeout { better: Box<Outcome>, worse: Box<Outcome> },
	/// The underlying SAT solver failed. A formula contradiction is not an
	/// error; this covers solver-internal faults only.
	#[error("SAT engine failure: {0}")]
	SatEngineFailure(SolverError),
	/// A model selected zero or several domain values for one CP-net
	/// variable, which signals malformed input constraints.
	#[error("model selects {found} values for variable '{variable}'")]
	DecodeInconsistency { variable: String, found: usize },
	/// The terminate flag was raised between levels or between fallback
	/// iterations.
	#[error("computation interrupted")]
	Interrupted,
}

impl From<SolverError> for Error {
	fn from(value: SolverError) -> Self {
		Self::SatEngineFailure(value)
	}
}
