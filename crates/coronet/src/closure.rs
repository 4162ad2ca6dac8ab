use std::{
	collections::BTreeSet,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc, RwLock,
	},
};

use delegate::delegate;
use rayon::prelude::*;
use tracing::{debug, trace};

use crate::{
	constraint::Constraint,
	forest::CandidateForest,
	oracle::EntailmentOracle,
	sat::{Clause, Formula},
	Error,
};

/// How the branches of one level are scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMode {
	/// Branches within a level are evaluated concurrently. A clause accepted
	/// mid-level is not guaranteed visible to sibling evaluations already in
	/// flight, so a redundant clause may slip into the result: the closure
	/// stays sound but is not guaranteed minimal.
	#[default]
	Parallel,
	/// Branches are evaluated one at a time in canonical order, committing
	/// each acceptance before the next test. The closure is minimal: no
	/// accepted clause is a superset of another.
	Sequential,
}

/// The feasibility closure: the accepted set of minimal entailed clauses
/// over the domain-value vocabulary, immutable once the search terminates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Closure {
	constraints: BTreeSet<Constraint>,
}

impl Closure {
	delegate! {
		to self.constraints {
			pub fn len(&self) -> usize;
			pub fn is_empty(&self) -> bool;
			#[call(contains)]
			pub fn contains_constraint(&self, constraint: &Constraint) -> bool;
		}
	}

	pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
		self.constraints.iter()
	}

	/// The closure as a CNF formula over the variables `1..=num_vars`.
	pub fn to_formula(&self, num_vars: u32) -> Formula {
		let mut formula = Formula::new(num_vars);
		for constraint in &self.constraints {
			formula.add_clause(constraint.as_clause());
		}
		formula
	}
}

impl<'a> IntoIterator for &'a Closure {
	type Item = &'a Constraint;
	type IntoIter = std::collections::btree_set::Iter<'a, Constraint>;
	fn into_iter(self) -> Self::IntoIter {
		self.constraints.iter()
	}
}

/// Prime-implicate search over a [`CandidateForest`].
///
/// Each branch is first tested against the clauses accepted so far: a branch
/// they already imply is redundant and is dropped without consulting the
/// oracle. Otherwise the entailment oracle decides: an entailed branch is
/// accepted and dropped (any strict superset would be non-minimal), a
/// non-entailed branch is extended at the next level. Resolving a branch
/// prevents all of its supersets from ever being generated, which bounds
/// oracle queries to the accepted clauses plus one failed probe per literal
/// on their paths.
#[derive(Clone, Debug)]
pub struct ClosureBuilder {
	num_vars: u32,
	mode: SearchMode,
	terminate: Option<Arc<AtomicBool>>,
}

struct SearchState {
	formula: Formula,
	accepted: Vec<Constraint>,
}

impl ClosureBuilder {
	/// Creates a builder over the literal universe `{1, -1, …, N, -N}`.
	pub fn new(num_vars: u32) -> Self {
		Self {
			num_vars,
			mode: SearchMode::default(),
			terminate: None,
		}
	}

	pub fn with_mode(mut self, mode: SearchMode) -> Self {
		self.mode = mode;
		self
	}

	/// Installs a flag checked between levels; raising it aborts the search
	/// with [`Error::Interrupted`].
	pub fn with_terminate(mut self, terminate: Arc<AtomicBool>) -> Self {
		self.terminate = Some(terminate);
		self
	}

	/// Runs the search to completion and returns the closure.
	#[tracing::instrument(level = "debug", skip(self, oracle), fields(num_vars = self.num_vars, mode = ?self.mode))]
	pub fn compute<O: EntailmentOracle>(&self, oracle: &O) -> Result<Closure, Error> {
		let mut forest = CandidateForest::new(self.num_vars);
		let state = RwLock::new(SearchState {
			formula: Formula::new(self.num_vars),
			accepted: Vec::new(),
		});
		let mut level = 0u32;
		while !forest.is_empty() {
			if self.interrupted() {
				return Err(Error::Interrupted);
			}
			level += 1;
			let branches: Vec<Clause> = forest.branches().collect();
			let extend: Vec<bool> = match self.mode {
				SearchMode::Parallel => branches
					.par_iter()
					.map(|branch| accept(oracle, &state, branch))
					.collect::<Result<_, _>>()?,
				SearchMode::Sequential => branches
					.iter()
					.map(|branch| accept(oracle, &state, branch))
					.collect::<Result<_, _>>()?,
			};
			debug!(
				level,
				fringe = branches.len(),
				accepted = state.read().unwrap().accepted.len(),
				"closure level finished"
			);
			forest.expand_masked(&extend);
		}
		let state = state.into_inner().unwrap();
		Ok(Closure {
			constraints: state.accepted.into_iter().collect(),
		})
	}

	fn interrupted(&self) -> bool {
		self.terminate
			.as_ref()
			.is_some_and(|flag| flag.load(Ordering::Relaxed))
	}
}

/// Decides the fate of one branch: `Ok(true)` extends it at the next level,
/// `Ok(false)` resolves it.
fn accept<O: EntailmentOracle>(
	oracle: &O,
	state: &RwLock<SearchState>,
	branch: &Clause,
) -> Result<bool, Error> {
	let snapshot = state.read().unwrap().formula.clone();
	if snapshot.implies(branch)? {
		// already forced by an accepted shorter clause
		trace!(%branch, "subsumed");
		return Ok(false);
	}
	let candidate = Constraint::feasibility(branch.iter());
	let entailed = oracle
		.is_entailed(&candidate)
		.map_err(|source| Error::OracleFailure {
			context: format!("testing candidate clause {candidate}"),
			source,
		})?;
	trace!(%candidate, entailed, "oracle probe");
	if entailed {
		let mut state = state.write().unwrap();
		state.formula.add_clause(branch.clone());
		state.accepted.push(candidate);
		Ok(false)
	} else {
		Ok(true)
	}
}

#[cfg(test)]
mod tests {
	use expect_test::expect;
	use itertools::Itertools;

	use crate::{
		oracle::OracleError,
		tests::{clause, ClausalTheory},
	};
	use super::*;

	// 1∨2, ¬1∨¬2, ¬1∨3: an exactly-one pair plus an implication.
	fn theory() -> ClausalTheory {
		let mut formula = Formula::new(3);
		formula.add_clause(clause(&[1, 2]));
		formula.add_clause(clause(&[-1, -2]));
		formula.add_clause(clause(&[-1, 3]));
		ClausalTheory(formula)
	}

	#[test]
	fn sequential_search_finds_minimal_closure() {
		let closure = ClosureBuilder::new(3)
			.with_mode(SearchMode::Sequential)
			.compute(&theory())
			.unwrap();
		let rendered = closure.iter().map(|c| c.to_string()).join("\n");
		// {2 ∨ 3} is entailed, but the accepted clauses already imply it.
		expect![[r#"
    {1 ∨ 2}
    {-1 ∨ -2}
    {-1 ∨ 3}"#]]
		.assert_eq(&rendered);
	}

	#[test]
	fn closure_is_sound_and_minimal() {
		let theory = theory();
		let closure = ClosureBuilder::new(3)
			.with_mode(SearchMode::Sequential)
			.compute(&theory)
			.unwrap();
		for constraint in &closure {
			assert!(theory.is_entailed(constraint).unwrap());
		}
		for a in &closure {
			for b in &closure {
				assert!(
					a == b || !a.as_clause().is_subset(&b.as_clause()),
					"{a} subsumes {b}"
				);
			}
		}
	}

	#[test]
	fn sequential_search_is_deterministic() {
		let builder = ClosureBuilder::new(3).with_mode(SearchMode::Sequential);
		let first = builder.compute(&theory()).unwrap();
		let second = builder.compute(&theory()).unwrap();
		assert_eq!(first, second);
	}

	#[test]
	fn parallel_search_is_sound_and_equivalent() {
		let theory = theory();
		let parallel = ClosureBuilder::new(3).compute(&theory).unwrap();
		for constraint in &parallel {
			assert!(theory.is_entailed(constraint).unwrap());
		}
		// the parallel closure may carry a redundant clause, but it accepts
		// the same set of models as the sequential one
		let sequential = ClosureBuilder::new(3)
			.with_mode(SearchMode::Sequential)
			.compute(&theory)
			.unwrap();
		let models = |closure: &Closure| {
			closure
				.to_formula(3)
				.solve()
				.unwrap()
				.into_iter()
				.sorted()
				.collect_vec()
		};
		assert_eq!(models(&parallel), models(&sequential));
	}

	#[test]
	fn terminate_flag_aborts_between_levels() {
		let flag = Arc::new(AtomicBool::new(true));
		let err = ClosureBuilder::new(3)
			.with_terminate(flag)
			.compute(&theory())
			.unwrap_err();
		assert!(matches!(err, Error::Interrupted));
	}

	#[test]
	fn oracle_failure_aborts_with_context() {
		struct Broken;
		impl EntailmentOracle for Broken {
			fn is_entailed(&self, _: &Constraint) -> Result<bool, OracleError> {
				Err(OracleError::backend("reasoner unavailable"))
			}
		}
		let err = ClosureBuilder::new(2)
			.with_mode(SearchMode::Sequential)
			.compute(&Broken)
			.unwrap_err();
		let Error::OracleFailure { context, .. } = err else {
			panic!("unexpected error: {err}");
		};
		assert!(context.contains("{1}"), "missing candidate in '{context}'");
	}
}
