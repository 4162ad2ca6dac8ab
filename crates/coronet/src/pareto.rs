use std::{
	collections::BTreeSet,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use tracing::{debug, trace};

use crate::{
	closure::Closure,
	constraint::{Constraint, DomainTable, Outcome},
	oracle::{DominanceOracle, OracleError},
	sat::{Formula, Model},
	Error,
};

/// Computes the Pareto-optimal feasible outcomes of a CP-net whose domain is
/// restricted by a feasibility closure.
///
/// Three boolean problems are solved first: the optimality constraints alone
/// (the undominated models `U`), the closure alone (the feasible models
/// `Fe`), and their conjunction (`O`). When `O = Fe` every feasible outcome
/// is optimal, and when `U` is non-empty and `O = U` every undominated
/// outcome is feasible; either way `O` decodes directly to the answer.
/// Otherwise each feasible outcome not already confirmed optimal is kept iff
/// no other feasible outcome dominates it, as decided by the dominance
/// oracle.
#[derive(Clone, Debug, Default)]
pub struct ParetoComputer {
	terminate: Option<Arc<AtomicBool>>,
}

impl ParetoComputer {
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs a flag checked between fallback iterations; raising it
	/// aborts the computation with [`Error::Interrupted`].
	pub fn with_terminate(mut self, terminate: Arc<AtomicBool>) -> Self {
		self.terminate = Some(terminate);
		self
	}

	#[tracing::instrument(level = "debug", skip_all)]
	pub fn compute<D: DominanceOracle>(
		&self,
		optimality: &[Constraint],
		closure: &Closure,
		table: &DomainTable,
		oracle: &D,
	) -> Result<BTreeSet<Outcome>, Error> {
		let num_vars = table.num_values();
		let mut optimum = Formula::new(num_vars);
		for constraint in optimality {
			optimum.add_clause(constraint.as_clause());
		}
		let feasibility = closure.to_formula(num_vars);
		let mut joint = optimum.clone();
		joint.extend(feasibility.clauses().cloned());

		let undominated: BTreeSet<Model> = optimum.solve()?.into_iter().collect();
		let feasible: BTreeSet<Model> = feasibility.solve()?.into_iter().collect();
		let optimal: BTreeSet<Model> = joint.solve()?.into_iter().collect();
		debug!(
			undominated = undominated.len(),
			feasible = feasible.len(),
			optimal = optimal.len(),
			"solved the boolean problems"
		);

		let feasible_outcomes = decode_all(&feasible, table)?;
		let optimal_outcomes = decode_all(&optimal, table)?;

		// Either all feasible outcomes are optimal, or all undominated
		// outcomes are feasible.
		if optimal == feasible || (!undominated.is_empty() && optimal == undominated) {
			return Ok(optimal_outcomes);
		}

		let mut result = optimal_outcomes.clone();
		for unverified in feasible_outcomes.difference(&optimal_outcomes) {
			if self.interrupted() {
				return Err(Error::Interrupted);
			}
			if !is_dominated(unverified, &feasible_outcomes, oracle)? {
				let _ = result.insert(unverified.clone());
			}
		}
		Ok(result)
	}

	fn interrupted(&self) -> bool {
		self.terminate
			.as_ref()
			.is_some_and(|flag| flag.load(Ordering::Relaxed))
	}
}

/// Asks the oracle whether any other feasible outcome dominates
/// `unverified`, stopping at the first that does.
fn is_dominated<D: DominanceOracle>(
	unverified: &Outcome,
	feasible: &BTreeSet<Outcome>,
	oracle: &D,
) -> Result<bool, Error> {
	for candidate in feasible {
		if candidate == unverified {
			continue;
		}
		match oracle.dominates(candidate, unverified) {
			Ok(true) => {
				trace!(better = %candidate, worse = %unverified, "dominated");
				return Ok(true);
			}
			Ok(false) => {}
			Err(OracleError::Timeout) => {
				return Err(Error::OracleTimeout {
					better: Box::new(candidate.clone()),
					worse: Box::new(unverified.clone()),
				})
			}
			Err(source) => {
				return Err(Error::OracleFailure {
					context: format!("comparing {candidate} against {unverified}"),
					source,
				})
			}
		}
	}
	Ok(false)
}

fn decode_all(models: &BTreeSet<Model>, table: &DomainTable) -> Result<BTreeSet<Outcome>, Error> {
	models
		.iter()
		.map(|model| Outcome::decode(model, table))
		.collect()
}

#[cfg(test)]
mod tests {
	use crate::{
		closure::{ClosureBuilder, SearchMode},
		tests::{clause, outcome, ClausalTheory},
	};
	use super::*;

	struct Untouchable;
	impl DominanceOracle for Untouchable {
		fn dominates(&self, _: &Outcome, _: &Outcome) -> Result<bool, OracleError> {
			panic!("the dominance oracle must not be consulted")
		}
	}

	struct Fails;
	impl DominanceOracle for Fails {
		fn dominates(&self, _: &Outcome, _: &Outcome) -> Result<bool, OracleError> {
			Err(OracleError::Timeout)
		}
	}

	fn exactly_one_table() -> DomainTable {
		let mut table = DomainTable::new();
		table.add_variable("A", ["a1", "a2"]);
		table
	}

	fn exactly_one_closure(table: &DomainTable) -> Closure {
		let mut theory = Formula::new(table.num_values());
		theory.add_clause(clause(&[1, 2]));
		theory.add_clause(clause(&[-1, -2]));
		ClosureBuilder::new(table.num_values())
			.with_mode(SearchMode::Sequential)
			.compute(&ClausalTheory(theory))
			.unwrap()
	}

	#[test]
	fn all_feasible_outcomes_optimal() {
		let table = exactly_one_table();
		let closure = exactly_one_closure(&table);
		// "a1 or a2" excludes nothing that is feasible
		let optimality = vec![Constraint::builder(&table).prefer("a1").prefer("a2").build()];
		let result = ParetoComputer::new()
			.compute(&optimality, &closure, &table, &Untouchable)
			.unwrap();
		assert_eq!(
			result,
			[outcome(&[("A", "a1")]), outcome(&[("A", "a2")])].into()
		);
	}

	#[test]
	fn all_undominated_outcomes_feasible() {
		let table = exactly_one_table();
		let closure = exactly_one_closure(&table);
		let optimality = vec![
			Constraint::builder(&table).prefer("a1").build(),
			Constraint::feasibility(clause(&[-1, -2]).iter()),
		];
		let result = ParetoComputer::new()
			.compute(&optimality, &closure, &table, &Untouchable)
			.unwrap();
		assert_eq!(result, [outcome(&[("A", "a1")])].into());
	}

	#[test]
	fn fallback_keeps_undominated_outcomes_only() {
		let mut table = DomainTable::new();
		table.add_variable("A", ["a1", "a2"]);
		table.add_variable("B", ["b1", "b2"]);
		let mut theory = Formula::new(table.num_values());
		for lits in [[1, 2], [-1, -2], [3, 4], [-3, -4]] {
			theory.add_clause(clause(&lits));
		}
		let closure = ClosureBuilder::new(table.num_values())
			.with_mode(SearchMode::Sequential)
			.compute(&ClausalTheory(theory))
			.unwrap();
		let optimality = vec![Constraint::builder(&table).prefer("a1").build()];

		// an outcome dominates another iff it picks a1 and the other a2
		struct PrefersA1;
		impl DominanceOracle for PrefersA1 {
			fn dominates(&self, better: &Outcome, worse: &Outcome) -> Result<bool, OracleError> {
				Ok(better.value("A") == Some("a1") && worse.value("A") == Some("a2"))
			}
		}

		let feasible: Vec<Outcome> = ["a1", "a2"]
			.into_iter()
			.flat_map(|a| ["b1", "b2"].map(|b| outcome(&[("A", a), ("B", b)])))
			.collect();
		let result = ParetoComputer::new()
			.compute(&optimality, &closure, &table, &PrefersA1)
			.unwrap();
		assert_eq!(
			result,
			[
				outcome(&[("A", "a1"), ("B", "b1")]),
				outcome(&[("A", "a1"), ("B", "b2")]),
			]
			.into()
		);
		// every excluded feasible outcome is dominated by an included one
		for excluded in feasible.iter().filter(|o| !result.contains(*o)) {
			assert!(result
				.iter()
				.any(|included| PrefersA1.dominates(included, excluded).unwrap()));
		}
	}

	#[test]
	fn dominance_timeout_aborts() {
		let table = exactly_one_table();
		let closure = exactly_one_closure(&table);
		// a1 is undominated but infeasible outcomes exist in U, forcing the
		// fallback over {a2}
		let optimality = vec![Constraint::builder(&table).prefer("a1").build()];
		let err = ParetoComputer::new()
			.compute(&optimality, &closure, &table, &Fails)
			.unwrap_err();
		assert!(matches!(err, Error::OracleTimeout { .. }));
	}

	#[test]
	fn decode_failure_is_fatal() {
		let table = exactly_one_table();
		// a closure missing the exclusion clause admits models selecting
		// both values of A
		let lax = ClosureBuilder::new(table.num_values())
			.with_mode(SearchMode::Sequential)
			.compute(&ClausalTheory({
				let mut theory = Formula::new(table.num_values());
				theory.add_clause(clause(&[1, 2]));
				theory
			}))
			.unwrap();
		let optimality = vec![Constraint::builder(&table).prefer("a1").build()];
		let err = ParetoComputer::new()
			.compute(&optimality, &lax, &table, &Untouchable)
			.unwrap_err();
		assert!(matches!(
			err,
			Error::DecodeInconsistency { variable, found: 2 } if variable == "A"
		));
	}
}
