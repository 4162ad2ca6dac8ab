use std::{
	collections::{BTreeSet, HashMap},
	fmt::{self, Display},
	num::NonZeroI32,
	ops::Not,
};

use itertools::Itertools;
use varisat::{ExtendFormula, Solver};

use crate::Error;

/// A propositional literal in DIMACS convention: a positive value names a
/// variable, a negative value its negation. Zero is not a literal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lit(NonZeroI32);

impl Lit {
	/// Creates a literal from a DIMACS value, or `None` if the value is 0.
	pub fn new(value: i32) -> Option<Lit> {
		NonZeroI32::new(value).map(Lit)
	}

	/// The variable this literal belongs to.
	pub fn var(&self) -> u32 {
		self.0.get().unsigned_abs()
	}

	pub fn is_negated(&self) -> bool {
		self.0.get() < 0
	}
}

impl Not for Lit {
	type Output = Lit;
	fn not(self) -> Self::Output {
		Lit(-self.0)
	}
}
impl Not for &Lit {
	type Output = Lit;
	fn not(self) -> Self::Output {
		!(*self)
	}
}

impl From<Lit> for i32 {
	fn from(value: Lit) -> Self {
		value.0.get()
	}
}

// Literals are ordered by variable first, placing a variable right before its
// negation: 1, -1, 2, -2, … This is the canonical universe order used by the
// candidate forest.
impl Ord for Lit {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		(self.var(), self.is_negated()).cmp(&(other.var(), other.is_negated()))
	}
}
impl PartialOrd for Lit {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Display for Lit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		self.0.fmt(f)
	}
}
impl fmt::Debug for Lit {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Debug::fmt(&self.0, f)
	}
}

/// A disjunction of literals. Duplicates collapse; a clause never contains 0.
///
/// A clause containing both a literal and its negation is a tautology. Such
/// clauses can be built explicitly, but the candidate forest never produces
/// one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Clause {
	lits: BTreeSet<Lit>,
}

impl Clause {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn unit(lit: Lit) -> Self {
		let mut clause = Self::new();
		let _ = clause.insert(lit);
		clause
	}

	pub fn insert(&mut self, lit: Lit) -> bool {
		self.lits.insert(lit)
	}

	pub fn contains(&self, lit: Lit) -> bool {
		self.lits.contains(&lit)
	}

	/// Iterates the literals in canonical universe order.
	pub fn iter(&self) -> impl Iterator<Item = Lit> + '_ {
		self.lits.iter().copied()
	}

	pub fn len(&self) -> usize {
		self.lits.len()
	}

	pub fn is_empty(&self) -> bool {
		self.lits.is_empty()
	}

	pub fn is_tautology(&self) -> bool {
		self.lits.iter().any(|lit| self.lits.contains(&!lit))
	}

	pub fn is_subset(&self, other: &Clause) -> bool {
		self.lits.is_subset(&other.lits)
	}

	fn unit_lit(&self) -> Option<Lit> {
		if self.lits.len() == 1 {
			self.lits.iter().next().copied()
		} else {
			None
		}
	}
}

impl FromIterator<Lit> for Clause {
	fn from_iter<T: IntoIterator<Item = Lit>>(iter: T) -> Self {
		Self {
			lits: iter.into_iter().collect(),
		}
	}
}

impl<'a> IntoIterator for &'a Clause {
	type Item = Lit;
	type IntoIter = std::iter::Copied<std::collections::btree_set::Iter<'a, Lit>>;
	fn into_iter(self) -> Self::IntoIter {
		self.lits.iter().copied()
	}
}

impl Display for Clause {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({})", self.lits.iter().format(" ∨ "))
	}
}

/// A formula in conjunctive normal form over the variables `1..=num_vars`.
///
/// The clause set only grows. A unit-clause contradiction or an empty clause
/// is detected at insertion time and marks the formula trivially
/// unsatisfiable; this is a normal unsatisfiable outcome, not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Formula {
	clauses: BTreeSet<Clause>,
	num_vars: u32,
	units: HashMap<u32, bool>,
	trivially_unsat: bool,
}

impl Formula {
	/// Creates an empty formula over the variables `1..=num_vars`. Inserting
	/// a clause that mentions a higher variable widens the range.
	pub fn new(num_vars: u32) -> Self {
		Self {
			num_vars,
			..Self::default()
		}
	}

	pub fn add_clause(&mut self, clause: Clause) {
		match clause.iter().map(|lit| lit.var()).max() {
			Some(max) => self.num_vars = self.num_vars.max(max),
			// the empty clause cannot be satisfied
			None => self.trivially_unsat = true,
		}
		if let Some(lit) = clause.unit_lit() {
			let positive = !lit.is_negated();
			if let Some(prev) = self.units.insert(lit.var(), positive) {
				if prev != positive {
					self.trivially_unsat = true;
				}
			}
		}
		let _ = self.clauses.insert(clause);
	}

	pub fn add_lit(&mut self, lit: Lit) {
		self.add_clause(Clause::unit(lit));
	}

	/// Adds the negation of `clause`: one unit clause per negated literal
	/// (De Morgan).
	pub fn add_negated_clause(&mut self, clause: &Clause) {
		for lit in clause {
			self.add_lit(!lit);
		}
	}

	pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
		self.clauses.iter()
	}

	pub fn len(&self) -> usize {
		self.clauses.len()
	}

	pub fn is_empty(&self) -> bool {
		self.clauses.is_empty()
	}

	pub fn num_vars(&self) -> u32 {
		self.num_vars
	}

	pub fn is_trivially_unsat(&self) -> bool {
		self.trivially_unsat
	}

	/// Returns true if the formula has at least one model.
	pub fn is_satisfiable(&self) -> Result<bool, Error> {
		if self.trivially_unsat {
			return Ok(false);
		}
		let mut solver = Solver::new();
		self.load(&mut solver);
		Ok(solver.solve()?)
	}

	/// Enumerates all models of the formula over `1..=num_vars`. Every model
	/// assigns a sign to every variable, including variables no clause
	/// mentions. Returns an empty vector iff the formula is unsatisfiable.
	pub fn solve(&self) -> Result<Vec<Model>, Error> {
		if self.trivially_unsat {
			return Ok(Vec::new());
		}
		let num_vars = self.num_vars as usize;
		let mut solver = Solver::new();
		self.load(&mut solver);
		let mut models = Vec::new();
		while solver.solve()? {
			let assignment = solver.model().unwrap();
			let mut signs = vec![false; num_vars];
			for lit in assignment {
				let value = lit.to_dimacs();
				let var = value.unsigned_abs();
				if (1..=num_vars).contains(&var) {
					signs[var - 1] = value > 0;
				}
			}
			let model = Model::from_signs(&signs);
			let blocking: Vec<varisat::Lit> = model.lits().map(|lit| sat_lit(!lit)).collect();
			solver.add_clause(&blocking);
			models.push(model);
		}
		Ok(models)
	}

	/// Returns true iff `self ∧ ¬clause` is unsatisfiable, i.e. every model
	/// of the formula satisfies `clause`.
	pub fn implies(&self, clause: &Clause) -> Result<bool, Error> {
		let mut test = self.clone();
		test.add_negated_clause(clause);
		Ok(!test.is_satisfiable()?)
	}

	fn load(&self, solver: &mut Solver) {
		for _ in 0..self.num_vars {
			let _ = solver.new_var();
		}
		let mut buf = Vec::new();
		for clause in &self.clauses {
			buf.clear();
			buf.extend(clause.iter().map(sat_lit));
			solver.add_clause(&buf);
		}
	}
}

impl Extend<Clause> for Formula {
	fn extend<T: IntoIterator<Item = Clause>>(&mut self, iter: T) {
		for clause in iter {
			self.add_clause(clause);
		}
	}
}

impl Display for Formula {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.clauses.iter().format(" ∧ "))
	}
}

fn sat_lit(lit: Lit) -> varisat::Lit {
	varisat::Lit::from_dimacs(i32::from(lit) as isize)
}

/// A total assignment: one literal per variable, in variable order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Model {
	assignment: Vec<Lit>,
}

impl Model {
	pub(crate) fn from_signs(signs: &[bool]) -> Self {
		let assignment = signs
			.iter()
			.enumerate()
			.map(|(i, &positive)| {
				let var = i as i32 + 1;
				Lit::new(if positive { var } else { -var }).unwrap()
			})
			.collect();
		Self { assignment }
	}

	pub fn value(&self, var: u32) -> bool {
		!self.assignment[var as usize - 1].is_negated()
	}

	pub fn lits(&self) -> impl Iterator<Item = Lit> + '_ {
		self.assignment.iter().copied()
	}

	pub fn positives(&self) -> impl Iterator<Item = Lit> + '_ {
		self.lits().filter(|lit| !lit.is_negated())
	}

	pub fn len(&self) -> usize {
		self.assignment.len()
	}

	pub fn is_empty(&self) -> bool {
		self.assignment.is_empty()
	}
}

impl Display for Model {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.assignment.iter().format(" "))
	}
}

#[cfg(test)]
mod tests {
	use expect_test::expect;
	use itertools::Itertools;

	use crate::tests::{clause, lit};
	use super::*;

	#[test]
	fn literal_universe_order() {
		let mut lits = vec![lit(2), lit(-1), lit(1), lit(-2)];
		lits.sort();
		assert_eq!(lits, vec![lit(1), lit(-1), lit(2), lit(-2)]);
		assert_eq!(!lit(3), lit(-3));
		assert!(Lit::new(0).is_none());
	}

	#[test]
	fn clause_collapses_duplicates() {
		let c = clause(&[2, -3, 2, -3]);
		assert_eq!(c.len(), 2);
		assert!(!c.is_tautology());
		assert!(clause(&[1, -1]).is_tautology());
		assert_eq!(c.to_string(), "(2 ∨ -3)");
	}

	#[test]
	fn unit_contradiction_is_trivially_unsat() {
		let mut formula = Formula::new(2);
		formula.add_lit(lit(1));
		assert!(!formula.is_trivially_unsat());
		formula.add_lit(lit(-1));
		assert!(formula.is_trivially_unsat());
		assert!(!formula.is_satisfiable().unwrap());
		assert!(formula.solve().unwrap().is_empty());
	}

	#[test]
	fn empty_clause_is_trivially_unsat() {
		let mut formula = Formula::new(1);
		formula.add_clause(Clause::new());
		assert!(formula.is_trivially_unsat());
	}

	#[test]
	fn solve_enumerates_all_models() {
		// p1 ∧ (p2 ∨ p3) ∧ (¬p2 ∨ ¬p3)
		let mut formula = Formula::new(3);
		formula.add_lit(lit(1));
		formula.add_clause(clause(&[2, 3]));
		formula.add_clause(clause(&[-2, -3]));
		let models = formula
			.solve()
			.unwrap()
			.into_iter()
			.sorted()
			.map(|m| m.to_string())
			.join("\n");
		expect![[r#"
    1 2 -3
    1 -2 3"#]]
		.assert_eq(&models);
	}

	#[test]
	fn solve_ranges_over_unmentioned_variables() {
		let mut formula = Formula::new(2);
		formula.add_lit(lit(1));
		let models = formula.solve().unwrap();
		assert_eq!(models.len(), 2);
		assert!(models.iter().all(|m| m.value(1)));
	}

	#[test]
	fn implies_unit_properties() {
		let mut formula = Formula::new(1);
		formula.add_lit(lit(1));
		assert!(formula.implies(&clause(&[1])).unwrap());
		assert!(!formula.implies(&clause(&[-1])).unwrap());
		formula.add_lit(lit(-1));
		// an unsatisfiable formula implies everything
		assert!(formula.implies(&clause(&[-1])).unwrap());
	}

	#[test]
	fn implies_by_resolution() {
		let mut formula = Formula::new(3);
		formula.add_clause(clause(&[1, 2]));
		formula.add_clause(clause(&[-1, -3]));
		assert!(formula.implies(&clause(&[2, -3])).unwrap());
		assert!(!formula.implies(&clause(&[2, 3])).unwrap());
	}
}
