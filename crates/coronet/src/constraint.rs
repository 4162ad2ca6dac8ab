use std::{
	collections::{BTreeMap, BTreeSet, HashMap},
	fmt::{self, Display},
};

use crate::{
	sat::{Clause, Lit, Model},
	Error,
};

/// A propositional implication `condition ⇒ clause` over domain-value
/// literals: the condition is a conjunction, the clause a disjunction.
///
/// An *optimality* constraint has a non-empty clause and a possibly empty
/// condition; a *feasibility* constraint (an element of the closure) always
/// has an empty condition. Both are projections of the same shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Constraint {
	condition: BTreeSet<Lit>,
	clause: BTreeSet<Lit>,
}

impl Constraint {
	/// Creates a feasibility constraint from the literals of a closure
	/// clause.
	///
	/// Panics if the clause is empty.
	pub fn feasibility<I: IntoIterator<Item = Lit>>(clause: I) -> Self {
		let clause: BTreeSet<Lit> = clause.into_iter().collect();
		assert!(!clause.is_empty(), "a constraint requires a non-empty clause");
		Self {
			condition: BTreeSet::new(),
			clause,
		}
	}

	/// Creates an optimality constraint. The condition is a conjunction of
	/// selected domain values, so its literals must be positive.
	///
	/// Panics if the clause is empty or the condition contains a negated
	/// literal.
	pub fn optimality<I, J>(condition: I, clause: J) -> Self
	where
		I: IntoIterator<Item = Lit>,
		J: IntoIterator<Item = Lit>,
	{
		let condition: BTreeSet<Lit> = condition.into_iter().collect();
		let clause: BTreeSet<Lit> = clause.into_iter().collect();
		assert!(!clause.is_empty(), "a constraint requires a non-empty clause");
		assert!(
			condition.iter().all(|lit| !lit.is_negated()),
			"a condition selects domain values, so its literals must be positive"
		);
		Self { condition, clause }
	}

	/// Starts a constraint over the domain values of `table`.
	pub fn builder(table: &DomainTable) -> ConstraintBuilder<'_> {
		ConstraintBuilder {
			table,
			condition: BTreeSet::new(),
			clause: BTreeSet::new(),
		}
	}

	pub fn condition(&self) -> impl Iterator<Item = Lit> + '_ {
		self.condition.iter().copied()
	}

	pub fn clause(&self) -> impl Iterator<Item = Lit> + '_ {
		self.clause.iter().copied()
	}

	pub fn is_feasibility(&self) -> bool {
		self.condition.is_empty()
	}

	/// Translates `condition ⇒ clause` into the equivalent disjunction
	/// `¬condition ∨ clause`.
	pub fn as_clause(&self) -> Clause {
		self.condition
			.iter()
			.map(|&lit| !lit)
			.chain(self.clause.iter().copied())
			.collect()
	}
}

impl Display for Constraint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use itertools::Itertools;
		if self.condition.is_empty() {
			write!(f, "{{{}}}", self.clause.iter().format(" ∨ "))
		} else {
			write!(
				f,
				"{{{} → {}}}",
				self.condition.iter().format(" ∧ "),
				self.clause.iter().format(" ∨ ")
			)
		}
	}
}

/// Builds a [`Constraint`] from domain-value names, resolved against a
/// [`DomainTable`].
///
/// Panics on unknown names and on an empty clause, which are programming
/// errors in the preference specification.
#[derive(Clone, Debug)]
pub struct ConstraintBuilder<'a> {
	table: &'a DomainTable,
	condition: BTreeSet<Lit>,
	clause: BTreeSet<Lit>,
}

impl ConstraintBuilder<'_> {
	/// Adds a domain value to the condition side.
	pub fn when(mut self, value: &str) -> Self {
		let _ = self.condition.insert(self.resolve(value));
		self
	}

	/// Adds a domain value to the clause side.
	pub fn prefer(mut self, value: &str) -> Self {
		let _ = self.clause.insert(self.resolve(value));
		self
	}

	pub fn build(self) -> Constraint {
		assert!(
			!self.clause.is_empty(),
			"a constraint requires a non-empty clause"
		);
		Constraint {
			condition: self.condition,
			clause: self.clause,
		}
	}

	fn resolve(&self, value: &str) -> Lit {
		self.table
			.lit(value)
			.unwrap_or_else(|| panic!("unknown domain value '{value}'"))
	}
}

/// A bijection between domain-value names and the literals `1..=N`, plus the
/// grouping of domain values into CP-net variable blocks. Pure lookup; used
/// for building constraints and decoding outcomes.
#[derive(Clone, Debug, Default)]
pub struct DomainTable {
	values: Vec<String>,
	index: HashMap<String, u32>,
	variables: Vec<(String, Vec<u32>)>,
}

impl DomainTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers a CP-net variable and its domain values. Literals are
	/// assigned in registration order.
	///
	/// Panics on a duplicate domain value or an empty domain.
	pub fn add_variable<S, I, V>(&mut self, variable: S, values: I)
	where
		S: Into<String>,
		I: IntoIterator<Item = V>,
		V: Into<String>,
	{
		let variable = variable.into();
		let mut block = Vec::new();
		for value in values {
			let value = value.into();
			let var = self.values.len() as u32 + 1;
			let prev = self.index.insert(value.clone(), var);
			assert!(prev.is_none(), "duplicate domain value '{value}'");
			self.values.push(value);
			block.push(var);
		}
		assert!(!block.is_empty(), "variable '{variable}' has an empty domain");
		self.variables.push((variable, block));
	}

	/// The positive literal of a domain value.
	pub fn lit(&self, value: &str) -> Option<Lit> {
		self.index
			.get(value)
			.map(|&var| Lit::new(var as i32).unwrap())
	}

	/// The domain value a literal refers to, regardless of its sign.
	pub fn value(&self, lit: Lit) -> Option<&str> {
		self.values
			.get(lit.var() as usize - 1)
			.map(String::as_str)
	}

	pub fn num_values(&self) -> u32 {
		self.values.len() as u32
	}

	pub fn is_empty(&self) -> bool {
		self.values.is_empty()
	}

	/// The registered CP-net variables with their domain blocks, in
	/// registration order.
	pub fn variables(&self) -> impl Iterator<Item = (&str, &[u32])> {
		self.variables
			.iter()
			.map(|(name, block)| (name.as_str(), block.as_slice()))
	}
}

/// One chosen domain value per CP-net variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Outcome {
	assignment: BTreeMap<String, String>,
}

impl Outcome {
	/// Decodes a model into an outcome: for every variable block of `table`,
	/// the model must select exactly one domain value. Zero or multiple
	/// selections signal malformed input constraints and are fatal.
	pub fn decode(model: &Model, table: &DomainTable) -> Result<Self, Error> {
		let chosen: BTreeSet<u32> = model.positives().map(|lit| lit.var()).collect();
		let mut assignment = BTreeMap::new();
		for (variable, block) in table.variables() {
			let selected: Vec<u32> = block
				.iter()
				.copied()
				.filter(|var| chosen.contains(var))
				.collect();
			if selected.len() != 1 {
				return Err(Error::DecodeInconsistency {
					variable: variable.to_owned(),
					found: selected.len(),
				});
			}
			let value = table.values[selected[0] as usize - 1].clone();
			let _ = assignment.insert(variable.to_owned(), value);
		}
		Ok(Self { assignment })
	}

	pub fn value(&self, variable: &str) -> Option<&str> {
		self.assignment.get(variable).map(String::as_str)
	}

	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.assignment
			.iter()
			.map(|(variable, value)| (variable.as_str(), value.as_str()))
	}

	pub fn len(&self) -> usize {
		self.assignment.len()
	}

	pub fn is_empty(&self) -> bool {
		self.assignment.is_empty()
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Outcome {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self {
			assignment: iter
				.into_iter()
				.map(|(variable, value)| (variable.into(), value.into()))
				.collect(),
		}
	}
}

impl Display for Outcome {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		use itertools::Itertools;
		write!(
			f,
			"{{{}}}",
			self.assignment
				.iter()
				.format_with(", ", |(variable, value), g| g(&format_args!(
					"{variable}: {value}"
				)))
		)
	}
}
