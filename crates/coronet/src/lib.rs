pub(crate) mod closure;
pub(crate) mod constraint;
pub(crate) mod error;
pub(crate) mod forest;
pub(crate) mod oracle;
pub(crate) mod pareto;
pub(crate) mod sat;

pub use closure::{Closure, ClosureBuilder, SearchMode};
pub use constraint::{Constraint, ConstraintBuilder, DomainTable, Outcome};
pub use error::Error;
pub use forest::CandidateForest;
pub use oracle::{DominanceOracle, EntailmentOracle, OracleError};
pub use pareto::ParetoComputer;
pub use sat::{Clause, Formula, Lit, Model};
