use index_vec::IndexVec;
use rayon::prelude::*;

use crate::sat::{Clause, Lit};

index_vec::define_index_type! {
	/// Identifies a candidate node within the forest arena.
	pub struct NodeRef = u32;
}

/// A candidate position: a literal plus a reference to its parent. The path
/// from a node to its root is the partial clause under evaluation.
#[derive(Clone, Copy, Debug)]
struct Node {
	lit: Lit,
	parent: Option<NodeRef>,
}

/// Level-wise enumeration of the subsets of the literal universe
/// `{1, -1, …, N, -N}` that never contain both a literal and its negation.
///
/// Every literal of variable `v` is succeeded by the literals of the
/// variables above `v`, both polarities, in canonical order. This ordering
/// generates each admissible literal subset exactly once: after `N` calls to
/// [`CandidateForest::expand`] the forest is empty.
///
/// Nodes live in an arena and refer to their parent by index, so a level can
/// be expanded without touching the nodes of earlier levels.
#[derive(Clone, Debug)]
pub struct CandidateForest {
	num_vars: u32,
	nodes: IndexVec<NodeRef, Node>,
	fringe: Vec<NodeRef>,
}

impl CandidateForest {
	/// Creates a forest with one root per literal of `1..=num_vars`.
	pub fn new(num_vars: u32) -> Self {
		assert!(num_vars >= 1, "the literal universe cannot be empty");
		let nodes: IndexVec<NodeRef, Node> = successors(num_vars, 0)
			.map(|lit| Node { lit, parent: None })
			.collect();
		let fringe = (0..nodes.len()).map(NodeRef::from).collect();
		Self {
			num_vars,
			nodes,
			fringe,
		}
	}

	/// The current fringe, each node materialized as its path-to-root
	/// partial clause. The sequence is tied to the current level; it is
	/// finite and yields branches in canonical order.
	pub fn branches(&self) -> impl Iterator<Item = Clause> + '_ {
		self.fringe.iter().map(|&leaf| self.branch(leaf))
	}

	/// Expands the fringe by one level. Nodes for which `filter` returns
	/// true are replaced by one child per successor literal; the others are
	/// dropped and their branches are never extended again. A node whose
	/// literal has no successors simply disappears.
	///
	/// Branches are evaluated data-parallel: `filter` must be callable
	/// concurrently and free of side effects visible across siblings. See
	/// [`CandidateForest::expand_ordered`] for the sequential variant.
	pub fn expand<F>(&mut self, filter: F)
	where
		F: Fn(&Clause) -> bool + Sync,
	{
		let keep: Vec<bool> = self
			.fringe
			.par_iter()
			.map(|&leaf| filter(&self.branch(leaf)))
			.collect();
		self.replace_fringe(&keep);
	}

	/// Like [`CandidateForest::expand`], but branches are evaluated one at a
	/// time in canonical order, which lifts the concurrency constraints on
	/// `filter`.
	pub fn expand_ordered<F>(&mut self, mut filter: F)
	where
		F: FnMut(&Clause) -> bool,
	{
		let keep: Vec<bool> = self
			.fringe
			.iter()
			.map(|&leaf| filter(&self.branch(leaf)))
			.collect();
		self.replace_fringe(&keep);
	}

	/// Expands the fringe according to a precomputed mask over
	/// [`CandidateForest::branches`].
	///
	/// Panics if the mask length differs from the fringe size.
	pub fn expand_masked(&mut self, mask: &[bool]) {
		assert_eq!(
			mask.len(),
			self.fringe.len(),
			"mask length must match the fringe"
		);
		self.replace_fringe(mask);
	}

	pub fn len(&self) -> usize {
		self.fringe.len()
	}

	pub fn is_empty(&self) -> bool {
		self.fringe.is_empty()
	}

	fn branch(&self, leaf: NodeRef) -> Clause {
		let mut clause = Clause::new();
		let mut cursor = Some(leaf);
		while let Some(node) = cursor {
			let node = &self.nodes[node];
			let _ = clause.insert(node.lit);
			cursor = node.parent;
		}
		clause
	}

	fn replace_fringe(&mut self, keep: &[bool]) {
		let old = std::mem::take(&mut self.fringe);
		for (leaf, &kept) in old.into_iter().zip(keep) {
			if !kept {
				continue;
			}
			let var = self.nodes[leaf].lit.var();
			for lit in successors(self.num_vars, var) {
				let child = self.nodes.push(Node {
					lit,
					parent: Some(leaf),
				});
				self.fringe.push(child);
			}
		}
	}
}

/// The literals of the variables strictly above `var`, in canonical order:
/// `var+1, -(var+1), …, num_vars, -num_vars`.
fn successors(num_vars: u32, var: u32) -> impl Iterator<Item = Lit> {
	(var + 1..=num_vars).flat_map(|v| {
		let lit = Lit::new(v as i32).unwrap();
		[lit, !lit]
	})
}
