//! Circular dependency detection infrastructure.

use ahash::{AHashMap, AHashSet};
use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::wrapper::WrapperId;
use crate::Token;

/// Wrappers currently being instantiated along one resolution chain.
///
/// Carried by value down the async call tree, so concurrent sibling
/// resolutions each see only their own ancestors.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionPath {
    stack: SmallVec<[WrapperId; 16]>,
}

impl ResolutionPath {
    /// Extends the path with `id`.
    ///
    /// Fails with `CircularDependency` when `id` is already on the path and
    /// with `DepthExceeded` past `max_depth` entries.
    pub(crate) fn enter<F>(&self, id: WrapperId, max_depth: usize, name_of: F) -> DiResult<ResolutionPath>
    where
        F: Fn(WrapperId) -> String,
    {
        // Cycle check before pushing
        if let Some(start) = self.stack.iter().position(|entry| *entry == id) {
            let path = self.stack[start..]
                .iter()
                .chain(std::iter::once(&id))
                .map(|entry| name_of(*entry))
                .collect();
            return Err(DiError::CircularDependency { path });
        }

        if self.stack.len() >= max_depth {
            return Err(DiError::DepthExceeded(max_depth));
        }

        let mut next = self.clone();
        next.stack.push(id);
        Ok(next)
    }

    pub(crate) fn names<F>(&self, name_of: F) -> Vec<String>
    where
        F: Fn(WrapperId) -> String,
    {
        self.stack.iter().map(|entry| name_of(*entry)).collect()
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}

/// Searches the factory providers of one module for a dependency cycle.
///
/// `nodes` lists each factory token with its evaluated `inject` tokens in
/// registration order; a token registered twice (multi providers) merges its
/// edges. Returns the first cycle found as `[a, b, .., a]`.
pub(crate) fn find_factory_cycle(nodes: &[(Token, Vec<Token>)]) -> Option<Vec<Token>> {
    let mut order: Vec<&Token> = Vec::new();
    let mut edges: AHashMap<&Token, Vec<&Token>> = AHashMap::new();
    for (token, deps) in nodes {
        let entry = edges.entry(token).or_insert_with(|| {
            order.push(token);
            Vec::new()
        });
        entry.extend(deps.iter());
    }

    let mut search = CycleSearch {
        edges: &edges,
        stack: Vec::new(),
        done: AHashSet::new(),
    };
    order.into_iter().find_map(|start| {
        if search.done.contains(start) {
            None
        } else {
            search.visit(start)
        }
    })
}

struct CycleSearch<'a> {
    edges: &'a AHashMap<&'a Token, Vec<&'a Token>>,
    stack: Vec<&'a Token>,
    done: AHashSet<&'a Token>,
}

impl<'a> CycleSearch<'a> {
    fn visit(&mut self, node: &'a Token) -> Option<Vec<Token>> {
        let edges = self.edges;
        self.stack.push(node);
        if let Some(deps) = edges.get(node) {
            for dep in deps.iter().copied() {
                // Only edges between factory providers count
                if !edges.contains_key(dep) {
                    continue;
                }
                if let Some(start) = self.stack.iter().position(|entry| *entry == dep) {
                    let mut cycle: Vec<Token> = self.stack[start..].iter().map(|t| (*t).clone()).collect();
                    cycle.push(dep.clone());
                    return Some(cycle);
                }
                if !self.done.contains(dep) {
                    if let Some(cycle) = self.visit(dep) {
                        return Some(cycle);
                    }
                }
            }
        }
        self.stack.pop();
        self.done.insert(node);
        None
    }
}
