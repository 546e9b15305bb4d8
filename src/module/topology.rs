//! Import topology used to order modules by depth.

use ahash::{AHashMap, AHashSet};

use super::{ModuleGraph, ModuleId};

#[derive(Debug)]
struct TreeNode {
    module: ModuleId,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Tree over the import graph rooted at the application module.
///
/// A module reachable through several parents keeps a single node, attached
/// under the deepest parent seen while traversing. Back edges are dropped, so
/// the structure stays a tree even when imports form cycles.
///
/// # Examples
///
/// ```
/// use ferrous_inject::{ModuleGraph, TopologyTree};
/// # use ferrous_inject::ModuleId;
/// # fn demo(graph: &ModuleGraph, root: ModuleId) {
/// let tree = TopologyTree::new(graph, root);
/// tree.walk(|module, depth| println!("{} at depth {}", graph.module(module).name(), depth));
/// # }
/// ```
#[derive(Debug)]
pub struct TopologyTree {
    nodes: Vec<TreeNode>,
    links: AHashMap<ModuleId, usize>,
}

impl TopologyTree {
    pub fn new(graph: &ModuleGraph, root: ModuleId) -> Self {
        Self::from_edges(root, |module| {
            graph.module(module).imports.iter().map(|id| Some(*id)).collect()
        })
    }

    /// Builds the tree from an adjacency function. `None` children model
    /// undefined import entries and are skipped.
    pub fn from_edges<F>(root: ModuleId, children_of: F) -> Self
    where
        F: Fn(ModuleId) -> Vec<Option<ModuleId>>,
    {
        let mut tree = Self {
            nodes: vec![TreeNode {
                module: root,
                parent: None,
                children: Vec::new(),
            }],
            links: AHashMap::new(),
        };
        tree.links.insert(root, 0);
        tree.traverse(0, 1, &children_of);
        tree
    }

    fn traverse<F>(&mut self, node: usize, depth: usize, children_of: &F)
    where
        F: Fn(ModuleId) -> Vec<Option<ModuleId>>,
    {
        for child in children_of(self.nodes[node].module).into_iter().flatten() {
            match self.links.get(&child).copied() {
                None => {
                    let index = self.nodes.len();
                    self.nodes.push(TreeNode {
                        module: child,
                        parent: Some(node),
                        children: Vec::new(),
                    });
                    self.nodes[node].children.push(index);
                    self.links.insert(child, index);
                    self.traverse(index, depth + 1, children_of);
                }
                Some(existing) => {
                    if self.has_cycle_with(node, existing) {
                        continue;
                    }
                    let current = self.depth(existing);
                    if current.map_or(false, |d| d < depth + 1) {
                        self.relink(existing, node);
                        self.traverse(existing, depth + 1, children_of);
                    }
                }
            }
        }
    }

    /// True if `target` is `node` or one of its ancestors.
    fn has_cycle_with(&self, node: usize, target: usize) -> bool {
        let mut visited = AHashSet::new();
        let mut current = Some(node);
        while let Some(index) = current {
            if index == target {
                return true;
            }
            if !visited.insert(index) {
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    fn relink(&mut self, node: usize, parent: usize) {
        if let Some(old) = self.nodes[node].parent {
            self.nodes[old].children.retain(|child| *child != node);
        }
        self.nodes[node].parent = Some(parent);
        self.nodes[parent].children.push(node);
    }

    /// Depth of a node, `None` when its parent chain loops.
    fn depth(&self, node: usize) -> Option<usize> {
        let mut visited = AHashSet::new();
        let mut depth = 0;
        let mut current = Some(node);
        while let Some(index) = current {
            if !visited.insert(index) {
                return None;
            }
            depth += 1;
            current = self.nodes[index].parent;
        }
        Some(depth)
    }

    /// Depth-first traversal from the root, calling `visit(module, depth)`
    /// with the root at depth 1.
    pub fn walk<F>(&self, mut visit: F)
    where
        F: FnMut(ModuleId, usize),
    {
        let mut visited = AHashSet::new();
        self.walk_node(0, 1, &mut visit, &mut visited);
    }

    fn walk_node<F>(&self, node: usize, depth: usize, visit: &mut F, visited: &mut AHashSet<usize>)
    where
        F: FnMut(ModuleId, usize),
    {
        if !visited.insert(node) {
            return;
        }
        visit(self.nodes[node].module, depth);
        for child in &self.nodes[node].children {
            self.walk_node(*child, depth + 1, visit, visited);
        }
    }

    pub fn depth_of(&self, module: ModuleId) -> Option<usize> {
        self.links.get(&module).and_then(|node| self.depth(*node))
    }

    pub fn parent_of(&self, module: ModuleId) -> Option<ModuleId> {
        let node = self.links.get(&module)?;
        self.nodes[*node].parent.map(|parent| self.nodes[parent].module)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
