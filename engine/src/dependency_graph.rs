//! FILENAME: engine/src/dependency_graph.rs
//! PURPOSE: Implements the directed graph for tracking cell dependencies.
//! CONTEXT: This module is the heart of the spreadsheet's recalculation
//! engine. It tracks which cells depend on which other cells
//! (precedents/dependents), detects circular references, and computes the
//! correct evaluation order for the cells affected by a change.
//!
//! TERMINOLOGY:
//! - Precedents: Cells that a formula cell references (its inputs).
//!   If A3 = A1 + A2, then A1 and A2 are precedents of A3.
//! - Dependents: Cells that reference a given cell (reverse lookup).
//!   If A3 = A1 + A2, then A3 is a dependent of A1 and A2.
//!
//! USAGE:
//! 1. When a cell's content changes, call `set_dependencies()` with the
//!    cell and its freshly extracted precedents.
//! 2. Call `detect_cycle()` from the changed cell; a returned path means the
//!    cell must not be re-evaluated.
//! 3. Call `recalc_order()` to get the changed cell plus its transitive
//!    dependents in evaluation order.
//!
//! The two maps are mirror images of each other and every operation keeps
//! them consistent: b is in precedents[a] exactly when a is in dependents[b].

use crate::addr::CellId;
use std::collections::{HashMap, HashSet, VecDeque};

/// The Dependency Graph tracks relationships between cells.
/// It maintains both forward (precedents) and reverse (dependents) mappings
/// for efficient lookups in either direction.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// For each cell, the set of cells it directly depends on (its precedents).
    /// If A3 = A1 + A2, then precedents[A3] = {A1, A2}.
    precedents: HashMap<CellId, HashSet<CellId>>,

    /// For each cell, the set of cells that directly depend on it (its dependents).
    /// If A3 = A1 + A2, then dependents[A1] contains A3, and dependents[A2] contains A3.
    dependents: HashMap<CellId, HashSet<CellId>>,
}

impl DependencyGraph {
    /// Creates a new, empty dependency graph.
    pub fn new() -> Self {
        DependencyGraph {
            precedents: HashMap::new(),
            dependents: HashMap::new(),
        }
    }

    /// Sets the dependencies for a cell, replacing any previous dependencies.
    /// Old edges are removed before the new ones are installed, so both maps
    /// stay consistent across the call.
    ///
    /// # Note
    /// This does NOT check for cycles; run `detect_cycle()` afterwards.
    pub fn set_dependencies(&mut self, cell: CellId, new_precedents: HashSet<CellId>) {
        // First, remove old dependencies
        self.clear_dependencies(cell);

        // Add new precedents for this cell
        if !new_precedents.is_empty() {
            // Update the dependents map: for each precedent, add this cell as a dependent
            for &prec in &new_precedents {
                self.dependents.entry(prec).or_default().insert(cell);
            }

            // Store the precedents for this cell
            self.precedents.insert(cell, new_precedents);
        }
    }

    /// Clears all dependencies for a cell.
    /// Call this when a cell becomes a literal value or is cleared.
    pub fn clear_dependencies(&mut self, cell: CellId) {
        // Get the old precedents, if any
        if let Some(old_precs) = self.precedents.remove(&cell) {
            // Remove this cell from each precedent's dependents set
            for prec in old_precs {
                if let Some(deps) = self.dependents.get_mut(&prec) {
                    deps.remove(&cell);
                    // Clean up empty sets
                    if deps.is_empty() {
                        self.dependents.remove(&prec);
                    }
                }
            }
        }
    }

    /// Returns the direct precedents of a cell (cells it directly references).
    pub fn get_precedents(&self, cell: CellId) -> Option<&HashSet<CellId>> {
        self.precedents.get(&cell)
    }

    /// Returns the direct dependents of a cell (cells that directly reference it).
    pub fn get_dependents(&self, cell: CellId) -> Option<&HashSet<CellId>> {
        self.dependents.get(&cell)
    }

    /// Searches for a cycle reachable from `start` by following precedent
    /// edges. Returns the cycle path with the entry cell repeated at the end
    /// (e.g. [A1, B1, A1]), or None if every chain terminates.
    pub fn detect_cycle(&self, start: CellId) -> Option<Vec<CellId>> {
        let mut stack = Vec::new();
        let mut visited = HashSet::new();
        self.cycle_dfs(start, &mut stack, &mut visited)
    }

    /// Depth-first search carrying the current chain in `stack`.
    /// Revisiting a cell that is still on the stack closes a cycle; cells
    /// fully explored earlier are skipped.
    fn cycle_dfs(
        &self,
        cell: CellId,
        stack: &mut Vec<CellId>,
        visited: &mut HashSet<CellId>,
    ) -> Option<Vec<CellId>> {
        if let Some(pos) = stack.iter().position(|&c| c == cell) {
            let mut path = stack[pos..].to_vec();
            path.push(cell);
            return Some(path);
        }

        if !visited.insert(cell) {
            return None;
        }

        stack.push(cell);
        if let Some(precs) = self.precedents.get(&cell) {
            for &prec in precs {
                if let Some(path) = self.cycle_dfs(prec, stack, visited) {
                    return Some(path);
                }
            }
        }
        stack.pop();

        None
    }

    /// Returns the cells to re-evaluate when `start` changes: the cell
    /// itself followed by its transitive dependents, ordered so that every
    /// cell appears before anything that depends on it.
    ///
    /// The order is the reverse post-order of a DFS over dependent edges,
    /// which is a topological order of the affected subgraph.
    pub fn recalc_order(&self, start: CellId) -> Vec<CellId> {
        let mut visited = HashSet::new();
        let mut postorder = Vec::new();
        self.dependents_dfs(start, &mut visited, &mut postorder);
        postorder.reverse();
        postorder
    }

    fn dependents_dfs(
        &self,
        cell: CellId,
        visited: &mut HashSet<CellId>,
        postorder: &mut Vec<CellId>,
    ) {
        if !visited.insert(cell) {
            return;
        }

        if let Some(deps) = self.dependents.get(&cell) {
            for &dep in deps {
                self.dependents_dfs(dep, visited, postorder);
            }
        }

        postorder.push(cell);
    }

    /// Performs a topological sort on a subset of cells using Kahn's algorithm.
    /// Returns the cells in an order where each cell comes after all its
    /// precedents; cells caught in a cycle are left out of the result.
    /// Used by full-sheet refreshes where there is no single changed cell.
    pub fn topological_sort(&self, cells: &HashSet<CellId>) -> Vec<CellId> {
        // Build in-degree map (only counting edges within the subset)
        let mut in_degree: HashMap<CellId, usize> = HashMap::new();
        for &cell in cells {
            in_degree.insert(cell, 0);
        }

        for &cell in cells {
            if let Some(precs) = self.precedents.get(&cell) {
                let count = precs.iter().filter(|p| cells.contains(p)).count();
                in_degree.insert(cell, count);
            }
        }

        // Start from cells that have no precedents in the subset
        let mut queue: VecDeque<CellId> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&cell, _)| cell)
            .collect();

        let mut result = Vec::with_capacity(cells.len());

        while let Some(cell) = queue.pop_front() {
            result.push(cell);

            if let Some(deps) = self.dependents.get(&cell) {
                for &dep in deps {
                    if let Some(deg) = in_degree.get_mut(&dep) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(dep);
                        }
                    }
                }
            }
        }

        result
    }

    /// Returns the total number of cells that have dependencies.
    pub fn formula_cell_count(&self) -> usize {
        self.precedents.len()
    }

    /// Returns the total number of dependency relationships.
    pub fn dependency_count(&self) -> usize {
        self.precedents.values().map(|v| v.len()).sum()
    }

    /// Clears the entire dependency graph.
    pub fn clear(&mut self) {
        self.precedents.clear();
        self.dependents.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CellId {
        CellId::parse(s).unwrap()
    }

    fn set_of(ids: &[&str]) -> HashSet<CellId> {
        ids.iter().map(|s| id(s)).collect()
    }

    #[test]
    fn test_set_and_get_dependencies() {
        let mut graph = DependencyGraph::new();

        // A3 = A1 + A2
        graph.set_dependencies(id("A3"), set_of(&["A1", "A2"]));

        let precs = graph.get_precedents(id("A3")).unwrap();
        assert!(precs.contains(&id("A1")));
        assert!(precs.contains(&id("A2")));
        assert_eq!(precs.len(), 2);

        assert!(graph.get_dependents(id("A1")).unwrap().contains(&id("A3")));
        assert!(graph.get_dependents(id("A2")).unwrap().contains(&id("A3")));
    }

    #[test]
    fn test_clear_dependencies() {
        let mut graph = DependencyGraph::new();

        graph.set_dependencies(id("A3"), set_of(&["A1", "A2"]));
        graph.clear_dependencies(id("A3"));

        assert!(graph.get_precedents(id("A3")).is_none());
        assert!(graph.get_dependents(id("A1")).is_none());
        assert!(graph.get_dependents(id("A2")).is_none());
    }

    #[test]
    fn test_replacing_edges_removes_old_reverse_entries() {
        let mut graph = DependencyGraph::new();

        // Initially A3 = A1 + A2, then change to A3 = B1
        graph.set_dependencies(id("A3"), set_of(&["A1", "A2"]));
        graph.set_dependencies(id("A3"), set_of(&["B1"]));

        let precs = graph.get_precedents(id("A3")).unwrap();
        assert_eq!(precs.len(), 1);
        assert!(precs.contains(&id("B1")));

        assert!(graph.get_dependents(id("A1")).is_none());
        assert!(graph.get_dependents(id("A2")).is_none());
        assert!(graph.get_dependents(id("B1")).unwrap().contains(&id("A3")));
    }

    #[test]
    fn test_mutual_consistency_invariant() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("C1"), set_of(&["A1", "B1"]));
        graph.set_dependencies(id("D1"), set_of(&["B1", "C1"]));

        for (&cell, precs) in graph.precedents.iter() {
            for prec in precs {
                assert!(
                    graph.dependents.get(prec).unwrap().contains(&cell),
                    "{} in precedents[{}] but {} not in dependents[{}]",
                    prec,
                    cell,
                    cell,
                    prec
                );
            }
        }
        for (&cell, deps) in graph.dependents.iter() {
            for dep in deps {
                assert!(
                    graph.precedents.get(dep).unwrap().contains(&cell),
                    "{} in dependents[{}] but {} not in precedents[{}]",
                    dep,
                    cell,
                    cell,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_detect_cycle_self_reference() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("A1"), set_of(&["A1"]));

        let path = graph.detect_cycle(id("A1")).unwrap();
        assert_eq!(path, vec![id("A1"), id("A1")]);
    }

    #[test]
    fn test_detect_cycle_two_cells() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("A1"), set_of(&["B1"]));
        graph.set_dependencies(id("B1"), set_of(&["A1"]));

        let path = graph.detect_cycle(id("A1")).unwrap();
        assert_eq!(path, vec![id("A1"), id("B1"), id("A1")]);
        // The path must visit some cell twice
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn test_detect_cycle_transitive() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("A1"), set_of(&["B1"]));
        graph.set_dependencies(id("B1"), set_of(&["C1"]));
        graph.set_dependencies(id("C1"), set_of(&["A1"]));

        let path = graph.detect_cycle(id("A1")).unwrap();
        assert_eq!(path.len(), 4);
        assert_eq!(path.first(), path.last());
    }

    #[test]
    fn test_no_false_positive_cycle() {
        let mut graph = DependencyGraph::new();

        // Diamond: D1 reads B1 and C1, both read A1 — shared precedents,
        // no cycle.
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&["A1"]));
        graph.set_dependencies(id("D1"), set_of(&["B1", "C1"]));

        assert_eq!(graph.detect_cycle(id("D1")), None);
        assert_eq!(graph.detect_cycle(id("A1")), None);
    }

    #[test]
    fn test_cycle_not_reachable_from_start() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("A1"), set_of(&["B1"]));
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&["D1"]));

        // C1's chain never touches the A1/B1 loop
        assert_eq!(graph.detect_cycle(id("C1")), None);
    }

    #[test]
    fn test_recalc_order_starts_with_the_changed_cell() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&["B1"]));

        let order = graph.recalc_order(id("A1"));
        assert_eq!(order, vec![id("A1"), id("B1"), id("C1")]);
    }

    #[test]
    fn test_recalc_order_diamond() {
        let mut graph = DependencyGraph::new();

        //     A1
        //    /  \
        //   B1  C1
        //    \  /
        //     D1
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&["A1"]));
        graph.set_dependencies(id("D1"), set_of(&["B1", "C1"]));

        let order = graph.recalc_order(id("A1"));
        assert_eq!(order.len(), 4);
        assert_eq!(order[0], id("A1"));

        let pos =
            |cell: &str| order.iter().position(|&c| c == id(cell)).unwrap();
        assert!(pos("D1") > pos("B1"));
        assert!(pos("D1") > pos("C1"));
        assert!(pos("B1") > pos("A1"));
        assert!(pos("C1") > pos("A1"));
    }

    #[test]
    fn test_recalc_order_without_dependents() {
        let graph = DependencyGraph::new();
        assert_eq!(graph.recalc_order(id("A1")), vec![id("A1")]);
    }

    #[test]
    fn test_topological_sort_subset() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&["B1"]));

        let order = graph.topological_sort(&set_of(&["A1", "B1", "C1"]));
        assert_eq!(order, vec![id("A1"), id("B1"), id("C1")]);
    }

    #[test]
    fn test_topological_sort_leaves_cycles_out() {
        let mut graph = DependencyGraph::new();
        graph.set_dependencies(id("A1"), set_of(&["B1"]));
        graph.set_dependencies(id("B1"), set_of(&["A1"]));
        graph.set_dependencies(id("C1"), set_of(&[]));

        let order = graph.topological_sort(&set_of(&["A1", "B1", "C1"]));
        assert_eq!(order, vec![id("C1")]);
    }

    #[test]
    fn test_counts() {
        let mut graph = DependencyGraph::new();

        assert_eq!(graph.formula_cell_count(), 0);
        assert_eq!(graph.dependency_count(), 0);

        graph.set_dependencies(id("A2"), set_of(&["A1"]));
        graph.set_dependencies(id("A3"), set_of(&["A1", "A2"]));

        assert_eq!(graph.formula_cell_count(), 2);
        assert_eq!(graph.dependency_count(), 3);
    }
}
