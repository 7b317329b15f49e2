//! FILENAME: engine/src/engine.rs
//! PURPOSE: The reactive evaluation engine tying all subsystems together.
//! CONTEXT: Every content mutation funnels through `on_cell_changed`: the
//! engine re-extracts the cell's references, updates the dependency graph,
//! checks for cycles, re-evaluates the affected cells in topological order,
//! and notifies observers. The engine owns the model, the graph, and the
//! result cache outright; everything runs synchronously on the caller's
//! thread and nothing here blocks or performs I/O.
//!
//! Re-entrant mutation from inside an observer is not supported; a guard
//! flag turns such calls into logged no-ops instead of corrupting state.

use crate::addr::CellId;
use crate::cell::{CellFormat, CellResult, CellValue, EvalError};
use crate::dependency_graph::DependencyGraph;
use crate::evaluator::Evaluator;
use crate::extract::extract_references;
use crate::model::{Model, SheetState};
use log::{debug, warn};
use parser::Parser;
use std::collections::{HashMap, HashSet};

/// Observer callback: receives the cell and its freshly stored result.
pub type Listener = Box<dyn Fn(CellId, &CellResult)>;

/// The spreadsheet engine.
pub struct Engine {
    model: Model,
    graph: DependencyGraph,
    results: HashMap<CellId, CellResult>,
    cell_listeners: HashMap<CellId, Vec<Listener>>,
    global_listeners: Vec<Listener>,
    /// Guards against observers mutating cells mid-recalculation.
    recalculating: bool,
}

impl Engine {
    /// Creates an engine over an empty sheet with the given dimensions.
    pub fn new(rows: u32, cols: u32) -> Self {
        Engine {
            model: Model::new(rows, cols),
            graph: DependencyGraph::new(),
            results: HashMap::new(),
            cell_listeners: HashMap::new(),
            global_listeners: Vec::new(),
            recalculating: false,
        }
    }

    /// Read access to the underlying model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The cached result of a cell, if it has ever been evaluated.
    pub fn get_result(&self, cell: CellId) -> Option<&CellResult> {
        self.results.get(&cell)
    }

    // ========================================================================
    // MUTATION ENTRY POINTS
    // ========================================================================

    /// Stores new content for a cell and runs the full re-evaluation pipeline.
    pub fn set_content(&mut self, cell: CellId, content: impl Into<String>) {
        self.model.set_content(cell, content);
        self.on_cell_changed(cell);
    }

    /// Clears a cell's content and re-evaluates everything that read it.
    pub fn clear_cell(&mut self, cell: CellId) {
        self.model.clear(cell);
        self.on_cell_changed(cell);
    }

    /// The full pipeline for one changed cell:
    /// refresh its outgoing edges, check for cycles, re-evaluate the cell and
    /// its transitive dependents in topological order, then publish each
    /// result exactly once, in that same order.
    pub fn on_cell_changed(&mut self, cell: CellId) {
        if self.recalculating {
            warn!("re-entrant cell change for {} ignored", cell);
            return;
        }
        self.recalculating = true;

        let raw = self
            .model
            .get_content(cell)
            .unwrap_or_default()
            .to_string();
        let edges = extract_references(&raw);
        self.graph.set_dependencies(cell, edges);

        // A cycle freezes only the offending cell; its dependents still
        // re-evaluate below and cascade a referenced-error of their own.
        let in_cycle = match self.graph.detect_cycle(cell) {
            Some(path) => {
                debug!("cycle detected from {}: {} cells", cell, path.len());
                self.results.insert(cell, Err(EvalError::Cycle(path)));
                true
            }
            None => false,
        };

        let order = self.graph.recalc_order(cell);
        debug!("cell {} changed; re-evaluating {} cells", cell, order.len());

        for &affected in &order {
            if in_cycle && affected == cell {
                continue;
            }
            let result = self.evaluate_cell(affected);
            self.results.insert(affected, result);
        }

        for &affected in &order {
            self.publish(affected);
        }

        self.recalculating = false;
    }

    /// Re-evaluates every cell that has content. The dependency graph is
    /// rebuilt from scratch first, so this also repairs the engine after a
    /// state import. Running it twice in a row changes nothing.
    pub fn refresh_all(&mut self) {
        if self.recalculating {
            warn!("re-entrant refresh ignored");
            return;
        }
        self.recalculating = true;

        let cells: Vec<(CellId, String)> = self
            .model
            .cells_with_content()
            .map(|(id, raw)| (id, raw.to_string()))
            .collect();

        self.graph.clear();
        for (id, raw) in &cells {
            self.graph.set_dependencies(*id, extract_references(raw));
        }

        let content_set: HashSet<CellId> = cells.iter().map(|&(id, _)| id).collect();
        let sorted = self.graph.topological_sort(&content_set);
        let sorted_set: HashSet<CellId> = sorted.iter().copied().collect();

        // Cells the sort left out sit in a cycle or downstream of one.
        let mut cycle_members = Vec::new();
        let mut downstream = HashSet::new();
        for &id in content_set.difference(&sorted_set) {
            match self.graph.detect_cycle(id) {
                Some(path) if path.contains(&id) => cycle_members.push((id, path)),
                _ => {
                    downstream.insert(id);
                }
            }
        }

        let mut publish_order = Vec::with_capacity(content_set.len());

        for &id in &sorted {
            let result = self.evaluate_cell(id);
            self.results.insert(id, result);
            publish_order.push(id);
        }

        for (id, path) in cycle_members {
            self.results.insert(id, Err(EvalError::Cycle(path)));
            publish_order.push(id);
        }

        // The downstream cells form an acyclic subgraph of their own now
        // that the cycle members already hold their errors.
        for id in self.graph.topological_sort(&downstream) {
            let result = self.evaluate_cell(id);
            self.results.insert(id, result);
            publish_order.push(id);
        }

        debug!("refreshed {} cells", publish_order.len());
        for id in publish_order {
            self.publish(id);
        }

        self.recalculating = false;
    }

    // ========================================================================
    // EVALUATION
    // ========================================================================

    /// Computes a single cell's result from its raw content and the current
    /// result cache. Formula cells parse and evaluate; literal cells become
    /// numbers only when the numeric round-trip reproduces the trimmed text,
    /// so inputs like "007" or "1e3" stay text.
    fn evaluate_cell(&self, cell: CellId) -> CellResult {
        let raw = match self.model.get_content(cell) {
            Some(raw) => raw,
            None => return Ok(CellValue::Empty),
        };

        if let Some(body) = raw.strip_prefix('=') {
            let ast = Parser::new(body)
                .parse()
                .map_err(|e| EvalError::Parse(e.message))?;
            let lookup = |id: CellId| self.results.get(&id).cloned();
            return Evaluator::new(&lookup, self.model.bounds()).evaluate(&ast);
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CellValue::Empty);
        }

        // is_finite keeps "inf"/"NaN" out: both parse and round-trip, but a
        // cell literally saying "inf" must stay text.
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && n.to_string() == trimmed => Ok(CellValue::Number(n)),
            _ => Ok(CellValue::Text(raw.to_string())),
        }
    }

    // ========================================================================
    // OBSERVERS
    // ========================================================================

    /// Subscribes to changes of a single cell.
    pub fn subscribe(&mut self, cell: CellId, listener: impl Fn(CellId, &CellResult) + 'static) {
        self.cell_listeners
            .entry(cell)
            .or_default()
            .push(Box::new(listener));
    }

    /// Subscribes to every cell change.
    pub fn subscribe_all(&mut self, listener: impl Fn(CellId, &CellResult) + 'static) {
        self.global_listeners.push(Box::new(listener));
    }

    fn publish(&self, cell: CellId) {
        let Some(result) = self.results.get(&cell) else {
            return;
        };
        if let Some(listeners) = self.cell_listeners.get(&cell) {
            for listener in listeners {
                listener(cell, result);
            }
        }
        for listener in &self.global_listeners {
            listener(cell, result);
        }
    }

    // ========================================================================
    // MODEL PASSTHROUGHS (no evaluation impact)
    // ========================================================================

    pub fn set_format(&mut self, cell: CellId, format: CellFormat) {
        self.model.set_format(cell, format);
    }

    pub fn set_column_width(&mut self, col: u32, width: f64) {
        self.model.set_column_width(col, width);
    }

    pub fn set_row_height(&mut self, row: u32, height: f64) {
        self.model.set_row_height(row, height);
    }

    pub fn set_selected(&mut self, cell: Option<CellId>) {
        self.model.set_selected(cell);
    }

    pub fn copy_cell(&mut self, cell: CellId) {
        self.model.copy_cell(cell);
    }

    // ========================================================================
    // STATE IMPORT / EXPORT
    // ========================================================================

    pub fn export_state(&self) -> SheetState {
        self.model.export_state()
    }

    /// Replaces the whole sheet and rebuilds the graph and result cache.
    pub fn import_state(&mut self, state: SheetState) {
        self.model.import_state(state);
        self.graph.clear();
        self.results.clear();
        self.refresh_all();
    }
}
