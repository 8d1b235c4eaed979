//! Relationship inference
//!
//! Turns parsed `CREATE TABLE` records into a candidate schema graph.
//! Explicit `FOREIGN KEY` constraints are resolved first; remaining gaps are
//! filled from column-naming conventions. Inference never fails: at worst a
//! constraint or column yields no edge.

use petgraph::graph::NodeIndex;
use std::collections::HashSet;
use tracing::debug;
use uuid::Uuid;

use crate::core::schema::{Cardinality, Column, Relationship, SchemaGraph, Table, TableOps};
use crate::core::sql_parser::{CreateTableStatement, ParseError, SqlDialect, parse_sql};

/// Parses `sql` and builds a candidate model with explicit and inferred
/// relationships. This is the text-to-model entry point; merge the result
/// into a live model with [`crate::core::reconcile`].
pub fn parse_and_infer(sql: &str, dialect: SqlDialect) -> Result<SchemaGraph, ParseError> {
    let statements = parse_sql(sql, dialect)?;
    Ok(build_graph(&statements))
}

/// Builds the candidate graph from parsed statements.
pub fn build_graph(statements: &[CreateTableStatement]) -> SchemaGraph {
    let mut graph = SchemaGraph::new();

    for (index, statement) in statements.iter().enumerate() {
        if graph.table_exists(&statement.name) {
            // Duplicate CREATE TABLE in one batch: first definition wins.
            continue;
        }
        let (x, y) = statement.position.unwrap_or_else(|| initial_position(index));
        let mut table = Table::new(&statement.name).with_position(x, y);
        for spec in &statement.columns {
            let mut column = Column::new(&spec.name, &spec.base_type);
            column.length = spec.length.clone();
            column.is_primary_key = spec.is_primary_key;
            column.is_nullable = spec.is_nullable;
            table.columns.push(column);
        }
        graph.add_node(table);
    }

    // One unordered-pair set feeds both passes, so a second or mirrored edge
    // between two tables is never created.
    let mut paired = PairSet::new();
    let explicit = explicit_pass(&mut graph, statements, &mut paired);
    let inferred = heuristic_pass(&mut graph, &mut paired);

    debug!(
        tables = graph.node_count(),
        explicit, inferred, "built candidate schema"
    );
    graph
}

/// Explicit pass: every resolvable FOREIGN KEY constraint becomes one edge
/// with both column references filled in.
fn explicit_pass(
    graph: &mut SchemaGraph,
    statements: &[CreateTableStatement],
    paired: &mut PairSet,
) -> usize {
    let mut created = 0;

    for statement in statements {
        let Some(source_idx) = graph.find_table_by_name(&statement.name) else {
            continue;
        };
        for fk in &statement.foreign_keys {
            let Some(target_idx) = graph.find_table_by_name(&fk.referenced_table) else {
                debug!(
                    table = %statement.name,
                    referenced = %fk.referenced_table,
                    "skipping foreign key to unknown table"
                );
                continue;
            };

            let source_column = graph
                .node_weight(source_idx)
                .and_then(|t| t.find_column(&fk.column))
                .map(|c| c.uuid);
            let target_column = graph
                .node_weight(target_idx)
                .and_then(|t| t.find_column(&fk.referenced_column))
                .map(|c| c.uuid);
            let (Some(source_column), Some(target_column)) = (source_column, target_column) else {
                continue;
            };

            if !paired.insert(source_idx, target_idx) {
                continue;
            }

            mark_foreign_key(graph, source_idx, source_column);
            let name = edge_name(graph, source_idx, &fk.column, target_idx);
            graph.add_edge(
                source_idx,
                target_idx,
                Relationship::new(name, Cardinality::OneToMany)
                    .with_columns(source_column, target_column),
            );
            created += 1;
        }
    }
    created
}

/// Heuristic pass: columns whose names look like foreign keys to another
/// table get an edge targeting that table's primary key. First matching
/// target table wins; no scoring beyond pass order.
fn heuristic_pass(graph: &mut SchemaGraph, paired: &mut PairSet) -> usize {
    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    let names: Vec<(NodeIndex, String)> = nodes
        .iter()
        .filter_map(|&idx| graph.node_weight(idx).map(|t| (idx, t.name.to_lowercase())))
        .collect();

    struct InferredEdge {
        source: NodeIndex,
        source_column: Uuid,
        column_name: String,
        target: NodeIndex,
        target_column: Option<Uuid>,
    }

    let mut edges: Vec<InferredEdge> = Vec::new();
    for &source_idx in &nodes {
        let Some(source) = graph.node_weight(source_idx) else {
            continue;
        };
        for column in &source.columns {
            if column.is_foreign_key {
                continue;
            }
            let column_name = column.name.to_lowercase();
            for (target_idx, target_name) in &names {
                if *target_idx == source_idx {
                    continue;
                }
                if !matches_foreign_key_pattern(&column_name, target_name) {
                    continue;
                }
                if paired.insert(source_idx, *target_idx) {
                    let target_column = graph
                        .node_weight(*target_idx)
                        .and_then(|t| t.primary_key_column())
                        .map(|c| c.uuid);
                    edges.push(InferredEdge {
                        source: source_idx,
                        source_column: column.uuid,
                        column_name: column_name.clone(),
                        target: *target_idx,
                        target_column,
                    });
                }
                break;
            }
        }
    }

    let created = edges.len();
    for edge in edges {
        mark_foreign_key(graph, edge.source, edge.source_column);
        let name = edge_name(graph, edge.source, &edge.column_name, edge.target);
        let mut relationship = Relationship::new(name, Cardinality::OneToMany);
        relationship.source_column = Some(edge.source_column);
        relationship.target_column = edge.target_column;
        graph.add_edge(edge.source, edge.target, relationship);
    }
    created
}

/// Tests a lowercased column name against the foreign-key naming patterns for
/// a table: `{t}_id`, `id_{t}`, `{t}id`, plus the same with a trailing `s`
/// stripped from the table name.
fn matches_foreign_key_pattern(column: &str, table: &str) -> bool {
    let singular = table.strip_suffix('s').unwrap_or(table);
    [table, singular].iter().any(|t| {
        column == format!("{t}_id") || column == format!("id_{t}") || column == format!("{t}id")
    })
}

fn mark_foreign_key(graph: &mut SchemaGraph, table: NodeIndex, column: Uuid) {
    if let Some(table) = graph.node_weight_mut(table)
        && let Some(column) = table.columns.iter_mut().find(|c| c.uuid == column)
    {
        column.is_foreign_key = true;
    }
}

fn edge_name(graph: &SchemaGraph, source: NodeIndex, column: &str, target: NodeIndex) -> String {
    let table_name = |idx| {
        graph
            .node_weight(idx)
            .map(|t: &Table| t.name.to_lowercase())
            .unwrap_or_default()
    };
    format!(
        "fk_{}_{}_{}",
        table_name(source),
        column.to_lowercase(),
        table_name(target)
    )
}

/// Deterministic left-to-right placement for tables without a position
/// comment.
fn initial_position(index: usize) -> (f64, f64) {
    (100.0 + index as f64 * 260.0, 100.0)
}

/// Unordered table-pair set.
struct PairSet(HashSet<(NodeIndex, NodeIndex)>);

impl PairSet {
    fn new() -> Self {
        Self(HashSet::new())
    }

    /// Returns false if the pair is already connected.
    fn insert(&mut self, a: NodeIndex, b: NodeIndex) -> bool {
        let key = if a.index() <= b.index() { (a, b) } else { (b, a) };
        self.0.insert(key)
    }
}
