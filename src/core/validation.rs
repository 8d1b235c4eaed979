//! Schema validation
//!
//! A fixed battery of structural and referential checks over the schema
//! graph. Findings are data, never errors: the caller gets a severity-ranked
//! list, identically ordered for identical input.

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::schema::{Column, Relationship, SchemaGraph, Table};

/// Severity of a validation finding.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, derive_more::Display,
)]
pub enum Severity {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
    #[display("info")]
    Info,
}

/// A single validation finding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Stable slug, usable as a UI list key.
    pub id: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_tables: Vec<String>,
}

/// Runs the full validation battery over `graph`.
///
/// Issues are ordered errors first, then warnings, then info; insertion
/// order is kept within a severity band.
pub fn validate(graph: &SchemaGraph) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if graph.node_count() == 0 {
        return issues;
    }

    check_orphan_tables(graph, &mut issues);
    check_missing_primary_keys(graph, &mut issues);
    check_foreign_key_types(graph, &mut issues);
    check_duplicate_relationships(graph, &mut issues);
    check_circular_dependency(graph, &mut issues);
    check_empty_tables(graph, &mut issues);

    if issues.is_empty() {
        issues.push(ValidationIssue {
            id: "all-good".to_string(),
            severity: Severity::Info,
            title: "Schema Valid".to_string(),
            description: "No issues were found in this schema.".to_string(),
            affected_tables: Vec::new(),
        });
    }

    issues.sort_by_key(|issue| issue.severity);
    issues
}

/// Tables with no incident edges, only meaningful when the model holds more
/// than one table. One aggregated warning.
fn check_orphan_tables(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    if graph.node_count() <= 1 {
        return;
    }
    let orphans: Vec<String> = graph
        .node_indices()
        .filter(|&idx| {
            graph.edges_directed(idx, Direction::Outgoing).next().is_none()
                && graph.edges_directed(idx, Direction::Incoming).next().is_none()
        })
        .filter_map(|idx| graph.node_weight(idx).map(|t| t.name.clone()))
        .collect();

    if !orphans.is_empty() {
        issues.push(ValidationIssue {
            id: "orphan-tables".to_string(),
            severity: Severity::Warning,
            title: format!("{} Disconnected Tables", orphans.len()),
            description:
                "These tables have no relationship to any other table. Consider adding one."
                    .to_string(),
            affected_tables: orphans,
        });
    }
}

fn check_missing_primary_keys(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    for idx in graph.node_indices() {
        let Some(table) = graph.node_weight(idx) else {
            continue;
        };
        if table.columns.iter().any(|c| c.is_primary_key) {
            continue;
        }
        issues.push(ValidationIssue {
            id: format!("no-pk-{}", table.name.to_lowercase()),
            severity: Severity::Error,
            title: "Missing Primary Key".to_string(),
            description: format!("Table \"{}\" has no PRIMARY KEY column.", table.name),
            affected_tables: vec![table.name.clone()],
        });
    }
}

fn check_foreign_key_types(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    for edge in graph.edge_references() {
        let (Some(source), Some(target)) = (
            graph.node_weight(edge.source()),
            graph.node_weight(edge.target()),
        ) else {
            continue;
        };
        let Some(target_pk) = target.primary_key_column() else {
            continue;
        };
        let Some(fk_column) = find_fk_column(source, target, edge.weight()) else {
            continue;
        };
        if compatible_types(&fk_column.base_type, &target_pk.base_type) {
            continue;
        }
        issues.push(ValidationIssue {
            id: format!(
                "type-mismatch-{}-{}",
                source.name.to_lowercase(),
                target.name.to_lowercase()
            ),
            severity: Severity::Error,
            title: "Foreign Key Type Mismatch".to_string(),
            description: format!(
                "Column \"{}\" ({}) in \"{}\" is not compatible with primary key \"{}\" ({}) in \"{}\".",
                fk_column.name,
                fk_column.type_label(),
                source.name,
                target_pk.name,
                target_pk.type_label(),
                target.name
            ),
            affected_tables: vec![source.name.clone(), target.name.clone()],
        });
    }
}

fn check_duplicate_relationships(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    let mut seen: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    for edge in graph.edge_references() {
        let (a, b) = (edge.source(), edge.target());
        let key = if a.index() <= b.index() { (a, b) } else { (b, a) };
        if seen.insert(key) {
            continue;
        }
        let (Some(source), Some(target)) = (graph.node_weight(a), graph.node_weight(b)) else {
            continue;
        };
        issues.push(ValidationIssue {
            id: format!("duplicate-edge-{}", edge.weight().uuid),
            severity: Severity::Warning,
            title: "Duplicate Relationship".to_string(),
            description: format!(
                "More than one relationship connects \"{}\" and \"{}\".",
                source.name, target.name
            ),
            affected_tables: vec![source.name.clone(), target.name.clone()],
        });
    }
}

/// Depth-first traversal with an explicit recursion stack. Only the first
/// cycle found across the whole traversal is reported, even if others exist.
fn check_circular_dependency(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    let Some(cycle) = find_first_cycle(graph) else {
        return;
    };
    issues.push(ValidationIssue {
        id: "circular-dependency".to_string(),
        severity: Severity::Warning,
        title: "Circular Dependency Detected".to_string(),
        description: "Tables reference each other in a cycle, which can make inserts fail."
            .to_string(),
        affected_tables: cycle,
    });
}

fn check_empty_tables(graph: &SchemaGraph, issues: &mut Vec<ValidationIssue>) {
    for idx in graph.node_indices() {
        let Some(table) = graph.node_weight(idx) else {
            continue;
        };
        if !table.columns.is_empty() {
            continue;
        }
        issues.push(ValidationIssue {
            id: format!("empty-table-{}", table.name.to_lowercase()),
            severity: Severity::Warning,
            title: "Empty Table".to_string(),
            description: format!("Table \"{}\" has no columns.", table.name),
            affected_tables: vec![table.name.clone()],
        });
    }
}

/// Locates the source-side foreign key column for an edge: the resolved
/// column reference, an explicit FK flag, or a heuristic name match against
/// the target table.
fn find_fk_column<'a>(
    source: &'a Table,
    target: &Table,
    relationship: &Relationship,
) -> Option<&'a Column> {
    if let Some(uuid) = relationship.source_column
        && let Some(column) = source.column_by_uuid(uuid)
    {
        return Some(column);
    }
    let target_name = target.name.to_lowercase();
    source.columns.iter().find(|c| {
        let name = c.name.to_lowercase();
        c.is_foreign_key
            || name == format!("{target_name}_id")
            || name == format!("id_{target_name}")
            || name.contains(&target_name)
    })
}

/// Compatibility families for FK -> PK matching: integer-like, string-like,
/// and uuid against char/varchar.
fn compatible_types(fk: &str, pk: &str) -> bool {
    let fk = normalize_type(fk);
    let pk = normalize_type(pk);
    if fk == pk {
        return true;
    }
    const FAMILIES: &[(&str, &[&str])] = &[
        ("int", &["int", "integer", "bigint", "smallint", "tinyint"]),
        ("integer", &["int", "integer", "bigint", "smallint", "tinyint"]),
        ("bigint", &["bigint", "int", "integer"]),
        ("varchar", &["varchar", "char", "text"]),
        ("char", &["char", "varchar"]),
        ("text", &["text", "varchar", "char"]),
        ("uuid", &["uuid", "char", "varchar"]),
    ];
    FAMILIES
        .iter()
        .any(|(base, members)| *base == fk && members.contains(&pk.as_str()))
}

/// Strips length/precision and casing, e.g. `VARCHAR(36)` -> `varchar`.
fn normalize_type(raw: &str) -> String {
    match raw.find('(') {
        Some(open) => raw[..open].trim().to_lowercase(),
        None => raw.trim().to_lowercase(),
    }
}

/// Returns the member table names of the first cycle found, from the
/// re-entry point onward.
fn find_first_cycle(graph: &SchemaGraph) -> Option<Vec<String>> {
    fn dfs(
        graph: &SchemaGraph,
        node: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        stack: &mut Vec<NodeIndex>,
        on_stack: &mut HashSet<NodeIndex>,
    ) -> Option<Vec<String>> {
        if on_stack.contains(&node) {
            let at = stack.iter().position(|&n| n == node)?;
            return Some(
                stack[at..]
                    .iter()
                    .filter_map(|&idx| graph.node_weight(idx).map(|t| t.name.clone()))
                    .collect(),
            );
        }
        if visited.contains(&node) {
            return None;
        }
        visited.insert(node);
        on_stack.insert(node);
        stack.push(node);

        for neighbor in graph.neighbors(node) {
            if let Some(cycle) = dfs(graph, neighbor, visited, stack, on_stack) {
                return Some(cycle);
            }
        }

        stack.pop();
        on_stack.remove(&node);
        None
    }

    let mut visited = HashSet::new();
    let mut stack = Vec::new();
    let mut on_stack = HashSet::new();
    for node in graph.node_indices() {
        if visited.contains(&node) {
            continue;
        }
        if let Some(cycle) = dfs(graph, node, &mut visited, &mut stack, &mut on_stack) {
            return Some(cycle);
        }
    }
    None
}
