//! Model reconciliation
//!
//! Merges a freshly parsed and inferred schema into an existing model.
//! Matched tables keep their uuid and canvas layout; only their column list
//! is replaced. Both policies are pure: same inputs, same output.

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::inference::parse_and_infer;
use crate::core::schema::{RelationshipOps, SchemaGraph, TableOps};
use crate::core::sql_parser::{ParseError, SqlDialect};

/// How [`reconcile`] treats tables and edges missing from the incoming model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergePolicy {
    /// Merge incoming tables into the model; nothing is ever deleted.
    AdditiveImport,
    /// The incoming model is the source of truth: tables absent from it are
    /// deleted and the edge set is replaced wholesale.
    AuthoritativeSync,
}

/// Merges `incoming` into `existing` and returns the new model.
pub fn reconcile(
    existing: &SchemaGraph,
    incoming: &SchemaGraph,
    policy: MergePolicy,
) -> SchemaGraph {
    let mut merged = existing.clone();

    // incoming node -> node in the merged graph
    let mut remap: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    // stale column uuid -> replacement column (matched by name) on merged tables
    let mut column_remap: HashMap<Uuid, Option<Uuid>> = HashMap::new();

    for incoming_idx in incoming.node_indices() {
        let Some(incoming_table) = incoming.node_weight(incoming_idx) else {
            continue;
        };
        match merged.find_table_by_name(&incoming_table.name) {
            Some(existing_idx) => {
                if let Some(table) = merged.node_weight_mut(existing_idx) {
                    for old in &table.columns {
                        let replacement = incoming_table
                            .find_column(&old.name)
                            .map(|c| c.uuid);
                        column_remap.insert(old.uuid, replacement);
                    }
                    table.columns = incoming_table.columns.clone();
                }
                remap.insert(incoming_idx, existing_idx);
            }
            None => {
                remap.insert(incoming_idx, merged.add_node(incoming_table.clone()));
            }
        }
    }

    if policy == MergePolicy::AuthoritativeSync {
        // Text is truth: drop tables absent from the incoming parse and
        // replace the edge set with the freshly inferred one.
        let stale: Vec<NodeIndex> = merged
            .node_indices()
            .filter(|idx| !remap.values().any(|kept| kept == idx))
            .collect();
        for idx in stale {
            merged.remove_node(idx);
        }
        let old_edges: Vec<_> = merged.edge_indices().collect();
        for edge in old_edges {
            merged.remove_edge(edge);
        }
    }

    for edge in incoming.edge_references() {
        let (Some(&source), Some(&target)) = (remap.get(&edge.source()), remap.get(&edge.target()))
        else {
            continue;
        };
        // Deduplicated by unordered pair; a second edge between the same
        // tables is dropped even if its cardinality differs.
        if !merged.has_relationship_between(source, target) {
            merged.add_edge(source, target, edge.weight().clone());
        }
    }

    // Kept edges may still reference replaced columns; re-point them at the
    // same-named replacement so column pairings stay resolvable.
    let edges: Vec<_> = merged.edge_indices().collect();
    for edge in edges {
        if let Some(relationship) = merged.edge_weight_mut(edge) {
            if let Some(column) = relationship.source_column
                && let Some(&mapped) = column_remap.get(&column)
            {
                relationship.source_column = mapped;
            }
            if let Some(column) = relationship.target_column
                && let Some(&mapped) = column_remap.get(&column)
            {
                relationship.target_column = mapped;
            }
        }
    }

    debug!(
        ?policy,
        tables = merged.node_count(),
        edges = merged.edge_count(),
        "reconciled schema"
    );
    merged
}

/// Additive import: a parse failure surfaces to the caller and the model is
/// left completely unchanged.
pub fn import_sql(
    existing: &SchemaGraph,
    sql: &str,
    dialect: SqlDialect,
) -> Result<SchemaGraph, ParseError> {
    let incoming = parse_and_infer(sql, dialect)?;
    Ok(reconcile(existing, &incoming, MergePolicy::AdditiveImport))
}

/// Authoritative sync: the text is truth. A parse failure is an expected
/// mid-edit transient, so it is swallowed and the prior good model is
/// returned unchanged; no issue is reported.
pub fn sync_sql(existing: &SchemaGraph, sql: &str, dialect: SqlDialect) -> SchemaGraph {
    match parse_and_infer(sql, dialect) {
        Ok(incoming) => reconcile(existing, &incoming, MergePolicy::AuthoritativeSync),
        Err(err) => {
            warn!(%err, "sync parse failed, keeping last good model");
            existing.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::SchemaSnapshot;

    fn model(sql: &str) -> SchemaGraph {
        parse_and_infer(sql, SqlDialect::MySql).unwrap()
    }

    #[test]
    fn test_import_preserves_identity_and_layout() {
        let mut existing = model("CREATE TABLE users (id INT PRIMARY KEY);");
        let users_idx = existing.find_table_by_name("users").unwrap();
        let users_uuid = existing.node_weight(users_idx).unwrap().uuid;
        // Simulate a canvas drag and recolor.
        {
            let table = existing.node_weight_mut(users_idx).unwrap();
            table.position = (420.0, 77.0);
            table.color = Some("#ff0000".to_string());
        }

        let merged = import_sql(
            &existing,
            "CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(255));",
            SqlDialect::MySql,
        )
        .unwrap();

        let idx = merged.find_table_by_name("users").unwrap();
        let table = merged.node_weight(idx).unwrap();
        assert_eq!(table.uuid, users_uuid);
        assert_eq!(table.position, (420.0, 77.0));
        assert_eq!(table.color.as_deref(), Some("#ff0000"));
        assert_eq!(table.columns.len(), 2);
    }

    #[test]
    fn test_import_never_deletes() {
        let existing = model(
            "CREATE TABLE users (id INT PRIMARY KEY); CREATE TABLE posts (id INT PRIMARY KEY);",
        );
        let merged = import_sql(
            &existing,
            "CREATE TABLE comments (id INT PRIMARY KEY);",
            SqlDialect::MySql,
        )
        .unwrap();

        assert_eq!(merged.node_count(), 3);
        assert!(merged.table_exists("users"));
        assert!(merged.table_exists("posts"));
        assert!(merged.table_exists("comments"));
    }

    #[test]
    fn test_import_deduplicates_edges_by_pair() {
        let sql = r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE posts (id INT PRIMARY KEY, user_id INT);
        "#;
        let existing = model(sql);
        assert_eq!(existing.edge_count(), 1);

        // Re-importing the same text must not duplicate the relationship.
        let merged = import_sql(&existing, sql, SqlDialect::MySql).unwrap();
        assert_eq!(merged.node_count(), 2);
        assert_eq!(merged.edge_count(), 1);
    }

    #[test]
    fn test_import_repoints_edge_columns_after_column_replacement() {
        let sql = r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE posts (id INT PRIMARY KEY, user_id INT);
        "#;
        let existing = model(sql);
        let merged = import_sql(&existing, sql, SqlDialect::MySql).unwrap();

        // The kept edge must reference columns that live on the merged tables.
        let edge = merged.edge_references().next().unwrap();
        let source = merged.node_weight(edge.source()).unwrap();
        let target = merged.node_weight(edge.target()).unwrap();
        let relationship = edge.weight();
        assert!(
            source
                .column_by_uuid(relationship.source_column.unwrap())
                .is_some()
        );
        assert!(
            target
                .column_by_uuid(relationship.target_column.unwrap())
                .is_some()
        );
    }

    #[test]
    fn test_sync_deletes_absent_tables() {
        let existing = model(
            "CREATE TABLE users (id INT PRIMARY KEY); CREATE TABLE posts (id INT PRIMARY KEY);",
        );
        let synced = sync_sql(
            &existing,
            "CREATE TABLE users (id INT PRIMARY KEY);",
            SqlDialect::MySql,
        );

        assert_eq!(synced.node_count(), 1);
        assert!(synced.table_exists("users"));
        assert!(!synced.table_exists("posts"));
    }

    #[test]
    fn test_sync_replaces_edge_set() {
        let existing = model(
            r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE posts (id INT PRIMARY KEY, user_id INT);
            "#,
        );
        assert_eq!(existing.edge_count(), 1);

        // The new text drops the foreign-key-shaped column: no edges survive.
        let synced = sync_sql(
            &existing,
            r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            CREATE TABLE posts (id INT PRIMARY KEY);
            "#,
            SqlDialect::MySql,
        );
        assert_eq!(synced.node_count(), 2);
        assert_eq!(synced.edge_count(), 0);
    }

    #[test]
    fn test_sync_swallows_parse_failure() {
        let existing = model("CREATE TABLE users (id INT PRIMARY KEY);");
        let before = SchemaSnapshot::capture(&existing);

        // Mid-edit transient: keep the last good model, report nothing.
        let synced = sync_sql(&existing, "CREATE TABLE users (id IN", SqlDialect::MySql);
        assert_eq!(SchemaSnapshot::capture(&synced), before);
    }

    #[test]
    fn test_sync_empty_text_clears_model() {
        let existing = model("CREATE TABLE users (id INT PRIMARY KEY);");
        let synced = sync_sql(&existing, "", SqlDialect::MySql);
        assert_eq!(synced.node_count(), 0);
    }

    #[test]
    fn test_import_surfaces_parse_failure() {
        let existing = model("CREATE TABLE users (id INT PRIMARY KEY);");
        let result = import_sql(&existing, "CREATE TABEL x (id INT);", SqlDialect::MySql);
        assert!(matches!(result, Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_reconcile_is_deterministic() {
        let existing = model(
            "CREATE TABLE users (id INT PRIMARY KEY); CREATE TABLE posts (id INT PRIMARY KEY, user_id INT);",
        );
        let incoming = model("CREATE TABLE users (id INT PRIMARY KEY, email VARCHAR(255));");

        let a = reconcile(&existing, &incoming, MergePolicy::AdditiveImport);
        let b = reconcile(&existing, &incoming, MergePolicy::AdditiveImport);
        assert_eq!(SchemaSnapshot::capture(&a), SchemaSnapshot::capture(&b));
    }
}
