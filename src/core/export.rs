//! Schema emitters
//!
//! Pure, deterministic rendering of a schema graph into relational DDL, a
//! Mongoose document-schema stub, or a lossless JSON snapshot. Output depends
//! only on model content and table/column/edge insertion order, so
//! regenerating over unchanged input is diff-stable.

use petgraph::visit::EdgeRef;
use petgraph::visit::IntoEdgeReferences;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::schema::{Column, Relationship, SchemaGraph, Table};
use crate::core::sql_parser::SqlDialect;

/// Output form of [`emit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum ExportFormat {
    #[display("mysql")]
    MySql,
    #[display("postgresql")]
    Postgres,
    #[display("mongodb")]
    MongoDb,
    #[display("json")]
    Json,
}

/// Knobs for text emission.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExportOptions {
    /// Emit a `-- Position: (x, y)` comment above each table so canvas
    /// layout survives a round trip through the text editor.
    pub include_positions: bool,
}

/// Renders the model as text in the requested format.
pub fn emit(graph: &SchemaGraph, format: ExportFormat) -> String {
    emit_with_options(graph, format, &ExportOptions::default())
}

pub fn emit_with_options(
    graph: &SchemaGraph,
    format: ExportFormat,
    options: &ExportOptions,
) -> String {
    match format {
        ExportFormat::MySql => emit_relational(graph, SqlDialect::MySql, options),
        ExportFormat::Postgres => emit_relational(graph, SqlDialect::Postgres, options),
        ExportFormat::MongoDb => emit_mongoose(graph),
        ExportFormat::Json => {
            serde_json::to_string_pretty(&SchemaSnapshot::capture(graph)).unwrap_or_default()
        }
    }
}

fn emit_relational(graph: &SchemaGraph, dialect: SqlDialect, options: &ExportOptions) -> String {
    let mut sql = String::new();

    for idx in graph.node_indices() {
        let Some(table) = graph.node_weight(idx) else {
            continue;
        };
        let table_name = table_identifier(&table.name);

        if options.include_positions {
            sql.push_str(&format!(
                "-- Position: ({}, {})\n",
                table.position.0, table.position.1
            ));
        }
        sql.push_str(&format!("CREATE TABLE {} (\n", quote(dialect, &table_name)));

        let primary_keys: Vec<String> = table
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| quote(dialect, &c.name))
            .collect();

        for (i, column) in table.columns.iter().enumerate() {
            let nullable = if column.is_nullable { "NULL" } else { "NOT NULL" };
            let mut line = format!(
                "  {} {} {}",
                quote(dialect, &column.name),
                render_type(dialect, column),
                nullable
            );
            if i < table.columns.len() - 1 || !primary_keys.is_empty() {
                line.push(',');
            }
            sql.push_str(&line);
            sql.push('\n');
        }

        if !primary_keys.is_empty() {
            sql.push_str(&format!("  PRIMARY KEY ({})\n", primary_keys.join(", ")));
        }
        sql.push_str(");\n\n");
    }

    for edge in graph.edge_references() {
        let (Some(source), Some(target)) = (
            graph.node_weight(edge.source()),
            graph.node_weight(edge.target()),
        ) else {
            continue;
        };
        let relationship = edge.weight();
        let source_table = table_identifier(&source.name);
        let target_table = table_identifier(&target.name);

        let source_column = relationship
            .source_column
            .and_then(|uuid| source.column_by_uuid(uuid));
        let target_column = relationship
            .target_column
            .and_then(|uuid| target.column_by_uuid(uuid));

        match (source_column, target_column) {
            (Some(source_column), Some(target_column)) => {
                sql.push_str(&format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({});\n\n",
                    quote(dialect, &source_table),
                    quote(dialect, &format!("fk_{}_{}", source_table, target_table)),
                    quote(dialect, &source_column.name),
                    quote(dialect, &target_table),
                    quote(dialect, &target_column.name),
                ));
            }
            // Without a resolved column pairing the relationship is still
            // documented, just not enforceable.
            _ => {
                sql.push_str(&format!(
                    "-- Relationship: {} -> {} ({})\n\n",
                    source_table, target_table, relationship.cardinality
                ));
            }
        }
    }

    sql
}

/// Maps a canonical type through the fixed per-dialect lookup and re-attaches
/// the length when the rendered type can carry one.
fn render_type(dialect: SqlDialect, column: &Column) -> String {
    let upper = column.base_type.to_uppercase();
    let mapped = match dialect {
        SqlDialect::MySql => match upper.as_str() {
            "UUID" => "CHAR(36)".to_string(),
            "JSONB" => "JSON".to_string(),
            "INTEGER" => "INT".to_string(),
            "BOOLEAN" => "TINYINT(1)".to_string(),
            _ => upper,
        },
        SqlDialect::Postgres => match upper.as_str() {
            "INT" => "INTEGER".to_string(),
            "DATETIME" => "TIMESTAMP".to_string(),
            "BLOB" => "BYTEA".to_string(),
            "JSON" => "JSONB".to_string(),
            "TINYINT" => "BOOLEAN".to_string(),
            _ => upper,
        },
    };

    let skip_length = mapped.contains('(')
        || (dialect == SqlDialect::Postgres
            && matches!(
                mapped.as_str(),
                "TEXT" | "JSONB" | "BOOLEAN" | "INTEGER" | "TIMESTAMP"
            ));
    match &column.length {
        Some(length) if !skip_length => format!("{mapped}({length})"),
        _ => mapped,
    }
}

fn quote(dialect: SqlDialect, identifier: &str) -> String {
    match dialect {
        SqlDialect::MySql => identifier.to_string(),
        SqlDialect::Postgres => format!("\"{identifier}\""),
    }
}

/// Table names come from a free-form canvas label.
fn table_identifier(name: &str) -> String {
    name.to_lowercase().split_whitespace().collect::<Vec<_>>().join("_")
}

fn emit_mongoose(graph: &SchemaGraph) -> String {
    let mut output =
        String::from("const mongoose = require('mongoose');\nconst { Schema } = mongoose;\n\n");

    for idx in graph.node_indices() {
        let Some(table) = graph.node_weight(idx) else {
            continue;
        };
        let schema_name = format!("{}Schema", table.name);

        output.push_str(&format!("const {schema_name} = new Schema({{\n"));
        for column in &table.columns {
            output.push_str(&format!(
                "  {}: {{ type: {} }},\n",
                column.name,
                mongoose_type(&column.base_type)
            ));
        }
        output.push_str("});\n\n");
        output.push_str(&format!(
            "const {0} = mongoose.model('{0}', {schema_name});\n\n",
            table.name
        ));
    }

    output
}

/// Flattens relational types onto the document-schema set. Relationships are
/// deliberately not translated into embedded references.
fn mongoose_type(base_type: &str) -> &'static str {
    let upper = base_type.to_uppercase();
    let mut mapped = "String";
    if ["INT", "INTEGER", "BIGINT", "DECIMAL", "FLOAT"]
        .iter()
        .any(|t| upper.contains(t))
    {
        mapped = "Number";
    }
    if upper.contains("BOOLEAN") || upper.contains("TINYINT") {
        mapped = "Boolean";
    }
    if upper.contains("DATE") || upper.contains("TIME") {
        mapped = "Date";
    }
    if upper.contains("JSON") {
        mapped = "Map";
    }
    mapped
}

/// Lossless structural serialization of `{tables, edges}`, for
/// backup/restore of the full model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<Table>,
    pub edges: Vec<EdgeSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EdgeSnapshot {
    pub source_table: Uuid,
    pub target_table: Uuid,
    #[serde(flatten)]
    pub relationship: Relationship,
}

impl SchemaSnapshot {
    /// Captures the full structural content of `graph`, in insertion order.
    pub fn capture(graph: &SchemaGraph) -> Self {
        let tables = graph
            .node_indices()
            .filter_map(|idx| graph.node_weight(idx).cloned())
            .collect();
        let edges = graph
            .edge_references()
            .filter_map(|edge| {
                Some(EdgeSnapshot {
                    source_table: graph.node_weight(edge.source())?.uuid,
                    target_table: graph.node_weight(edge.target())?.uuid,
                    relationship: edge.weight().clone(),
                })
            })
            .collect();
        Self { tables, edges }
    }

    /// Rebuilds a graph from the snapshot; exact inverse of [`capture`].
    pub fn into_graph(self) -> SchemaGraph {
        let mut graph = SchemaGraph::new();
        let mut by_uuid: HashMap<Uuid, petgraph::graph::NodeIndex> = HashMap::new();
        for table in self.tables {
            let uuid = table.uuid;
            by_uuid.insert(uuid, graph.add_node(table));
        }
        for edge in self.edges {
            if let (Some(&source), Some(&target)) = (
                by_uuid.get(&edge.source_table),
                by_uuid.get(&edge.target_table),
            ) {
                graph.add_edge(source, target, edge.relationship);
            }
        }
        graph
    }
}
