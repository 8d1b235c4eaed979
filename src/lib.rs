//! erdsync - Schema Synchronization & Validation Engine
//!
//! Keeps a visual ERD model and SQL `CREATE TABLE` text consistent: parses
//! SQL into a graph model, infers foreign-key relationships, merges re-parsed
//! text into a live model without losing canvas identity, regenerates
//! SQL/Mongoose/JSON deterministically, and validates the result.
//!
//! Every operation is a pure function over an explicitly passed model; the
//! caller owns persistence and propagation of the returned value.

pub mod core;

pub use crate::core::{
    Cardinality, Column, CreateTableStatement, ExportFormat, ExportOptions, MergePolicy,
    ParseError, Relationship, RelationshipOps, SchemaGraph, SchemaSnapshot, Severity, SqlDialect,
    Table, TableOps, ValidationIssue, emit, emit_with_options, import_sql, parse_and_infer,
    reconcile, sync_sql, validate,
};
