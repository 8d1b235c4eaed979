//! SQL statement parser
//!
//! Wraps sqlparser-rs behind a small closed intermediate representation so the
//! rest of the engine never touches the external AST. Only `CREATE TABLE`
//! statements are consumed; every other statement kind is ignored (callers on
//! the import path may choose to pre-reject mixed input).

use serde::{Deserialize, Serialize};
use sqlparser::ast::{ColumnOption, Statement, TableConstraint};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

/// SQL flavor used for parsing and relational emission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum SqlDialect {
    #[default]
    #[display("mysql")]
    MySql,
    #[display("postgresql")]
    Postgres,
}

impl SqlDialect {
    fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::MySql => Box::new(MySqlDialect {}),
            SqlDialect::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }
}

/// Failure while turning SQL text into the IR.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The underlying grammar rejected the input.
    #[error("syntax error: {0}")]
    Syntax(String),
}

/// IR record for one `CREATE TABLE` statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreateTableStatement {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
    /// Table-level `FOREIGN KEY (col) REFERENCES table(col)` constraints,
    /// consumed by relationship inference.
    pub foreign_keys: Vec<ForeignKeySpec>,
    /// Canvas position from a `-- Position: (x, y)` comment, when present.
    pub position: Option<(f64, f64)>,
}

/// One parsed column declaration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Canonical lowercase type token, length split off.
    pub base_type: String,
    pub length: Option<String>,
    pub is_primary_key: bool,
    pub is_nullable: bool,
}

/// One parsed foreign-key constraint, one record per column pair.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeySpec {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

/// Parses `sql` into `CREATE TABLE` IR records, in statement order.
pub fn parse_sql(sql: &str, dialect: SqlDialect) -> Result<Vec<CreateTableStatement>, ParseError> {
    let statements = Parser::parse_sql(dialect.dialect().as_ref(), sql)
        .map_err(|e| ParseError::Syntax(e.to_string()))?;

    let mut tables = Vec::new();
    for statement in &statements {
        let Statement::CreateTable(create_table) = statement else {
            continue;
        };

        let table_name = strip_quotes(&create_table.name.to_string());

        // Table-level PRIMARY KEY is the canonical SQL form; when present it
        // decides, overriding inline column options.
        let mut pk_columns: HashSet<String> = HashSet::new();
        for constraint in &create_table.constraints {
            if let TableConstraint::PrimaryKey(pk) = constraint {
                for col in &pk.columns {
                    pk_columns.insert(strip_quotes(&col.column.to_string()).to_lowercase());
                }
            }
        }
        let has_table_pk = !pk_columns.is_empty();

        let mut columns = Vec::new();
        for col_def in &create_table.columns {
            let col_name = strip_quotes(&col_def.name.value);

            let is_pk_inline = col_def
                .options
                .iter()
                .any(|opt| matches!(opt.option, ColumnOption::PrimaryKey(_)));
            let is_pk = if has_table_pk {
                pk_columns.contains(&col_name.to_lowercase())
            } else {
                is_pk_inline
            };

            let is_not_null = col_def
                .options
                .iter()
                .any(|opt| matches!(opt.option, ColumnOption::NotNull));

            let (base_type, length) = split_data_type(&col_def.data_type.to_string());

            columns.push(ColumnSpec {
                name: col_name,
                base_type,
                length,
                is_primary_key: is_pk,
                // PK columns are implicitly NOT NULL
                is_nullable: !is_not_null && !is_pk,
            });
        }

        let mut foreign_keys = Vec::new();
        for constraint in &create_table.constraints {
            if let TableConstraint::ForeignKey(fk) = constraint {
                let referenced_table = strip_quotes(&fk.foreign_table.to_string());
                for (from, to) in fk.columns.iter().zip(fk.referred_columns.iter()) {
                    foreign_keys.push(ForeignKeySpec {
                        column: strip_quotes(&from.value),
                        referenced_table: referenced_table.clone(),
                        referenced_column: strip_quotes(&to.value),
                    });
                }
            }
        }

        let position = position_from_comment(sql, &table_name);

        tables.push(CreateTableStatement {
            name: table_name,
            columns,
            foreign_keys,
            position,
        });
    }

    debug!(tables = tables.len(), %dialect, "parsed CREATE TABLE statements");
    Ok(tables)
}

/// Strips backticks and quotes from identifiers.
pub(crate) fn strip_quotes(name: &str) -> String {
    name.trim_matches('`')
        .trim_matches('"')
        .trim_matches('\'')
        .trim_matches('[')
        .trim_matches(']')
        .to_string()
}

/// Splits a raw SQL type into the canonical lowercase base token and the
/// parenthesized length/precision, e.g. `VARCHAR(255)` -> (`varchar`, `255`).
fn split_data_type(raw: &str) -> (String, Option<String>) {
    match raw.find('(') {
        Some(open) => {
            let base = raw[..open].trim().to_lowercase();
            let inner = raw[open + 1..].trim().trim_end_matches(')').trim();
            let length = (!inner.is_empty()).then(|| inner.to_string());
            (base, length)
        }
        None => (raw.trim().to_lowercase(), None),
    }
}

/// Reads a `-- Position: (x, y)` comment on the line directly above the
/// `CREATE TABLE` statement for `table_name`.
fn position_from_comment(sql: &str, table_name: &str) -> Option<(f64, f64)> {
    let lines: Vec<&str> = sql.lines().collect();
    let needle = table_name.to_lowercase();

    for (idx, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        let Some(at) = lower.find("create table") else {
            continue;
        };
        let rest = lower[at + "create table".len()..].trim_start();
        let line_table = strip_quotes(
            rest.split(|c: char| c.is_whitespace() || c == '(')
                .next()
                .unwrap_or(""),
        );
        if line_table != needle {
            continue;
        }

        let prev = idx.checked_sub(1).map(|i| lines[i].trim())?;
        let coords = prev.strip_prefix("-- Position:")?;
        let open = coords.find('(')?;
        let close = coords.find(')')?;
        let mut parts = coords.get(open + 1..close)?.split(',');
        let x = parts.next()?.trim().parse::<f64>().ok()?;
        let y = parts.next()?.trim().parse::<f64>().ok()?;
        return Some((x, y));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_create_table() {
        let sql = "CREATE TABLE users (id INT PRIMARY KEY, name VARCHAR(255) NOT NULL, bio TEXT);";
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();

        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.name, "users");
        assert_eq!(table.columns.len(), 3);

        let id = &table.columns[0];
        assert_eq!(id.base_type, "int");
        assert!(id.is_primary_key);
        assert!(!id.is_nullable);

        let name = &table.columns[1];
        assert_eq!(name.base_type, "varchar");
        assert_eq!(name.length.as_deref(), Some("255"));
        assert!(!name.is_primary_key);
        assert!(!name.is_nullable);

        let bio = &table.columns[2];
        assert_eq!(bio.base_type, "text");
        assert!(bio.is_nullable);
    }

    #[test]
    fn test_parse_table_level_primary_key() {
        let sql = r#"
            CREATE TABLE users (
                id INT NOT NULL,
                name VARCHAR(255),
                PRIMARY KEY (id)
            );
        "#;
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();
        let table = &tables[0];

        assert!(table.columns[0].is_primary_key);
        assert!(!table.columns[0].is_nullable);
        assert!(!table.columns[1].is_primary_key);
    }

    #[test]
    fn test_table_level_primary_key_wins_over_inline() {
        // Canonical SQL form takes precedence when the two disagree.
        let sql = r#"
            CREATE TABLE t (
                a INT PRIMARY KEY,
                b INT,
                PRIMARY KEY (b)
            );
        "#;
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();
        let table = &tables[0];

        assert!(!table.columns[0].is_primary_key);
        assert!(table.columns[1].is_primary_key);
    }

    #[test]
    fn test_parse_foreign_keys() {
        let sql = r#"
            CREATE TABLE posts (
                id INT PRIMARY KEY,
                user_id INT,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );
        "#;
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();
        let table = &tables[0];

        assert_eq!(table.foreign_keys.len(), 1);
        let fk = &table.foreign_keys[0];
        assert_eq!(fk.column, "user_id");
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_column, "id");
    }

    #[test]
    fn test_parse_strips_quoting() {
        let sql = "CREATE TABLE `users` (`id` INT PRIMARY KEY);";
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();

        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[0].columns[0].name, "id");
    }

    #[test]
    fn test_parse_ignores_other_statements() {
        let sql = r#"
            CREATE TABLE users (id INT PRIMARY KEY);
            INSERT INTO users VALUES (1);
            DROP TABLE users;
        "#;
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();
        assert_eq!(tables.len(), 1);
    }

    #[test]
    fn test_parse_syntax_error() {
        let sql = "CREATE TABEL users (id INT);";
        let result = parse_sql(sql, SqlDialect::MySql);
        assert!(matches!(result, Err(ParseError::Syntax(_))));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(parse_sql("", SqlDialect::MySql).unwrap().is_empty());
    }

    #[test]
    fn test_position_comment() {
        let sql = r#"-- Position: (500.5, 300.25)
CREATE TABLE users (
    id INT PRIMARY KEY
);

CREATE TABLE posts (
    id INT PRIMARY KEY
);
"#;
        let tables = parse_sql(sql, SqlDialect::MySql).unwrap();
        assert_eq!(tables[0].position, Some((500.5, 300.25)));
        assert_eq!(tables[1].position, None);
    }

    #[test]
    fn test_split_data_type() {
        assert_eq!(split_data_type("INT"), ("int".to_string(), None));
        assert_eq!(
            split_data_type("VARCHAR(255)"),
            ("varchar".to_string(), Some("255".to_string()))
        );
        assert_eq!(
            split_data_type("DECIMAL(10,2)"),
            ("decimal".to_string(), Some("10,2".to_string()))
        );
    }

    #[test]
    fn test_postgres_dialect() {
        let sql = r#"CREATE TABLE "users" ("id" INTEGER PRIMARY KEY, "payload" JSONB);"#;
        let tables = parse_sql(sql, SqlDialect::Postgres).unwrap();

        assert_eq!(tables[0].name, "users");
        assert_eq!(tables[0].columns[1].base_type, "jsonb");
    }
}
