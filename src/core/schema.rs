use petgraph::Directed;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Узел графа - таблица базы данных
///
/// Позиция и цвет принадлежат внешнему канвасу: движок сохраняет их при
/// слиянии, но никогда не интерпретирует.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Table {
    /// Стабильная идентичность таблицы, переживает любые правки
    pub uuid: Uuid,
    pub name: String,
    pub columns: Vec<Column>,
    /// Позиция на канвасе (x, y)
    pub position: (f64, f64),
    /// Цвет на канвасе
    pub color: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            columns: Vec::new(),
            position: (0.0, 0.0),
            color: None,
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = (x, y);
        self
    }

    pub fn add_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Find a column by name, case-insensitively.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_by_uuid(&self, uuid: Uuid) -> Option<&Column> {
        self.columns.iter().find(|c| c.uuid == uuid)
    }

    /// First primary-key column, if any.
    pub fn primary_key_column(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.is_primary_key)
    }
}

/// Колонка таблицы
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Column {
    /// Уникален в пределах своей таблицы
    pub uuid: Uuid,
    pub name: String,
    /// Канонический тип в нижнем регистре (`int`, `varchar`, `uuid`, ...),
    /// не привязан к написанию конкретного диалекта
    pub base_type: String,
    /// Длина или точность, например `255` или `10,2`
    pub length: Option<String>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub is_nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, base_type: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            base_type: base_type.into(),
            length: None,
            is_primary_key: false,
            is_foreign_key: false,
            is_nullable: true,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    pub fn with_length(mut self, length: impl Into<String>) -> Self {
        self.length = Some(length.into());
        self
    }

    /// Type with its length re-attached, e.g. `varchar(255)`.
    pub fn type_label(&self) -> String {
        match &self.length {
            Some(length) => format!("{}({})", self.base_type, length),
            None => self.base_type.clone(),
        }
    }
}

/// Ребро графа - связь между таблицами
///
/// Концы ребра - таблица-источник (ссылающаяся) и таблица-цель; пара колонок
/// заполнена только когда она известна.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Relationship {
    pub uuid: Uuid,
    /// Имя в стиле ограничения, например `fk_posts_user_id_users`
    pub name: String,
    /// Колонка в таблице-источнике
    pub source_column: Option<Uuid>,
    /// Колонка в таблице-цели
    pub target_column: Option<Uuid>,
    pub cardinality: Cardinality,
}

impl Relationship {
    pub fn new(name: impl Into<String>, cardinality: Cardinality) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            source_column: None,
            target_column: None,
            cardinality,
        }
    }

    pub fn with_columns(mut self, source: Uuid, target: Uuid) -> Self {
        self.source_column = Some(source);
        self.target_column = Some(target);
        self
    }
}

/// Тип связи между таблицами
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub enum Cardinality {
    /// Один к одному
    OneToOne,
    /// Один ко многим
    #[default]
    OneToMany,
    /// Многие ко многим
    ManyToMany,
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cardinality::OneToOne => write!(f, "1:1"),
            Cardinality::OneToMany => write!(f, "1:N"),
            Cardinality::ManyToMany => write!(f, "N:M"),
        }
    }
}

/// Тип графа: узлы - таблицы, ребра - связи
pub type SchemaGraph = StableGraph<Table, Relationship, Directed>;

/// Table-level CRUD over the schema graph.
pub trait TableOps {
    fn find_table_by_name(&self, name: &str) -> Option<NodeIndex>;
    fn table_exists(&self, name: &str) -> bool;
    fn create_table(&mut self, name: &str, position: (f64, f64)) -> Result<NodeIndex, String>;
    fn rename_table(&mut self, index: NodeIndex, name: &str) -> Result<(), String>;
    fn delete_table(&mut self, index: NodeIndex) -> Result<Table, String>;
}

impl TableOps for SchemaGraph {
    fn find_table_by_name(&self, name: &str) -> Option<NodeIndex> {
        self.node_indices().find(|&idx| {
            self.node_weight(idx)
                .is_some_and(|t| t.name.eq_ignore_ascii_case(name))
        })
    }

    fn table_exists(&self, name: &str) -> bool {
        self.find_table_by_name(name).is_some()
    }

    fn create_table(&mut self, name: &str, position: (f64, f64)) -> Result<NodeIndex, String> {
        if name.trim().is_empty() {
            return Err("Name cannot be empty".to_string());
        }
        if self.table_exists(name) {
            return Err(format!("Table '{}' already exists", name));
        }
        Ok(self.add_node(Table::new(name).with_position(position.0, position.1)))
    }

    fn rename_table(&mut self, index: NodeIndex, name: &str) -> Result<(), String> {
        if name.trim().is_empty() {
            return Err("Name cannot be empty".to_string());
        }
        if let Some(other) = self.find_table_by_name(name)
            && other != index
        {
            return Err(format!("Table '{}' already exists", name));
        }
        match self.node_weight_mut(index) {
            Some(table) => {
                table.name = name.to_string();
                Ok(())
            }
            None => Err("Table not found".to_string()),
        }
    }

    fn delete_table(&mut self, index: NodeIndex) -> Result<Table, String> {
        // Incident relationships go away together with the node.
        self.remove_node(index)
            .ok_or_else(|| "Table not found".to_string())
    }
}

/// Relationship-level operations over the schema graph.
pub trait RelationshipOps {
    fn has_relationship_between(&self, a: NodeIndex, b: NodeIndex) -> bool;
    fn create_relationship(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        relationship: Relationship,
    ) -> Result<EdgeIndex, String>;
}

impl RelationshipOps for SchemaGraph {
    fn has_relationship_between(&self, a: NodeIndex, b: NodeIndex) -> bool {
        // Unordered: a mirrored edge counts as connecting the same pair.
        self.edges_connecting(a, b).next().is_some() || self.edges_connecting(b, a).next().is_some()
    }

    fn create_relationship(
        &mut self,
        source: NodeIndex,
        target: NodeIndex,
        relationship: Relationship,
    ) -> Result<EdgeIndex, String> {
        if self.node_weight(source).is_none() || self.node_weight(target).is_none() {
            return Err("Table not found".to_string());
        }
        if self.has_relationship_between(source, target) {
            return Err("Relationship between these tables already exists".to_string());
        }
        Ok(self.add_edge(source, target, relationship))
    }
}
