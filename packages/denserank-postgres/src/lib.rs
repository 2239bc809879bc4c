//! PostgreSQL-backed [`RankStore`]. The ranked rewrite runs as one windowed
//! `UPDATE ... FROM`, so a whole scope settles in a single statement; the
//! surrounding read-rank-write sequence can be serialized by wrapping it in
//! a transaction on the shared client.

use std::cell::RefCell;
use std::rc::Rc;

use postgres::types::ToSql;
use postgres::{Client, Row};

use denserank_core::{
    ChangeSet, Error, FieldValue, NewRow, Orderable, Position, Predicate, RankOrder, RankStore,
    Result, RowId, SiblingFilter, Stamp, TieBreak,
};

fn storage_debug<E: std::fmt::Debug>(e: E) -> Error {
    Error::Storage(format!("{e:?}"))
}

/// Value type of one scope column. Postgres getters are strongly typed, so
/// the mapping has to be declared up front.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    BigInt,
    Text,
    Boolean,
}

impl ColumnKind {
    fn sql_type(self) -> &'static str {
        match self {
            ColumnKind::BigInt => "BIGINT",
            ColumnKind::Text => "TEXT",
            ColumnKind::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Clone, Debug)]
pub struct ScopeColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Column mapping for a host table carrying an ordered list.
#[derive(Clone, Debug)]
pub struct TableSpec {
    pub table: String,
    pub id_column: String,
    pub position_column: String,
    pub stamp_column: String,
    pub scope_columns: Vec<ScopeColumn>,
}

impl TableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id_column: "id".into(),
            position_column: "position".into(),
            stamp_column: "updated_at".into(),
            scope_columns: Vec::new(),
        }
    }

    pub fn id_column(mut self, name: impl Into<String>) -> Self {
        self.id_column = name.into();
        self
    }

    pub fn position_column(mut self, name: impl Into<String>) -> Self {
        self.position_column = name.into();
        self
    }

    pub fn stamp_column(mut self, name: impl Into<String>) -> Self {
        self.stamp_column = name.into();
        self
    }

    pub fn scope_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.scope_columns.push(ScopeColumn {
            name: name.into(),
            kind,
        });
        self
    }
}

/// Row as read back from the host table.
#[derive(Clone, Debug)]
pub struct PostgresRow {
    id: RowId,
    position: Option<Position>,
    stamp: Stamp,
    fields: Vec<(String, FieldValue)>,
}

impl Orderable for PostgresRow {
    fn row_id(&self) -> RowId {
        self.id
    }

    fn position(&self) -> Option<Position> {
        self.position
    }

    fn stamp(&self) -> Stamp {
        self.stamp
    }

    fn field(&self, name: &str) -> FieldValue {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(FieldValue::Null)
    }
}

/// Owned query parameter; postgres binds by reference.
enum Param {
    Int(i64),
    Text(String),
    Bool(bool),
    MaybeInt(Option<i64>),
}

impl Param {
    fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Param::Int(v) => v,
            Param::Text(v) => v,
            Param::Bool(v) => v,
            Param::MaybeInt(v) => v,
        }
    }
}

fn value_param(value: &FieldValue) -> Param {
    match value {
        // Null values are rendered as literals, never bound.
        FieldValue::Null => Param::MaybeInt(None),
        FieldValue::Bool(b) => Param::Bool(*b),
        FieldValue::Int(i) => Param::Int(*i),
        FieldValue::Text(t) => Param::Text(t.clone()),
    }
}

fn check_identifier(name: &str) -> Result<&str> {
    let mut chars = name.chars();
    let ok = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(name)
    } else {
        Err(Error::InvalidScope(format!("invalid column name: {name}")))
    }
}

pub struct PostgresStore {
    client: Rc<RefCell<Client>>,
    spec: TableSpec,
}

impl PostgresStore {
    pub fn new(client: Rc<RefCell<Client>>, spec: TableSpec) -> Self {
        Self { client, spec }
    }

    /// The shared client, for callers that wrap mutation plus normalization
    /// in one transaction.
    pub fn client(&self) -> Rc<RefCell<Client>> {
        self.client.clone()
    }

    /// Create the host table if missing; mostly a test and demo
    /// convenience, real hosts usually own their schema.
    pub fn ensure_table(&self) -> Result<()> {
        let spec = &self.spec;
        let scope_cols: String = spec
            .scope_columns
            .iter()
            .map(|c| format!(", \"{}\" {}", c.name, c.kind.sql_type()))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                \"{id}\" BIGINT PRIMARY KEY,
                \"{pos}\" BIGINT,
                \"{stamp}\" BIGINT NOT NULL{scope_cols}
            );
            CREATE INDEX IF NOT EXISTS \"idx_{table}_{pos}\" ON \"{table}\"(\"{pos}\");",
            table = spec.table,
            id = spec.id_column,
            pos = spec.position_column,
            stamp = spec.stamp_column,
        );
        self.client
            .borrow_mut()
            .batch_execute(&sql)
            .map_err(storage_debug)
    }

    fn scope_column(&self, name: &str) -> Result<&ScopeColumn> {
        self.spec
            .scope_columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                Error::InvalidScope(format!("column {name} is not declared in the table spec"))
            })
    }

    fn select_columns(&self) -> String {
        let spec = &self.spec;
        let mut cols = vec![
            format!("\"{}\"", spec.id_column),
            format!("\"{}\"", spec.position_column),
            format!("\"{}\"", spec.stamp_column),
        ];
        cols.extend(spec.scope_columns.iter().map(|c| format!("\"{}\"", c.name)));
        cols.join(", ")
    }

    fn read_row(&self, row: &Row) -> Result<PostgresRow> {
        let id: i64 = row.try_get(0).map_err(storage_debug)?;
        let position: Option<i64> = row.try_get(1).map_err(storage_debug)?;
        let stamp: i64 = row.try_get(2).map_err(storage_debug)?;
        let mut fields = Vec::with_capacity(self.spec.scope_columns.len());
        for (offset, col) in self.spec.scope_columns.iter().enumerate() {
            let idx = 3 + offset;
            let value = match col.kind {
                ColumnKind::BigInt => row
                    .try_get::<_, Option<i64>>(idx)
                    .map_err(storage_debug)?
                    .map(FieldValue::Int)
                    .unwrap_or(FieldValue::Null),
                ColumnKind::Text => row
                    .try_get::<_, Option<String>>(idx)
                    .map_err(storage_debug)?
                    .map(FieldValue::Text)
                    .unwrap_or(FieldValue::Null),
                ColumnKind::Boolean => row
                    .try_get::<_, Option<bool>>(idx)
                    .map_err(storage_debug)?
                    .map(FieldValue::Bool)
                    .unwrap_or(FieldValue::Null),
            };
            fields.push((col.name.clone(), value));
        }
        Ok(PostgresRow {
            id: RowId(id),
            position,
            stamp: stamp.max(0) as Stamp,
            fields,
        })
    }

    fn render_filter(&self, filter: &SiblingFilter, params: &mut Vec<Param>) -> Result<String> {
        match filter {
            SiblingFilter::Equals(pairs) => {
                if pairs.is_empty() {
                    return Ok("TRUE".to_owned());
                }
                let mut clauses = Vec::with_capacity(pairs.len());
                for (name, value) in pairs {
                    let col = self.scope_column(name)?;
                    if value.is_null() {
                        clauses.push(format!("\"{}\" IS NULL", col.name));
                    } else {
                        params.push(value_param(value));
                        clauses.push(format!("\"{}\" = ${}", col.name, params.len()));
                    }
                }
                Ok(clauses.join(" AND "))
            }
            SiblingFilter::Where(p) => self.render_predicate(p, params),
        }
    }

    fn render_predicate(&self, p: &Predicate, params: &mut Vec<Param>) -> Result<String> {
        Ok(match p {
            Predicate::Eq(name, value) => {
                let col = self.scope_column(name)?;
                if value.is_null() {
                    format!("\"{}\" IS NULL", col.name)
                } else {
                    params.push(value_param(value));
                    format!("\"{}\" = ${}", col.name, params.len())
                }
            }
            Predicate::Ne(name, value) => {
                let col = self.scope_column(name)?;
                if value.is_null() {
                    format!("\"{}\" IS NOT NULL", col.name)
                } else {
                    // Null-safe: a null field counts as "not equal".
                    params.push(value_param(value));
                    format!(
                        "(\"{name}\" <> ${idx} OR \"{name}\" IS NULL)",
                        name = col.name,
                        idx = params.len()
                    )
                }
            }
            Predicate::IsNull(name) => {
                format!("\"{}\" IS NULL", self.scope_column(name)?.name)
            }
            Predicate::And(parts) => self.render_parts(parts, " AND ", "TRUE", params)?,
            Predicate::Or(parts) => self.render_parts(parts, " OR ", "FALSE", params)?,
        })
    }

    fn render_parts(
        &self,
        parts: &[Predicate],
        sep: &str,
        empty: &str,
        params: &mut Vec<Param>,
    ) -> Result<String> {
        if parts.is_empty() {
            return Ok(empty.to_owned());
        }
        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            rendered.push(self.render_predicate(part, params)?);
        }
        Ok(format!("({})", rendered.join(sep)))
    }

    fn position_aggregate(&self, func: &str, filter: &SiblingFilter) -> Result<Option<Position>> {
        let mut params = Vec::new();
        let where_sql = self.render_filter(filter, &mut params)?;
        let sql = format!(
            "SELECT {func}(\"{pos}\") FROM \"{table}\" WHERE {where_sql}",
            pos = self.spec.position_column,
            table = self.spec.table,
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();
        let row = self
            .client
            .borrow_mut()
            .query_one(&sql, &refs)
            .map_err(storage_debug)?;
        row.try_get(0).map_err(storage_debug)
    }
}

impl RankStore for PostgresStore {
    type Row = PostgresRow;

    fn fetch(&self, filter: &SiblingFilter) -> Result<Vec<PostgresRow>> {
        let mut params = Vec::new();
        let where_sql = self.render_filter(filter, &mut params)?;
        let sql = format!(
            "SELECT {cols} FROM \"{table}\" WHERE {where_sql}",
            cols = self.select_columns(),
            table = self.spec.table,
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();
        let rows = self
            .client
            .borrow_mut()
            .query(&sql, &refs)
            .map_err(storage_debug)?;
        rows.iter().map(|row| self.read_row(row)).collect()
    }

    fn get(&self, id: RowId) -> Result<Option<PostgresRow>> {
        let sql = format!(
            "SELECT {cols} FROM \"{table}\" WHERE \"{id_col}\" = $1",
            cols = self.select_columns(),
            table = self.spec.table,
            id_col = self.spec.id_column,
        );
        let rows = self
            .client
            .borrow_mut()
            .query(&sql, &[&id.0])
            .map_err(storage_debug)?;
        rows.first().map(|row| self.read_row(row)).transpose()
    }

    fn min_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        self.position_aggregate("MIN", filter)
    }

    fn max_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        self.position_aggregate("MAX", filter)
    }

    fn rank_rewrite(&mut self, filter: &SiblingFilter, order: &RankOrder) -> Result<u64> {
        let mut params = vec![Param::Int(order.origin)];
        let where_sql = self.render_filter(filter, &mut params)?;
        let direction = match order.tie_break {
            TieBreak::OldestFirst => "ASC",
            TieBreak::NewestFirst => "DESC",
        };
        let spec = &self.spec;
        let sql = format!(
            "UPDATE \"{table}\" SET \"{pos}\" = ranked.new_pos \
             FROM (SELECT \"{id}\" AS rid, \
                          $1 + ROW_NUMBER() OVER (ORDER BY \"{pos}\" ASC, \"{stamp}\" {direction}, \"{id}\" ASC) - 1 AS new_pos \
                   FROM \"{table}\" \
                   WHERE ({where_sql}) AND \"{pos}\" IS NOT NULL) AS ranked \
             WHERE \"{table}\".\"{id}\" = ranked.rid AND \"{table}\".\"{pos}\" <> ranked.new_pos",
            table = spec.table,
            id = spec.id_column,
            pos = spec.position_column,
            stamp = spec.stamp_column,
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();
        let changed = self
            .client
            .borrow_mut()
            .execute(&sql, &refs)
            .map_err(storage_debug)?;
        tracing::debug!(table = %self.spec.table, changed, "ranked rewrite");
        Ok(changed)
    }

    fn insert_row(&mut self, row: NewRow, stamp: Stamp) -> Result<()> {
        let id = row.id;
        let stamp: i64 = stamp
            .try_into()
            .map_err(|_| Error::Storage("stamp overflow".into()))?;
        let spec = &self.spec;
        let mut cols = vec![
            format!("\"{}\"", spec.id_column),
            format!("\"{}\"", spec.position_column),
            format!("\"{}\"", spec.stamp_column),
        ];
        let mut params: Vec<Param> = vec![
            Param::Int(id.0),
            Param::MaybeInt(row.position),
            Param::Int(stamp),
        ];
        let mut values = vec!["$1".to_owned(), "$2".to_owned(), "$3".to_owned()];
        for (name, value) in &row.fields {
            check_identifier(name)?;
            cols.push(format!("\"{name}\""));
            if value.is_null() {
                values.push("NULL".to_owned());
            } else {
                params.push(value_param(value));
                values.push(format!("${}", params.len()));
            }
        }
        let sql = format!(
            "INSERT INTO \"{table}\" ({cols}) VALUES ({values})",
            table = spec.table,
            cols = cols.join(", "),
            values = values.join(", "),
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();
        self.client
            .borrow_mut()
            .execute(&sql, &refs)
            .map_err(|e| {
                if e.code() == Some(&postgres::error::SqlState::UNIQUE_VIOLATION) {
                    Error::DuplicateRow(id)
                } else {
                    storage_debug(e)
                }
            })?;
        Ok(())
    }

    fn update_row(&mut self, id: RowId, changes: &ChangeSet, stamp: Stamp) -> Result<()> {
        let stamp: i64 = stamp
            .try_into()
            .map_err(|_| Error::Storage("stamp overflow".into()))?;
        let spec = &self.spec;
        let mut params: Vec<Param> = vec![Param::Int(stamp)];
        let mut sets = vec![format!("\"{}\" = $1", spec.stamp_column)];
        if let Some(change) = changes.position() {
            params.push(Param::MaybeInt(change.new));
            sets.push(format!(
                "\"{}\" = ${}",
                spec.position_column,
                params.len()
            ));
        }
        for (name, change) in changes.fields() {
            check_identifier(name)?;
            if change.new.is_null() {
                sets.push(format!("\"{name}\" = NULL"));
            } else {
                params.push(value_param(&change.new));
                sets.push(format!("\"{name}\" = ${}", params.len()));
            }
        }
        params.push(Param::Int(id.0));
        let sql = format!(
            "UPDATE \"{table}\" SET {sets} WHERE \"{id_col}\" = ${idx}",
            table = spec.table,
            sets = sets.join(", "),
            id_col = spec.id_column,
            idx = params.len(),
        );
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_sql()).collect();
        let changed = self
            .client
            .borrow_mut()
            .execute(&sql, &refs)
            .map_err(storage_debug)?;
        if changed == 0 {
            return Err(Error::RowNotFound(id));
        }
        Ok(())
    }

    fn delete_row(&mut self, id: RowId) -> Result<()> {
        let sql = format!(
            "DELETE FROM \"{table}\" WHERE \"{id_col}\" = $1",
            table = self.spec.table,
            id_col = self.spec.id_column,
        );
        let changed = self
            .client
            .borrow_mut()
            .execute(&sql, &[&id.0])
            .map_err(storage_debug)?;
        if changed == 0 {
            return Err(Error::RowNotFound(id));
        }
        Ok(())
    }
}
