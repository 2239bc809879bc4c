//! SQLite-backed [`RankStore`] that keeps an ordered list inside a host
//! table. The ranked rewrite is pushed down as a single windowed `UPDATE`,
//! so a whole scope settles in one statement.

use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use denserank_core::{
    ChangeSet, Error, FieldValue, NewRow, Orderable, Position, Predicate, RankOrder, RankStore,
    Result, RowId, SiblingFilter, Stamp, TieBreak,
};

/// Column mapping for a host table carrying an ordered list.
#[derive(Clone, Debug)]
pub struct TableSpec {
    pub table: String,
    pub id_column: String,
    pub position_column: String,
    pub stamp_column: String,
    /// Scope columns fetched alongside every row; filters may only
    /// reference columns declared here.
    pub scope_columns: Vec<String>,
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

    pub fn scope_column(mut self, name: impl Into<String>) -> Self {
        self.scope_columns.push(name.into());
        self
    }
}

/// Row as read back from the host table.
#[derive(Clone, Debug)]
pub struct SqliteRow {
    id: RowId,
    position: Option<Position>,
    stamp: Stamp,
    fields: Vec<(String, FieldValue)>,
}

impl Orderable for SqliteRow {
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

pub struct SqliteStore {
    conn: Connection,
    spec: TableSpec,
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn value_to_sql(value: &FieldValue) -> SqlValue {
    match value {
        FieldValue::Null => SqlValue::Null,
        FieldValue::Bool(b) => SqlValue::Integer(*b as i64),
        FieldValue::Int(i) => SqlValue::Integer(*i),
        FieldValue::Text(t) => SqlValue::Text(t.clone()),
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

impl SqliteStore {
    pub fn open_in_memory(spec: TableSpec) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Ok(Self { conn, spec })
    }

    pub fn open(path: impl AsRef<Path>, spec: TableSpec) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Ok(Self { conn, spec })
    }

    /// Wrap an existing connection; the host keeps control of pragmas and
    /// transactions.
    pub fn from_connection(conn: Connection, spec: TableSpec) -> Self {
        Self { conn, spec }
    }

    /// For callers that wrap mutation plus normalization in one
    /// transaction.
    pub fn connection(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create the host table if missing. Scope columns are declared without
    /// a type so SQLite stores integers and text verbatim; mostly a test
    /// and demo convenience, real hosts usually own their schema.
    pub fn ensure_table(&self) -> Result<()> {
        let spec = &self.spec;
        let scope_cols: String = spec
            .scope_columns
            .iter()
            .map(|c| format!(", \"{c}\""))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                \"{id}\" INTEGER PRIMARY KEY,
                \"{pos}\" INTEGER,
                \"{stamp}\" INTEGER NOT NULL{scope_cols}
            );
            CREATE INDEX IF NOT EXISTS \"idx_{table}_{pos}\" ON \"{table}\"(\"{pos}\");",
            table = spec.table,
            id = spec.id_column,
            pos = spec.position_column,
            stamp = spec.stamp_column,
        );
        self.conn.execute_batch(&sql).map_err(storage_err)
    }

    fn scope_column(&self, name: &str) -> Result<&str> {
        self.spec
            .scope_columns
            .iter()
            .find(|c| c.as_str() == name)
            .map(|c| c.as_str())
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
        cols.extend(spec.scope_columns.iter().map(|c| format!("\"{c}\"")));
        cols.join(", ")
    }

    fn read_row(&self, row: &Row<'_>) -> rusqlite::Result<SqliteRow> {
        let id: i64 = row.get(0)?;
        let position: Option<i64> = row.get(1)?;
        let stamp: i64 = row.get(2)?;
        let mut fields = Vec::with_capacity(self.spec.scope_columns.len());
        for (offset, name) in self.spec.scope_columns.iter().enumerate() {
            let value = match row.get::<_, SqlValue>(3 + offset)? {
                SqlValue::Null => FieldValue::Null,
                SqlValue::Integer(i) => FieldValue::Int(i),
                SqlValue::Text(t) => FieldValue::Text(t),
                SqlValue::Real(_) => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        3 + offset,
                        name.clone(),
                        rusqlite::types::Type::Real,
                    ))
                }
                SqlValue::Blob(_) => {
                    return Err(rusqlite::Error::InvalidColumnType(
                        3 + offset,
                        name.clone(),
                        rusqlite::types::Type::Blob,
                    ))
                }
            };
            fields.push((name.clone(), value));
        }
        Ok(SqliteRow {
            id: RowId(id),
            position,
            stamp: stamp.max(0) as Stamp,
            fields,
        })
    }

    fn filter_sql(&self, filter: &SiblingFilter) -> Result<(String, Vec<SqlValue>)> {
        let mut params = Vec::new();
        let sql = match filter {
            SiblingFilter::Equals(pairs) => {
                if pairs.is_empty() {
                    "1".to_owned()
                } else {
                    let mut clauses = Vec::with_capacity(pairs.len());
                    for (name, value) in pairs {
                        let col = self.scope_column(name)?;
                        if value.is_null() {
                            clauses.push(format!("\"{col}\" IS NULL"));
                        } else {
                            clauses.push(format!("\"{col}\" = ?"));
                            params.push(value_to_sql(value));
                        }
                    }
                    clauses.join(" AND ")
                }
            }
            SiblingFilter::Where(p) => self.predicate_sql(p, &mut params)?,
        };
        Ok((sql, params))
    }

    fn predicate_sql(&self, p: &Predicate, params: &mut Vec<SqlValue>) -> Result<String> {
        Ok(match p {
            Predicate::Eq(name, value) => {
                let col = self.scope_column(name)?;
                if value.is_null() {
                    format!("\"{col}\" IS NULL")
                } else {
                    params.push(value_to_sql(value));
                    format!("\"{col}\" = ?")
                }
            }
            Predicate::Ne(name, value) => {
                let col = self.scope_column(name)?;
                if value.is_null() {
                    format!("\"{col}\" IS NOT NULL")
                } else {
                    // Null-safe: a null field counts as "not equal".
                    params.push(value_to_sql(value));
                    format!("(\"{col}\" <> ? OR \"{col}\" IS NULL)")
                }
            }
            Predicate::IsNull(name) => {
                let col = self.scope_column(name)?;
                format!("\"{col}\" IS NULL")
            }
            Predicate::And(parts) => self.join_parts(parts, " AND ", "1", params)?,
            Predicate::Or(parts) => self.join_parts(parts, " OR ", "0", params)?,
        })
    }

    fn join_parts(
        &self,
        parts: &[Predicate],
        sep: &str,
        empty: &str,
        params: &mut Vec<SqlValue>,
    ) -> Result<String> {
        if parts.is_empty() {
            return Ok(empty.to_owned());
        }
        let mut rendered = Vec::with_capacity(parts.len());
        for part in parts {
            rendered.push(self.predicate_sql(part, params)?);
        }
        Ok(format!("({})", rendered.join(sep)))
    }

    fn position_aggregate(
        &self,
        func: &str,
        filter: &SiblingFilter,
    ) -> Result<Option<Position>> {
        let (where_sql, params) = self.filter_sql(filter)?;
        let sql = format!(
            "SELECT {func}(\"{pos}\") FROM \"{table}\" WHERE {where_sql}",
            pos = self.spec.position_column,
            table = self.spec.table,
        );
        self.conn
            .query_row(&sql, params_from_iter(params), |row| {
                row.get::<_, Option<i64>>(0)
            })
            .map_err(storage_err)
    }
}

impl RankStore for SqliteStore {
    type Row = SqliteRow;

    fn fetch(&self, filter: &SiblingFilter) -> Result<Vec<SqliteRow>> {
        let (where_sql, params) = self.filter_sql(filter)?;
        let sql = format!(
            "SELECT {cols} FROM \"{table}\" WHERE {where_sql}",
            cols = self.select_columns(),
            table = self.spec.table,
        );
        let mut stmt = self.conn.prepare(&sql).map_err(storage_err)?;
        let rows = stmt
            .query_map(params_from_iter(params), |row| self.read_row(row))
            .map_err(storage_err)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(storage_err)?);
        }
        Ok(out)
    }

    fn get(&self, id: RowId) -> Result<Option<SqliteRow>> {
        let sql = format!(
            "SELECT {cols} FROM \"{table}\" WHERE \"{id_col}\" = ?",
            cols = self.select_columns(),
            table = self.spec.table,
            id_col = self.spec.id_column,
        );
        self.conn
            .query_row(&sql, [id.0], |row| self.read_row(row))
            .optional()
            .map_err(storage_err)
    }

    fn min_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        self.position_aggregate("MIN", filter)
    }

    fn max_position(&self, filter: &SiblingFilter) -> Result<Option<Position>> {
        self.position_aggregate("MAX", filter)
    }

    fn rank_rewrite(&mut self, filter: &SiblingFilter, order: &RankOrder) -> Result<u64> {
        let (where_sql, mut filter_params) = self.filter_sql(filter)?;
        let direction = match order.tie_break {
            TieBreak::OldestFirst => "ASC",
            TieBreak::NewestFirst => "DESC",
        };
        let spec = &self.spec;
        let sql = format!(
            "UPDATE \"{table}\" SET \"{pos}\" = ranked.new_pos \
             FROM (SELECT \"{id}\" AS rid, \
                          ? + ROW_NUMBER() OVER (ORDER BY \"{pos}\" ASC, \"{stamp}\" {direction}, \"{id}\" ASC) - 1 AS new_pos \
                   FROM \"{table}\" \
                   WHERE ({where_sql}) AND \"{pos}\" IS NOT NULL) AS ranked \
             WHERE \"{table}\".\"{id}\" = ranked.rid AND \"{table}\".\"{pos}\" <> ranked.new_pos",
            table = spec.table,
            id = spec.id_column,
            pos = spec.position_column,
            stamp = spec.stamp_column,
        );
        // The origin binds first: it appears ahead of the filter parameters.
        let mut params = Vec::with_capacity(filter_params.len() + 1);
        params.push(SqlValue::Integer(order.origin));
        params.append(&mut filter_params);
        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(storage_err)?;
        tracing::debug!(table = %self.spec.table, changed, "ranked rewrite");
        Ok(changed as u64)
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
        let mut params: Vec<SqlValue> = vec![
            SqlValue::Integer(id.0),
            row.position.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
            SqlValue::Integer(stamp),
        ];
        for (name, value) in &row.fields {
            check_identifier(name)?;
            cols.push(format!("\"{name}\""));
            params.push(value_to_sql(value));
        }
        let placeholders = vec!["?"; cols.len()].join(", ");
        let sql = format!(
            "INSERT INTO \"{table}\" ({cols}) VALUES ({placeholders})",
            table = spec.table,
            cols = cols.join(", "),
        );
        self.conn
            .execute(&sql, params_from_iter(params))
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Error::DuplicateRow(id)
                }
                other => storage_err(other),
            })?;
        Ok(())
    }

    fn update_row(&mut self, id: RowId, changes: &ChangeSet, stamp: Stamp) -> Result<()> {
        let stamp: i64 = stamp
            .try_into()
            .map_err(|_| Error::Storage("stamp overflow".into()))?;
        let spec = &self.spec;
        let mut sets = vec![format!("\"{}\" = ?", spec.stamp_column)];
        let mut params: Vec<SqlValue> = vec![SqlValue::Integer(stamp)];
        if let Some(change) = changes.position() {
            sets.push(format!("\"{}\" = ?", spec.position_column));
            params.push(change.new.map(SqlValue::Integer).unwrap_or(SqlValue::Null));
        }
        for (name, change) in changes.fields() {
            check_identifier(name)?;
            sets.push(format!("\"{name}\" = ?"));
            params.push(value_to_sql(&change.new));
        }
        params.push(SqlValue::Integer(id.0));
        let sql = format!(
            "UPDATE \"{table}\" SET {sets} WHERE \"{id_col}\" = ?",
            table = spec.table,
            sets = sets.join(", "),
            id_col = spec.id_column,
        );
        let changed = self
            .conn
            .execute(&sql, params_from_iter(params))
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::RowNotFound(id));
        }
        Ok(())
    }

    fn delete_row(&mut self, id: RowId) -> Result<()> {
        let sql = format!(
            "DELETE FROM \"{table}\" WHERE \"{id_col}\" = ?",
            table = self.spec.table,
            id_col = self.spec.id_column,
        );
        let changed = self
            .conn
            .execute(&sql, [id.0])
            .map_err(storage_err)?;
        if changed == 0 {
            return Err(Error::RowNotFound(id));
        }
        Ok(())
    }
}
