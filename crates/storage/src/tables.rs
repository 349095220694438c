//! Column layout of the tables the site reads and writes.
//!
//! Queries are assembled from these schemas only, so table and column names
//! never come straight from a caller.

use backend::{BackendError, RowQuery, SortOrder};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use shared::domain::{CONTACT_TABLE, PROJECTS_TABLE, SUBSCRIBERS_TABLE};
use sqlx::{sqlite::SqliteRow, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ColumnKind {
    Text,
    /// A JSON array kept as text.
    List,
}

#[derive(Debug)]
pub(crate) struct TableSchema {
    pub(crate) name: &'static str,
    /// Every column except `id` and `created_at`, which all tables carry.
    pub(crate) columns: &'static [(&'static str, ColumnKind)],
}

const SCHEMAS: &[TableSchema] = &[
    TableSchema {
        name: PROJECTS_TABLE,
        columns: &[
            ("title", ColumnKind::Text),
            ("description", ColumnKind::Text),
            ("image_url", ColumnKind::Text),
            ("technologies", ColumnKind::List),
            ("github_url", ColumnKind::Text),
            ("live_url", ColumnKind::Text),
            ("category", ColumnKind::Text),
        ],
    },
    TableSchema {
        name: CONTACT_TABLE,
        columns: &[
            ("name", ColumnKind::Text),
            ("email", ColumnKind::Text),
            ("message", ColumnKind::Text),
        ],
    },
    TableSchema {
        name: SUBSCRIBERS_TABLE,
        columns: &[("email", ColumnKind::Text)],
    },
];

pub(crate) fn schema_for(table: &str) -> Result<&'static TableSchema, BackendError> {
    SCHEMAS
        .iter()
        .find(|schema| schema.name == table)
        .ok_or_else(|| BackendError::Rejected {
            status: 404,
            message: format!("relation \"public.{table}\" does not exist"),
        })
}

impl TableSchema {
    fn has_column(&self, column: &str) -> bool {
        column == "id"
            || column == "created_at"
            || self.columns.iter().any(|(name, _)| *name == column)
    }

    fn checked_column<'a>(&self, column: &'a str) -> Result<&'a str, BackendError> {
        if self.has_column(column) {
            Ok(column)
        } else {
            Err(BackendError::Rejected {
                status: 400,
                message: format!("column {}.{column} does not exist", self.name),
            })
        }
    }

    fn column_list(&self) -> String {
        let mut names = vec!["id"];
        names.extend(self.columns.iter().map(|(name, _)| *name));
        names.push("created_at");
        names.join(", ")
    }

    /// SQL text and bound values for a filtered, ordered select.
    pub(crate) fn select_sql(&self, query: &RowQuery) -> Result<(String, Vec<String>), BackendError> {
        let mut sql = format!("SELECT {} FROM {}", self.column_list(), self.name);
        let mut binds = Vec::with_capacity(query.filters.len());

        for (index, (column, value)) in query.filters.iter().enumerate() {
            let column = self.checked_column(column)?;
            sql.push_str(if index == 0 { " WHERE " } else { " AND " });
            sql.push_str(column);
            sql.push_str(" = ?");
            binds.push(value.clone());
        }

        if let Some((column, order)) = &query.order {
            let column = self.checked_column(column)?;
            let direction = match order {
                SortOrder::Ascending => "ASC",
                SortOrder::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY {column} {direction}, rowid {direction}"));
        }

        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        Ok((sql, binds))
    }

    pub(crate) fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len() + 2].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.name,
            self.column_list()
        )
    }

    /// Values to bind for an insert, in `column_list` order.
    pub(crate) fn insert_values(
        &self,
        row: &Value,
        id: String,
        created_at: String,
    ) -> Result<Vec<String>, BackendError> {
        let Some(fields) = row.as_object() else {
            return Err(BackendError::Decode(format!(
                "insert into {} expects a JSON object",
                self.name
            )));
        };

        if let Some(unknown) = fields.keys().find(|key| !self.has_column(key)) {
            return Err(BackendError::Rejected {
                status: 400,
                message: format!("column {}.{unknown} does not exist", self.name),
            });
        }

        let mut values = vec![id];
        for (column, kind) in self.columns {
            let value = match (kind, fields.get(*column)) {
                (ColumnKind::Text, Some(Value::String(text))) => text.clone(),
                (ColumnKind::List, Some(list @ Value::Array(_))) => list.to_string(),
                (ColumnKind::List, None | Some(Value::Null)) => "[]".to_string(),
                (ColumnKind::Text, None | Some(Value::Null)) => {
                    return Err(BackendError::Rejected {
                        status: 400,
                        message: format!(
                            "null value in column \"{column}\" of relation \"{}\" violates not-null constraint",
                            self.name
                        ),
                    })
                }
                (_, Some(other)) => {
                    return Err(BackendError::Rejected {
                        status: 400,
                        message: format!("invalid value for column \"{column}\": {other}"),
                    })
                }
            };
            values.push(value);
        }
        values.push(created_at);
        Ok(values)
    }

    pub(crate) fn decode_row(&self, row: &SqliteRow) -> Result<Value, sqlx::Error> {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(row.try_get("id")?));
        for (column, kind) in self.columns {
            let text: String = row.try_get(*column)?;
            let value = match kind {
                ColumnKind::Text => Value::String(text),
                ColumnKind::List => {
                    serde_json::from_str(&text).unwrap_or_else(|_| Value::Array(Vec::new()))
                }
            };
            object.insert((*column).to_string(), value);
        }
        object.insert(
            "created_at".to_string(),
            Value::String(row.try_get("created_at")?),
        );
        Ok(Value::Object(object))
    }
}

/// Fixed-width UTC timestamps, so text order matches time order.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}
