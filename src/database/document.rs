use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

/// `valid` flag values. Live records carry 1; soft-deleted records carry 0
/// and are never physically removed by generic paths.
pub const VALID: i32 = 1;
pub const INVALID: i32 = 0;

/// One document in a tenant collection: the declared data fields plus the
/// bookkeeping columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: Uuid,
    pub data: Map<String, Value>,
    pub valid: i32,
    pub create_at: DateTime<Utc>,
    pub create_by: Option<String>,
    pub update_at: DateTime<Utc>,
    pub update_by: Option<String>,
}

impl Document {
    pub fn is_live(&self) -> bool {
        self.valid == VALID
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Applies a projection: keeps only the named data fields. Bookkeeping
    /// fields always survive.
    pub fn retain_fields(&mut self, names: &[String]) {
        self.data.retain(|key, _| names.iter().any(|n| n == key));
    }

    /// Wire form: data fields inline beside the bookkeeping fields, audit
    /// names camelCase, `createBy`/`updateBy` omitted when absent.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("id".to_string(), json!(self.id));
        for (key, value) in &self.data {
            out.insert(key.clone(), value.clone());
        }
        out.insert("valid".to_string(), json!(self.valid));
        out.insert("createAt".to_string(), json!(self.create_at));
        if let Some(by) = &self.create_by {
            out.insert("createBy".to_string(), json!(by));
        }
        out.insert("updateAt".to_string(), json!(self.update_at));
        if let Some(by) = &self.update_by {
            out.insert("updateBy".to_string(), json!(by));
        }
        Value::Object(out)
    }
}

impl<'r> FromRow<'r, PgRow> for Document {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let data: Value = row.try_get("data")?;
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        Ok(Self {
            id: row.try_get("id")?,
            data,
            valid: row.try_get("valid")?,
            create_at: row.try_get("create_at")?,
            create_by: row.try_get("create_by")?,
            update_at: row.try_get("update_at")?,
            update_by: row.try_get("update_by")?,
        })
    }
}

/// A document about to be inserted.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub data: Map<String, Value>,
    pub valid: i32,
    pub create_at: DateTime<Utc>,
    pub create_by: Option<String>,
    pub update_at: DateTime<Utc>,
    pub update_by: Option<String>,
}

impl NewDocument {
    /// Creation stamping: `createAt = updateAt = now`, both `by` fields set
    /// to the identity when one is present, `valid` forced live.
    pub fn stamped(data: Map<String, Value>, uid: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            valid: VALID,
            create_at: now,
            create_by: uid.map(str::to_string),
            update_at: now,
            update_by: uid.map(str::to_string),
        }
    }
}

/// A partial update: data fields merged into the stored document, plus the
/// mutation stamps. `update_by` is left untouched when no identity is
/// present; `valid` is only written when explicitly set.
#[derive(Debug, Clone, Default)]
pub struct DocumentPatch {
    pub data: Map<String, Value>,
    pub valid: Option<i32>,
    pub update_at: Option<DateTime<Utc>>,
    pub update_by: Option<String>,
}

impl DocumentPatch {
    pub fn stamped(data: Map<String, Value>, uid: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            data,
            valid: None,
            update_at: Some(now),
            update_by: uid.map(str::to_string),
        }
    }

    pub fn with_valid(mut self, valid: i32) -> Self {
        self.valid = Some(valid);
        self
    }
}
