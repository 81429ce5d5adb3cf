use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::PgArguments;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::{self, DatabaseConfig, PageConfig};
use crate::database::condition::{
    self, compile_order, compile_select, ConditionCompiler, ConditionError, SqlFragment,
};
use crate::database::document::{Document, DocumentPatch, NewDocument, INVALID};
use crate::database::registry::{ConnectionRegistry, RegistryError};
use crate::database::schema::is_reserved_field;

const COLUMNS: &str = "id, data, valid, create_at, create_by, update_at, update_by";

/// How many update-or-insert rounds `increment` attempts before giving up
/// under write contention.
const INCREMENT_ATTEMPTS: usize = 4;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("Invalid collection name: {0}")]
    InvalidName(String),

    #[error("No matching record")]
    NotFound,

    #[error(transparent)]
    Condition(#[from] ConditionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Listing window: offset, page size, and the optional order / projection
/// values taken straight from request parameters.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub start: i64,
    pub limit: i64,
    pub order: Option<Value>,
    pub select: Option<Value>,
}

/// One named collection inside one tenant database.
///
/// Cheap to construct per request: it borrows a pool from the registry on
/// each operation and runs the collection DDL once per (database, table)
/// pair for the life of the process. All data access goes through the
/// condition compiler, so user input never reaches SQL text.
pub struct CollectionAccessor {
    registry: Arc<ConnectionRegistry>,
    code: Option<String>,
    name: String,
    table: String,
}

impl CollectionAccessor {
    pub fn open(
        registry: Arc<ConnectionRegistry>,
        code: Option<&str>,
        name: &str,
    ) -> Result<Self, CollectionError> {
        let table = resolve_table(registry.config(), name)?;
        Ok(Self {
            registry,
            code: code.map(str::to_string),
            name: name.to_string(),
            table,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Pool for this accessor's tenant, with the collection table ensured.
    /// A failed DDL round gives up its memo slot so the next call retries.
    async fn pool(&self) -> Result<PgPool, CollectionError> {
        let pool = self.registry.get(self.code.as_deref()).await?;
        let database = self.registry.resolve_code(self.code.as_deref())?;
        if self.registry.first_use(&database, &self.table).await {
            if let Err(error) = sqlx::query(&create_table_sql(&self.table)).execute(&pool).await {
                self.registry.forget_use(&database, &self.table).await;
                return Err(error.into());
            }
            debug!(target: "app", "provisioned collection table: {}.{}", database, self.table);
        }
        Ok(pool)
    }

    pub async fn add(&self, doc: NewDocument) -> Result<Document, CollectionError> {
        let pool = self.pool().await?;
        let fragment = insert_fragment(&self.table, &doc);
        fetch_one(&pool, &fragment).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Document>, CollectionError> {
        let pool = self.pool().await?;
        let fragment = SqlFragment {
            sql: format!("SELECT {COLUMNS} FROM \"{}\" WHERE id = ($1)::uuid", self.table),
            binds: vec![Value::String(id.to_string())],
        };
        fetch_optional(&pool, &fragment).await
    }

    pub async fn get_one(
        &self,
        condition: &Value,
        order: Option<&Value>,
    ) -> Result<Option<Document>, CollectionError> {
        let pool = self.pool().await?;
        let fragment = select_fragment(&self.table, condition, order, Some((0, 1)))?;
        fetch_optional(&pool, &fragment).await
    }

    /// One page of matching documents. The projection is applied after the
    /// fetch: only the named top-level data fields survive.
    pub async fn get_list(
        &self,
        condition: &Value,
        page: &Page,
    ) -> Result<Vec<Document>, CollectionError> {
        let pool = self.pool().await?;
        let window = resolve_window(page, &config::config().page);
        let fragment =
            select_fragment(&self.table, condition, page.order.as_ref(), Some(window))?;
        let mut documents = fetch_all(&pool, &fragment).await?;

        if let Some(select) = &page.select {
            if !select.is_null() {
                let fields = compile_select(select)?;
                if !fields.is_empty() {
                    let keep: Vec<String> = fields
                        .iter()
                        .map(|f| f.split('.').next().unwrap_or(f.as_str()).to_string())
                        .collect();
                    for doc in &mut documents {
                        doc.retain_fields(&keep);
                    }
                }
            }
        }
        Ok(documents)
    }

    pub async fn total(&self, condition: &Value) -> Result<i64, CollectionError> {
        let pool = self.pool().await?;
        let predicate = ConditionCompiler::compile(condition, 1)?;
        let sql = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.table, predicate.sql);
        let mut query = sqlx::query(&sql);
        for bind in &predicate.binds {
            query = bind_value(query, bind);
        }
        let row = query.fetch_one(&pool).await?;
        Ok(row.try_get("count")?)
    }

    /// Merges the patch into one document by id. `NotFound` when no row
    /// matches.
    pub async fn update(&self, id: Uuid, patch: DocumentPatch) -> Result<Document, CollectionError> {
        let pool = self.pool().await?;
        let fragment = update_by_id_fragment(&self.table, &patch, id);
        fetch_optional(&pool, &fragment).await?.ok_or(CollectionError::NotFound)
    }

    /// Merges the patch into every matching document. `NotFound` when the
    /// condition matched nothing; otherwise how many rows changed.
    pub async fn update_by(
        &self,
        condition: &Value,
        patch: DocumentPatch,
    ) -> Result<u64, CollectionError> {
        match self.apply_by(condition, patch).await? {
            0 => Err(CollectionError::NotFound),
            count => Ok(count),
        }
    }

    /// Soft delete: same as update, with `valid` forced to 0.
    pub async fn remove(&self, id: Uuid, patch: DocumentPatch) -> Result<Document, CollectionError> {
        self.update(id, patch.with_valid(INVALID)).await
    }

    /// Soft-deletes every match; zero matches is still success.
    pub async fn remove_by(
        &self,
        condition: &Value,
        patch: DocumentPatch,
    ) -> Result<u64, CollectionError> {
        self.apply_by(condition, patch.with_valid(INVALID)).await
    }

    async fn apply_by(
        &self,
        condition: &Value,
        patch: DocumentPatch,
    ) -> Result<u64, CollectionError> {
        let pool = self.pool().await?;
        let fragment = update_by_condition_fragment(&self.table, &patch, condition)?;
        execute(&pool, &fragment).await
    }

    /// Distinct values of one data field across matching documents. Nulls
    /// and absent fields are excluded.
    pub async fn distinct(
        &self,
        field: &str,
        condition: &Value,
    ) -> Result<Vec<Value>, CollectionError> {
        if is_reserved_field(field) {
            return Err(ConditionError::InvalidField(field.to_string()).into());
        }
        let path = condition::path_literal(field)?;
        let pool = self.pool().await?;
        let predicate = ConditionCompiler::compile(condition, 1)?;
        let sql = format!(
            "SELECT DISTINCT data#>{path} AS value FROM \"{}\" WHERE ({}) \
             AND data#>{path} IS NOT NULL AND data#>{path} <> 'null'::jsonb",
            self.table, predicate.sql
        );
        let mut query = sqlx::query(&sql);
        for bind in &predicate.binds {
            query = bind_value(query, bind);
        }
        let rows = query.fetch_all(&pool).await?;
        let mut values = Vec::with_capacity(rows.len());
        for row in rows {
            values.push(row.try_get::<Value, _>("value")?);
        }
        Ok(values)
    }

    /// Adds `by` to a numeric data field on the first document matching the
    /// condition, creating the document when none exists. The new document
    /// is seeded from the condition's top-level equality pairs. Atomic per
    /// round; bounded retries cover the insert race.
    pub async fn increment(
        &self,
        condition: &Value,
        field: &str,
        by: i64,
        uid: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Document, CollectionError> {
        if is_reserved_field(field) {
            return Err(ConditionError::InvalidField(field.to_string()).into());
        }
        let path = condition::path_literal(field)?;
        let pool = self.pool().await?;

        for _ in 0..INCREMENT_ATTEMPTS {
            let fragment =
                increment_update_fragment(&self.table, condition, &path, by, uid, now)?;
            if let Some(doc) = fetch_optional(&pool, &fragment).await? {
                return Ok(doc);
            }

            let seed = NewDocument::stamped(increment_seed(condition, field, by), uid, now);
            let fragment = increment_insert_fragment(&self.table, condition, &seed)?;
            if let Some(doc) = fetch_optional(&pool, &fragment).await? {
                return Ok(doc);
            }
        }
        Err(CollectionError::NotFound)
    }
}

/// Effective (offset, limit) for a listing. A non-positive limit falls back
/// to the configured default; the configured maximum is the ceiling either
/// way. A listing is never unbounded.
fn resolve_window(page: &Page, limits: &PageConfig) -> (i64, i64) {
    let limit = if page.limit > 0 { page.limit } else { limits.default_limit };
    (page.start.max(0), limit.min(limits.max_limit).max(1))
}

/// Physical table behind a collection name: an explicit mapping wins,
/// otherwise the configured prefix is prepended.
fn resolve_table(config: &DatabaseConfig, name: &str) -> Result<String, CollectionError> {
    if name.is_empty() {
        return Err(CollectionError::InvalidName(name.to_string()));
    }
    let table = match config.collection_map.get(name) {
        Some(mapped) => mapped.clone(),
        None => format!("{}{}", config.collection_prefix, name),
    };
    if !is_valid_table_name(&table) {
        return Err(CollectionError::InvalidName(table));
    }
    Ok(table)
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS \"{table}\" (\
         id UUID PRIMARY KEY, \
         data JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
         valid INTEGER NOT NULL DEFAULT 1, \
         create_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
         create_by TEXT, \
         update_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
         update_by TEXT)"
    )
}

fn insert_fragment(table: &str, doc: &NewDocument) -> SqlFragment {
    let sql = format!(
        "INSERT INTO \"{table}\" (id, data, valid, create_at, create_by, update_at, update_by) \
         VALUES (($1)::uuid, $2, $3, ($4)::timestamptz, $5, ($6)::timestamptz, $7) \
         RETURNING {COLUMNS}"
    );
    SqlFragment { sql, binds: document_binds(doc) }
}

fn document_binds(doc: &NewDocument) -> Vec<Value> {
    vec![
        Value::String(doc.id.to_string()),
        Value::Object(doc.data.clone()),
        Value::Number(Number::from(doc.valid)),
        Value::String(doc.create_at.to_rfc3339()),
        by_value(&doc.create_by),
        Value::String(doc.update_at.to_rfc3339()),
        by_value(&doc.update_by),
    ]
}

fn by_value(by: &Option<String>) -> Value {
    match by {
        Some(name) => Value::String(name.clone()),
        None => Value::Null,
    }
}

/// SET clauses for a patch, in bind order: data merge first, then the
/// stamps that are present.
fn update_sets(patch: &DocumentPatch) -> (Vec<String>, Vec<Value>) {
    let mut sets = Vec::new();
    let mut binds = Vec::new();

    sets.push(format!("data = data || ${}", binds.len() + 1));
    binds.push(Value::Object(patch.data.clone()));

    if let Some(at) = patch.update_at {
        sets.push(format!("update_at = (${})::timestamptz", binds.len() + 1));
        binds.push(Value::String(at.to_rfc3339()));
    }
    if let Some(by) = &patch.update_by {
        sets.push(format!("update_by = ${}", binds.len() + 1));
        binds.push(Value::String(by.clone()));
    }
    if let Some(valid) = patch.valid {
        sets.push(format!("valid = ${}", binds.len() + 1));
        binds.push(Value::Number(Number::from(valid)));
    }
    (sets, binds)
}

fn update_by_id_fragment(table: &str, patch: &DocumentPatch, id: Uuid) -> SqlFragment {
    let (sets, mut binds) = update_sets(patch);
    let sql = format!(
        "UPDATE \"{table}\" SET {} WHERE id = (${})::uuid RETURNING {COLUMNS}",
        sets.join(", "),
        binds.len() + 1
    );
    binds.push(Value::String(id.to_string()));
    SqlFragment { sql, binds }
}

fn update_by_condition_fragment(
    table: &str,
    patch: &DocumentPatch,
    condition: &Value,
) -> Result<SqlFragment, ConditionError> {
    let (sets, mut binds) = update_sets(patch);
    let predicate = ConditionCompiler::compile(condition, binds.len() + 1)?;
    let sql = format!("UPDATE \"{table}\" SET {} WHERE {}", sets.join(", "), predicate.sql);
    binds.extend(predicate.binds);
    Ok(SqlFragment { sql, binds })
}

fn select_fragment(
    table: &str,
    condition: &Value,
    order: Option<&Value>,
    window: Option<(i64, i64)>,
) -> Result<SqlFragment, ConditionError> {
    let predicate = ConditionCompiler::compile(condition, 1)?;
    let mut sql = format!("SELECT {COLUMNS} FROM \"{table}\" WHERE {}", predicate.sql);
    let mut binds = predicate.binds;

    if let Some(order) = order {
        if !order.is_null() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&compile_order(order)?);
        }
    }
    if let Some((start, limit)) = window {
        sql.push_str(&format!(" OFFSET ${} LIMIT ${}", binds.len() + 1, binds.len() + 2));
        binds.push(Value::Number(Number::from(start)));
        binds.push(Value::Number(Number::from(limit)));
    }
    Ok(SqlFragment { sql, binds })
}

fn increment_update_fragment(
    table: &str,
    condition: &Value,
    path: &str,
    by: i64,
    uid: Option<&str>,
    now: DateTime<Utc>,
) -> Result<SqlFragment, ConditionError> {
    let mut binds = vec![
        Value::Number(Number::from(by)),
        Value::String(now.to_rfc3339()),
    ];
    let mut sets = format!(
        "data = jsonb_set(data, {path}, to_jsonb(COALESCE((data#>>{path})::numeric, 0) + $1), true), \
         update_at = ($2)::timestamptz"
    );
    if let Some(uid) = uid {
        sets.push_str(&format!(", update_by = ${}", binds.len() + 1));
        binds.push(Value::String(uid.to_string()));
    }
    let predicate = ConditionCompiler::compile(condition, binds.len() + 1)?;
    let sql = format!(
        "UPDATE \"{table}\" SET {sets} \
         WHERE id = (SELECT id FROM \"{table}\" WHERE {} LIMIT 1) RETURNING {COLUMNS}",
        predicate.sql
    );
    binds.extend(predicate.binds);
    Ok(SqlFragment { sql, binds })
}

fn increment_insert_fragment(
    table: &str,
    condition: &Value,
    seed: &NewDocument,
) -> Result<SqlFragment, ConditionError> {
    let mut binds = document_binds(seed);
    let predicate = ConditionCompiler::compile(condition, binds.len() + 1)?;
    let sql = format!(
        "INSERT INTO \"{table}\" (id, data, valid, create_at, create_by, update_at, update_by) \
         SELECT ($1)::uuid, $2, $3, ($4)::timestamptz, $5, ($6)::timestamptz, $7 \
         WHERE NOT EXISTS (SELECT 1 FROM \"{table}\" WHERE {}) RETURNING {COLUMNS}",
        predicate.sql
    );
    binds.extend(predicate.binds);
    Ok(SqlFragment { sql, binds })
}

/// Seed document for an increment that found nothing: the condition's
/// scalar top-level equality pairs plus the counter field itself.
fn increment_seed(condition: &Value, field: &str, by: i64) -> Map<String, Value> {
    let mut seed = Map::new();
    if let Value::Object(map) = condition {
        for (key, value) in map {
            if key.starts_with('$') || key.contains('.') || is_reserved_field(key) {
                continue;
            }
            match value {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    seed.insert(key.clone(), value.clone());
                }
                _ => {}
            }
        }
    }
    set_path(&mut seed, field, Value::Number(Number::from(by)));
    seed
}

/// Writes a value at a dotted path, creating intermediate objects.
fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments: Vec<&str> = path.split('.').collect();
    let last = match segments.pop() {
        Some(last) => last,
        None => return,
    };
    let mut current = map;
    for segment in segments {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        current = match entry.as_object_mut() {
            Some(next) => next,
            None => return,
        };
    }
    current.insert(last.to_string(), value);
}

async fn fetch_one(pool: &PgPool, fragment: &SqlFragment) -> Result<Document, CollectionError> {
    let mut query = sqlx::query_as::<_, Document>(&fragment.sql);
    for bind in &fragment.binds {
        query = bind_value_as(query, bind);
    }
    Ok(query.fetch_one(pool).await?)
}

async fn fetch_optional(
    pool: &PgPool,
    fragment: &SqlFragment,
) -> Result<Option<Document>, CollectionError> {
    let mut query = sqlx::query_as::<_, Document>(&fragment.sql);
    for bind in &fragment.binds {
        query = bind_value_as(query, bind);
    }
    Ok(query.fetch_optional(pool).await?)
}

async fn fetch_all(pool: &PgPool, fragment: &SqlFragment) -> Result<Vec<Document>, CollectionError> {
    let mut query = sqlx::query_as::<_, Document>(&fragment.sql);
    for bind in &fragment.binds {
        query = bind_value_as(query, bind);
    }
    Ok(query.fetch_all(pool).await?)
}

async fn execute(pool: &PgPool, fragment: &SqlFragment) -> Result<u64, CollectionError> {
    let mut query = sqlx::query(&fragment.sql);
    for bind in &fragment.binds {
        query = bind_value(query, bind);
    }
    Ok(query.execute(pool).await?.rows_affected())
}

type DocumentQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, Document, PgArguments>;

fn bind_value_as<'q>(query: DocumentQuery<'q>, value: &'q Value) -> DocumentQuery<'q> {
    match value {
        Value::Null => {
            let none: Option<String> = None;
            query.bind(none)
        }
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        // Arrays are expanded by the condition compiler; anything structured
        // that reaches a bind goes over as JSONB.
        Value::Array(_) | Value::Object(_) => query.bind(value.clone()),
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => {
            let none: Option<String> = None;
            query.bind(none)
        }
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s),
        Value::Array(_) | Value::Object(_) => query.bind(value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use serde_json::json;

    fn config_with_map() -> DatabaseConfig {
        let mut config = AppConfig::development().database;
        config.collection_prefix = "app_".to_string();
        config.collection_map.insert("user".to_string(), "members".to_string());
        config
    }

    #[test]
    fn test_table_resolution_prefers_mapping() {
        let config = config_with_map();
        assert_eq!(resolve_table(&config, "user").unwrap(), "members");
        assert_eq!(resolve_table(&config, "order").unwrap(), "app_order");
    }

    #[test]
    fn test_table_resolution_rejects_unsafe_names() {
        let config = config_with_map();
        assert!(resolve_table(&config, "").is_err());
        assert!(resolve_table(&config, "a;b").is_err());
        assert!(resolve_table(&config, "white space").is_err());
        assert!(matches!(
            resolve_table(&config, &"x".repeat(80)),
            Err(CollectionError::InvalidName(_))
        ));
    }

    #[test]
    fn test_table_names_must_start_alphabetic() {
        assert!(is_valid_table_name("app_user"));
        assert!(is_valid_table_name("_hidden"));
        assert!(!is_valid_table_name("1user"));
        assert!(!is_valid_table_name("user-profile"));
    }

    #[test]
    fn test_create_table_sql_is_idempotent_ddl() {
        let sql = create_table_sql("app_user");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"app_user\""));
        assert!(sql.contains("data JSONB NOT NULL DEFAULT '{}'::jsonb"));
        assert!(sql.contains("valid INTEGER NOT NULL DEFAULT 1"));
    }

    #[test]
    fn test_insert_fragment_binds_every_column() {
        let now = Utc::now();
        let mut data = Map::new();
        data.insert("name".to_string(), json!("x"));
        let doc = NewDocument::stamped(data, Some("u1"), now);

        let fragment = insert_fragment("app_user", &doc);
        assert!(fragment.sql.contains("INSERT INTO \"app_user\""));
        assert!(fragment.sql.contains("RETURNING id, data"));
        assert_eq!(fragment.binds.len(), 7);
        assert_eq!(fragment.binds[0], Value::String(doc.id.to_string()));
        assert_eq!(fragment.binds[2], json!(1));
        assert_eq!(fragment.binds[4], json!("u1"));
    }

    #[test]
    fn test_insert_fragment_null_identity() {
        let doc = NewDocument::stamped(Map::new(), None, Utc::now());
        let fragment = insert_fragment("app_user", &doc);
        assert_eq!(fragment.binds[4], Value::Null);
        assert_eq!(fragment.binds[6], Value::Null);
    }

    #[test]
    fn test_update_fragment_sets_follow_patch() {
        let now = Utc::now();
        let mut data = Map::new();
        data.insert("name".to_string(), json!("y"));
        let patch = DocumentPatch::stamped(data, Some("u1"), now).with_valid(1);
        let id = Uuid::new_v4();

        let fragment = update_by_id_fragment("app_user", &patch, id);
        assert_eq!(
            fragment.sql,
            "UPDATE \"app_user\" SET data = data || $1, update_at = ($2)::timestamptz, \
             update_by = $3, valid = $4 WHERE id = ($5)::uuid RETURNING id, data, valid, \
             create_at, create_by, update_at, update_by"
        );
        assert_eq!(fragment.binds.len(), 5);
        assert_eq!(fragment.binds[4], Value::String(id.to_string()));
    }

    #[test]
    fn test_update_fragment_skips_absent_identity() {
        let patch = DocumentPatch::stamped(Map::new(), None, Utc::now());
        let fragment = update_by_id_fragment("app_user", &patch, Uuid::new_v4());
        assert!(!fragment.sql.contains("update_by = "));
        assert!(!fragment.sql.contains("valid = "));
    }

    #[test]
    fn test_update_by_condition_numbers_after_sets() {
        let patch = DocumentPatch::stamped(Map::new(), None, Utc::now());
        let fragment =
            update_by_condition_fragment("app_user", &patch, &json!({"name": "x"})).unwrap();
        assert!(fragment.sql.ends_with("WHERE data#>>'{name}' = $3"));
        assert_eq!(fragment.binds.len(), 3);
        assert_eq!(fragment.binds[2], json!("x"));
    }

    #[test]
    fn test_select_fragment_window_numbering() {
        let fragment = select_fragment(
            "app_user",
            &json!({"age": {"$gte": 21}}),
            Some(&json!("-createAt")),
            Some((20, 10)),
        )
        .unwrap();
        assert!(fragment.sql.contains("WHERE (data#>>'{age}')::numeric >= $1"));
        assert!(fragment.sql.contains("ORDER BY \"create_at\" DESC"));
        assert!(fragment.sql.ends_with("OFFSET $2 LIMIT $3"));
        assert_eq!(fragment.binds, vec![json!(21), json!(20), json!(10)]);
    }

    #[test]
    fn test_select_fragment_without_condition() {
        let fragment = select_fragment("app_user", &Value::Null, None, None).unwrap();
        assert!(fragment.sql.ends_with("WHERE 1=1"));
        assert!(fragment.binds.is_empty());
    }

    #[test]
    fn test_resolve_window_never_unbounded() {
        let limits = PageConfig { default_limit: 20, max_limit: 100 };

        let page = Page { start: 40, limit: 25, ..Page::default() };
        assert_eq!(resolve_window(&page, &limits), (40, 25));

        // Unset and negative windows fall back to the defaults.
        assert_eq!(resolve_window(&Page::default(), &limits), (0, 20));
        let page = Page { start: -3, limit: -1, ..Page::default() };
        assert_eq!(resolve_window(&page, &limits), (0, 20));

        let page = Page { start: 0, limit: 9_999, ..Page::default() };
        assert_eq!(resolve_window(&page, &limits), (0, 100));
    }

    #[test]
    fn test_soft_delete_patch_forces_invalid() {
        let patch = DocumentPatch::stamped(Map::new(), Some("u1"), Utc::now()).with_valid(INVALID);
        let fragment =
            update_by_condition_fragment("app_user", &patch, &json!({"name": "x"})).unwrap();
        assert!(fragment.sql.contains("valid = $4"));
        assert_eq!(fragment.binds[3], json!(0));
        assert!(!fragment.sql.contains("DELETE"));
    }

    #[test]
    fn test_increment_update_fragment_layout() {
        let now = Utc::now();
        let fragment = increment_update_fragment(
            "app_counter",
            &json!({"name": "visits"}),
            "'{count}'",
            1,
            Some("u1"),
            now,
        )
        .unwrap();
        assert!(fragment.sql.contains("jsonb_set(data, '{count}'"));
        assert!(fragment.sql.contains("COALESCE((data#>>'{count}')::numeric, 0) + $1"));
        assert!(fragment.sql.contains("update_by = $3"));
        assert!(fragment.sql.contains("WHERE id = (SELECT id FROM \"app_counter\" WHERE data#>>'{name}' = $4 LIMIT 1)"));
        assert_eq!(fragment.binds.len(), 4);
    }

    #[test]
    fn test_increment_seed_takes_scalar_equality_pairs() {
        let condition = json!({
            "name": "visits",
            "region": {"$in": ["eu", "us"]},
            "$or": [{"a": 1}],
            "createAt": "2024-01-01",
            "nested.path": "x"
        });
        let seed = increment_seed(&condition, "count", 5);
        assert_eq!(seed.get("name"), Some(&json!("visits")));
        assert_eq!(seed.get("count"), Some(&json!(5)));
        assert!(seed.get("region").is_none());
        assert!(seed.get("$or").is_none());
        assert!(seed.get("createAt").is_none());
        assert!(seed.get("nested.path").is_none());
    }

    #[test]
    fn test_set_path_creates_nested_objects() {
        let mut map = Map::new();
        set_path(&mut map, "stats.daily.count", json!(1));
        assert_eq!(Value::Object(map), json!({"stats": {"daily": {"count": 1}}}));
    }

    #[test]
    fn test_accessor_resolves_table_on_open() {
        let registry = Arc::new(ConnectionRegistry::new(config_with_map()));
        let accessor = match CollectionAccessor::open(registry.clone(), Some("acme"), "user") {
            Ok(accessor) => accessor,
            Err(e) => panic!("open failed: {e}"),
        };
        assert_eq!(accessor.name(), "user");
        assert_eq!(accessor.table(), "members");

        let err = CollectionAccessor::open(registry, None, "no good").err();
        assert!(matches!(err, Some(CollectionError::InvalidName(_))));
    }
}
