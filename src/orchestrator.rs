use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use crate::config;
use crate::context::RequestContext;
use crate::database::{
    CollectionAccessor, CollectionError, CollectionSchema, DocumentPatch, NewDocument, Page, VALID,
};
use crate::error::{ApiError, PersistenceError};

/// Record operations over one collection, driven by the request context's
/// parameter bag.
///
/// Inputs come from the conventional keys: `id`, `data`, `condition`,
/// `start` (alias `skip`), `limit`, `order`, `select`, `field`, `keyword`,
/// `search`. Every write whitelists incoming fields against the declared
/// schema and applies the audit stamps; every accessor failure is translated
/// to the operation's stable error code, with the driver cause kept to the
/// log.
pub struct RecordOrchestrator<'a> {
    context: &'a RequestContext,
    name: String,
    schema: CollectionSchema,
}

impl<'a> RecordOrchestrator<'a> {
    pub fn new(context: &'a RequestContext, name: impl Into<String>, schema: CollectionSchema) -> Self {
        Self { context, name: name.into(), schema }
    }

    /// Inserts one record from `data` (or the raw bag when `data` is
    /// absent). Undeclared fields are dropped silently.
    pub async fn add(&self) -> Result<Value, ApiError> {
        let data = self.schema.pick(&self.data_input());
        let doc = NewDocument::stamped(data, self.context.uid(), Utc::now());
        let accessor = self.open("add", PersistenceError::add)?;
        match accessor.add(doc).await {
            Ok(doc) => Ok(doc.to_value()),
            Err(cause) => Err(self.fail("add", cause, PersistenceError::add())),
        }
    }

    /// Soft-deletes one record by id.
    pub async fn remove(&self) -> Result<Value, ApiError> {
        let id = match self.id_param() {
            Some(id) => id,
            None => return Err(self.fail("remove", "missing or malformed id", PersistenceError::remove())),
        };
        let patch = DocumentPatch::stamped(Map::new(), self.context.uid(), Utc::now());
        let accessor = self.open("remove", PersistenceError::remove)?;
        match accessor.remove(id, patch).await {
            Ok(doc) => Ok(doc.to_value()),
            Err(cause) => Err(self.fail("remove", cause, PersistenceError::remove())),
        }
    }

    /// Soft-deletes every record matching `condition`.
    pub async fn remove_by(&self) -> Result<Value, ApiError> {
        let condition = self.condition();
        let patch = DocumentPatch::stamped(Map::new(), self.context.uid(), Utc::now());
        let accessor = self.open("removeBy", PersistenceError::remove)?;
        match accessor.remove_by(&condition, patch).await {
            Ok(count) => Ok(json!({ "removed": count })),
            Err(cause) => Err(self.fail("removeBy", cause, PersistenceError::remove())),
        }
    }

    /// Merges whitelisted fields into one record by id. Updating revives: a
    /// soft-deleted record comes back live.
    pub async fn update(&self) -> Result<Value, ApiError> {
        let id = match self.id_param() {
            Some(id) => id,
            None => return Err(self.fail("update", "missing or malformed id", PersistenceError::not_exist())),
        };
        let patch = self.update_patch();
        let accessor = self.open("update", PersistenceError::update)?;
        match accessor.update(id, patch).await {
            Ok(doc) => Ok(doc.to_value()),
            Err(CollectionError::NotFound) => {
                Err(self.fail("update", "no matching record", PersistenceError::not_exist()))
            }
            Err(cause) => Err(self.fail("update", cause, PersistenceError::update())),
        }
    }

    /// Merges whitelisted fields into every record matching `condition`.
    pub async fn update_by(&self) -> Result<Value, ApiError> {
        let condition = self.condition();
        let patch = self.update_patch();
        let accessor = self.open("updateBy", PersistenceError::update)?;
        match accessor.update_by(&condition, patch).await {
            Ok(count) => Ok(json!({ "updated": count })),
            Err(CollectionError::NotFound) => {
                Err(self.fail("updateBy", "no matching record", PersistenceError::not_exist()))
            }
            Err(cause) => Err(self.fail("updateBy", cause, PersistenceError::update())),
        }
    }

    /// Point lookup by id. No match is `null`, not an error.
    pub async fn get(&self) -> Result<Value, ApiError> {
        let id = match self.id_param() {
            Some(id) => id,
            None => return Err(self.fail("get", "missing or malformed id", PersistenceError::find())),
        };
        let accessor = self.open("get", PersistenceError::find)?;
        match accessor.get(id).await {
            Ok(Some(doc)) => Ok(doc.to_value()),
            Ok(None) => Ok(Value::Null),
            Err(cause) => Err(self.fail("get", cause, PersistenceError::find())),
        }
    }

    /// First record matching `condition`, honoring `order`.
    pub async fn get_one(&self) -> Result<Value, ApiError> {
        let condition = self.condition();
        let order = self.context.param("order").cloned();
        let accessor = self.open("getOne", PersistenceError::find)?;
        match accessor.get_one(&condition, order.as_ref()).await {
            Ok(Some(doc)) => Ok(doc.to_value()),
            Ok(None) => Ok(Value::Null),
            Err(cause) => Err(self.fail("getOne", cause, PersistenceError::find())),
        }
    }

    /// One page of matching records with the overall count:
    /// `{totalItems, items}`. Count and page are two reads; the window can
    /// shift between them.
    pub async fn get_list(&self) -> Result<Value, ApiError> {
        self.list_with(self.condition()).await
    }

    /// Keyword search: augments the condition with a case-insensitive
    /// `$or` across the `search` field list, then lists.
    pub async fn search(&self) -> Result<Value, ApiError> {
        self.list_with(self.search_condition()).await
    }

    /// Adds one to the counter field named by `select` on the first match,
    /// creating the record when none exists.
    pub async fn increment(&self) -> Result<Value, ApiError> {
        let field = match self.context.param_str("select").filter(|f| !f.is_empty()) {
            Some(field) => field,
            None => return Err(self.fail("increment", "missing counter field", PersistenceError::update())),
        };
        let condition = self.condition();
        let accessor = self.open("increment", PersistenceError::update)?;
        match accessor.increment(&condition, &field, 1, self.context.uid(), Utc::now()).await {
            Ok(doc) => Ok(doc.to_value()),
            Err(cause) => Err(self.fail("increment", cause, PersistenceError::update())),
        }
    }

    /// Distinct values of the data field named by `field` across matches.
    pub async fn distinct(&self) -> Result<Value, ApiError> {
        let field = match self.context.param_str("field").filter(|f| !f.is_empty()) {
            Some(field) => field,
            None => return Err(self.fail("distinct", "missing field name", PersistenceError::find())),
        };
        let condition = self.condition();
        let accessor = self.open("distinct", PersistenceError::find)?;
        match accessor.distinct(&field, &condition).await {
            Ok(values) => Ok(Value::Array(values)),
            Err(cause) => Err(self.fail("distinct", cause, PersistenceError::find())),
        }
    }

    /// Count of records matching `condition`.
    pub async fn total(&self) -> Result<Value, ApiError> {
        let condition = self.condition();
        let accessor = self.open("total", PersistenceError::find)?;
        match accessor.total(&condition).await {
            Ok(count) => Ok(json!(count)),
            Err(cause) => Err(self.fail("total", cause, PersistenceError::find())),
        }
    }

    /// Public field map of the declared schema.
    pub fn projection(&self) -> Value {
        self.schema.projection()
    }

    async fn list_with(&self, condition: Value) -> Result<Value, ApiError> {
        let accessor = self.open("getList", PersistenceError::find)?;
        let total = match accessor.total(&condition).await {
            Ok(total) => total,
            Err(cause) => return Err(self.fail("getList", cause, PersistenceError::find())),
        };
        let page = self.page();
        match accessor.get_list(&condition, &page).await {
            Ok(docs) => {
                let items: Vec<Value> = docs.iter().map(|doc| doc.to_value()).collect();
                Ok(json!({ "totalItems": total, "items": items }))
            }
            Err(cause) => Err(self.fail("getList", cause, PersistenceError::find())),
        }
    }

    fn open(
        &self,
        op: &str,
        public: fn() -> PersistenceError,
    ) -> Result<CollectionAccessor, ApiError> {
        CollectionAccessor::open(self.context.registry().clone(), self.context.code(), &self.name)
            .map_err(|cause| self.fail(op, cause, public()))
    }

    /// Translation boundary: the driver cause stays in the log, the caller
    /// sees only the operation's stable error.
    fn fail(&self, op: &str, cause: impl std::fmt::Display, public: PersistenceError) -> ApiError {
        warn!(
            target: "app",
            "{}#{} failed: {} (uid: {})",
            self.name,
            op,
            cause,
            self.context.uid().unwrap_or("-")
        );
        public.into()
    }

    /// Write payload: the `data` parameter when it is an object, the raw
    /// bag when `data` is absent, nothing when `data` is malformed.
    fn data_input(&self) -> Map<String, Value> {
        match self.context.param("data") {
            Some(Value::Object(map)) => map.clone(),
            Some(_) => Map::new(),
            None => self.context.params().clone(),
        }
    }

    fn update_patch(&self) -> DocumentPatch {
        let data = self.schema.pick(&self.data_input());
        DocumentPatch::stamped(data, self.context.uid(), Utc::now()).with_valid(VALID)
    }

    fn condition(&self) -> Value {
        self.context.param("condition").cloned().unwrap_or(Value::Null)
    }

    fn id_param(&self) -> Option<Uuid> {
        self.context
            .param_str("id")
            .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
    }

    fn page(&self) -> Page {
        let limits = &config::config().page;
        let start = self
            .context
            .param_i64("start")
            .or_else(|| self.context.param_i64("skip"))
            .unwrap_or(0)
            .max(0);
        let limit = self
            .context
            .param_i64("limit")
            .unwrap_or(limits.default_limit)
            .clamp(1, limits.max_limit);
        Page {
            start,
            limit,
            order: self.context.param("order").cloned(),
            select: self.context.param("select").cloned(),
        }
    }

    fn search_condition(&self) -> Value {
        let mut condition = self.condition();
        let keyword = self.context.param_str("keyword").filter(|k| !k.is_empty());
        let fields = self.context.param_str("search").filter(|f| !f.is_empty());
        if let (Some(keyword), Some(fields)) = (keyword, fields) {
            let pattern = keyword.to_lowercase();
            let clauses: Vec<Value> = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(|f| json!({ f: { "$regex": pattern } }))
                .collect();
            if !clauses.is_empty() {
                match &mut condition {
                    Value::Object(map) => {
                        map.insert("$or".to_string(), Value::Array(clauses));
                    }
                    _ => condition = json!({ "$or": clauses }),
                }
            }
        }
        condition
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{ConnectionRegistry, FieldKind};
    use crate::error::ErrorCode;
    use std::sync::Arc;

    fn schema() -> CollectionSchema {
        CollectionSchema::new()
            .field("name", FieldKind::String, "display name")
            .field("age", FieldKind::Number, "age in years")
    }

    fn context(pairs: &[(&str, Value)]) -> RequestContext {
        let registry = Arc::new(ConnectionRegistry::new(
            crate::config::AppConfig::development().database,
        ));
        let query: Map<String, Value> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        RequestContext::bind(registry, query, Map::new(), Map::new(), None)
    }

    fn orchestrator(ctx: &RequestContext) -> RecordOrchestrator<'_> {
        RecordOrchestrator::new(ctx, "user", schema())
    }

    #[test]
    fn test_data_param_beats_raw_bag() {
        let ctx = context(&[
            ("data", json!({"name": "from-data", "rogue": 1})),
            ("name", json!("from-bag")),
        ]);
        let orch = orchestrator(&ctx);
        let picked = orch.schema.pick(&orch.data_input());
        assert_eq!(picked.get("name"), Some(&json!("from-data")));
        assert!(picked.get("rogue").is_none());
    }

    #[test]
    fn test_raw_bag_is_whitelisted_when_data_absent() {
        let ctx = context(&[("name", json!("x")), ("id", json!("abc")), ("limit", json!(5))]);
        let orch = orchestrator(&ctx);
        let picked = orch.schema.pick(&orch.data_input());
        assert_eq!(picked.len(), 1);
        assert_eq!(picked.get("name"), Some(&json!("x")));
    }

    #[test]
    fn test_malformed_data_param_yields_nothing() {
        let ctx = context(&[("data", json!("not an object")), ("name", json!("x"))]);
        let orch = orchestrator(&ctx);
        assert!(orch.data_input().is_empty());
    }

    #[test]
    fn test_page_defaults_and_clamps() {
        let limits = &crate::config::config().page;

        let ctx = context(&[]);
        let page = orchestrator(&ctx).page();
        assert_eq!(page.start, 0);
        assert_eq!(page.limit, limits.default_limit);

        let ctx = context(&[("skip", json!("30")), ("limit", json!(999_999))]);
        let page = orchestrator(&ctx).page();
        assert_eq!(page.start, 30);
        assert_eq!(page.limit, limits.max_limit);

        let ctx = context(&[("start", json!(-5)), ("limit", json!(0))]);
        let page = orchestrator(&ctx).page();
        assert_eq!(page.start, 0);
        assert_eq!(page.limit, 1);
    }

    #[test]
    fn test_start_wins_over_skip_alias() {
        let ctx = context(&[("start", json!(10)), ("skip", json!(20))]);
        assert_eq!(orchestrator(&ctx).page().start, 10);
    }

    #[test]
    fn test_search_condition_builds_or_clauses() {
        let ctx = context(&[
            ("condition", json!({"valid": 1})),
            ("keyword", json!("Ada")),
            ("search", json!("name, bio,")),
        ]);
        let condition = orchestrator(&ctx).search_condition();
        assert_eq!(
            condition,
            json!({
                "valid": 1,
                "$or": [
                    {"name": {"$regex": "ada"}},
                    {"bio": {"$regex": "ada"}}
                ]
            })
        );
    }

    #[test]
    fn test_search_without_keyword_leaves_condition_alone() {
        let ctx = context(&[("condition", json!({"valid": 1})), ("search", json!("name"))]);
        assert_eq!(orchestrator(&ctx).search_condition(), json!({"valid": 1}));
    }

    #[test]
    fn test_search_with_no_condition_is_pure_or() {
        let ctx = context(&[("keyword", json!("x")), ("search", json!("name"))]);
        assert_eq!(
            orchestrator(&ctx).search_condition(),
            json!({"$or": [{"name": {"$regex": "x"}}]})
        );
    }

    #[test]
    fn test_id_param_accepts_uuid_only() {
        let ctx = context(&[("id", json!("2c1f9e6a-7f3a-4f0e-9b1a-0c9f6f1e2d3b"))]);
        assert!(orchestrator(&ctx).id_param().is_some());

        let ctx = context(&[("id", json!("42"))]);
        assert!(orchestrator(&ctx).id_param().is_none());

        let ctx = context(&[]);
        assert!(orchestrator(&ctx).id_param().is_none());
    }

    #[tokio::test]
    async fn test_get_with_malformed_id_is_find_failure() {
        let ctx = context(&[("id", json!("nope"))]);
        let err = orchestrator(&ctx).get().await.err().unwrap();
        assert_eq!(err.code(), ErrorCode::Domain("D0004"));
    }

    #[tokio::test]
    async fn test_update_without_id_is_not_exist() {
        let ctx = context(&[("data", json!({"name": "x"}))]);
        let err = orchestrator(&ctx).update().await.err().unwrap();
        assert_eq!(err.code(), ErrorCode::Domain("D1004"));
    }

    #[tokio::test]
    async fn test_remove_without_id_is_remove_failure() {
        let ctx = context(&[]);
        let err = orchestrator(&ctx).remove().await.err().unwrap();
        assert_eq!(err.code(), ErrorCode::Domain("D0002"));
    }

    #[tokio::test]
    async fn test_increment_without_field_is_update_failure() {
        let ctx = context(&[("condition", json!({"name": "visits"}))]);
        let err = orchestrator(&ctx).increment().await.err().unwrap();
        assert_eq!(err.code(), ErrorCode::Domain("D0003"));
    }

    #[test]
    fn test_update_patch_revives_and_stamps() {
        let ctx = context(&[("data", json!({"name": "x"}))]);
        let patch = orchestrator(&ctx).update_patch();
        assert_eq!(patch.valid, Some(VALID));
        assert!(patch.update_at.is_some());
        assert!(patch.update_by.is_none());
        assert_eq!(patch.data.get("name"), Some(&json!("x")));
    }
}
