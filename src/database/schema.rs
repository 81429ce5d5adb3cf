use serde_json::{json, Map, Value};

/// Bookkeeping fields owned by the persistence layer. They can never be
/// declared as data fields and never pass the whitelist; the orchestrator
/// stamps them itself.
pub const RESERVED_FIELDS: &[&str] =
    &["id", "_id", "valid", "createAt", "createBy", "updateAt", "updateBy"];

pub fn is_reserved_field(name: &str) -> bool {
    RESERVED_FIELDS.contains(&name)
}

/// Declared type of a collection field. Documentation only; the whitelist
/// filters by name and values pass through as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
}

impl FieldKind {
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::String => "String",
            FieldKind::Number => "Number",
            FieldKind::Boolean => "Boolean",
            FieldKind::Date => "Date",
            FieldKind::Object => "Object",
            FieldKind::Array => "Array",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub kind: FieldKind,
    pub description: String,
}

/// Declared shape of one collection: an ordered list of data fields.
/// Drives the orchestrator's whitelist and the public introspection export.
#[derive(Debug, Clone, Default)]
pub struct CollectionSchema {
    fields: Vec<(String, FieldSpec)>,
}

impl CollectionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field. Reserved bookkeeping names are ignored with a
    /// warning; redeclaring a field replaces its spec in place.
    pub fn field(
        mut self,
        name: impl Into<String>,
        kind: FieldKind,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        if is_reserved_field(&name) {
            tracing::warn!(target: "app", "ignoring reserved field in schema: {}", name);
            return self;
        }

        let spec = FieldSpec { kind, description: description.into() };
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Declared field names in declaration order; this is the whitelist.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    /// Projects a parameter map onto the declared field set. Undeclared
    /// keys are silently dropped; this is the mass-assignment guard.
    pub fn pick(&self, source: &Map<String, Value>) -> Map<String, Value> {
        let mut picked = Map::new();
        for (name, _) in &self.fields {
            if let Some(value) = source.get(name) {
                picked.insert(name.clone(), value.clone());
            }
        }
        picked
    }

    /// Public introspection export: field name -> {type, description}.
    /// Bookkeeping fields never appear here.
    pub fn projection(&self) -> Value {
        let mut out = Map::new();
        for (name, spec) in &self.fields {
            out.insert(
                name.clone(),
                json!({
                    "type": spec.kind.name(),
                    "description": spec.description,
                }),
            );
        }
        Value::Object(out)
    }
}
