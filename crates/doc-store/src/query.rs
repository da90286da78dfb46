use serde_json::Value;

/// Comparison applied to a single document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Field equals the JSON value exactly.
    Eq(Value),
    /// Field is a string starting with the prefix.
    StartsWith(String),
}

/// A filter on a (possibly nested) document field.
///
/// `path` uses dots to descend into objects, e.g. `storage.location`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub path: String,
    pub op: FilterOp,
}

impl FieldFilter {
    /// Returns the path split into its segments.
    pub fn segments(&self) -> Vec<&str> {
        self.path.split('.').collect()
    }

    /// Evaluates the filter against a serialized document.
    pub fn matches(&self, body: &Value) -> bool {
        let pointer = format!("/{}", self.path.replace('.', "/"));
        let Some(field) = body.pointer(&pointer) else {
            return false;
        };
        match &self.op {
            FilterOp::Eq(expected) => field == expected,
            FilterOp::StartsWith(prefix) => field
                .as_str()
                .is_some_and(|value| value.starts_with(prefix.as_str())),
        }
    }
}

/// Builder for document lookups.
///
/// Results are returned in insertion order; callers that need a domain
/// ordering (e.g. by purchase date) sort the typed documents themselves.
#[derive(Debug, Clone, Default)]
pub struct DocumentQuery {
    /// All filters must match.
    pub filters: Vec<FieldFilter>,

    /// Maximum number of documents to return.
    pub limit: Option<usize>,

    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl DocumentQuery {
    /// Creates a query matching every document in the collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `path` to equal `value`.
    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(FieldFilter {
            path: path.into(),
            op: FilterOp::Eq(value.into()),
        });
        self
    }

    /// Requires the string at `path` to start with `prefix`.
    pub fn starts_with(mut self, path: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.filters.push(FieldFilter {
            path: path.into(),
            op: FilterOp::StartsWith(prefix.into()),
        });
        self
    }

    /// Limits the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips the first `offset` results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the serialized document satisfies every filter.
    pub fn matches(&self, body: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn eq_filter_matches_nested_fields() {
        let body = json!({"material_id": "m-1", "storage": {"location": "drum"}});
        let query = DocumentQuery::new()
            .eq("material_id", "m-1")
            .eq("storage.location", "drum");
        assert!(query.matches(&body));

        let query = DocumentQuery::new().eq("storage.location", "rack");
        assert!(!query.matches(&body));
    }

    #[test]
    fn missing_field_never_matches() {
        let body = json!({"material_id": "m-1"});
        assert!(!DocumentQuery::new().eq("supplier_id", "s-1").matches(&body));
    }

    #[test]
    fn bool_filter() {
        let body = json!({"is_active": true});
        assert!(DocumentQuery::new().eq("is_active", true).matches(&body));
        assert!(!DocumentQuery::new().eq("is_active", false).matches(&body));
    }

    #[test]
    fn starts_with_filter() {
        let body = json!({"lot_number": "LOT-20240105-0003"});
        assert!(
            DocumentQuery::new()
                .starts_with("lot_number", "LOT-20240105-")
                .matches(&body)
        );
        assert!(
            !DocumentQuery::new()
                .starts_with("lot_number", "LOT-20240106-")
                .matches(&body)
        );
    }

    #[test]
    fn empty_query_matches_everything() {
        assert!(DocumentQuery::new().matches(&json!({})));
    }
}
