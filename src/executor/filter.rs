use crate::types::{Event, Filter};
use crate::{error::BridgeError, Result};
use serde_json::Value as JsonValue;

/// A compiled predicate over one event field
pub trait FilterEvaluator: Send + Sync {
    /// Evaluate the predicate. A missing field or a field of the wrong type is `false`.
    fn evaluate(&self, event: &Event) -> bool;

    /// The filter this evaluator was compiled from
    fn filter(&self) -> &Filter;
}

/// Compiles filters into evaluators, rejecting malformed ones before an executor is admitted
pub trait FilterEvaluatorFactory: Send + Sync {
    fn build(&self, filter: &Filter) -> Result<Box<dyn FilterEvaluator>>;
}

/// Factory for the string predicates carried by [`Filter`]
#[derive(Debug, Default, Clone, Copy)]
pub struct StringFilterEvaluatorFactory;

impl FilterEvaluatorFactory for StringFilterEvaluatorFactory {
    fn build(&self, filter: &Filter) -> Result<Box<dyn FilterEvaluator>> {
        let path = FieldPath::parse(filter.key())
            .map_err(|e| {
                BridgeError::InvalidFilter(format!("{} filter: {}", filter.type_name(), e))
            })?;

        Ok(Box::new(StringFilterEvaluator {
            filter: filter.clone(),
            path,
        }))
    }
}

struct StringFilterEvaluator {
    filter: Filter,
    path: FieldPath,
}

impl FilterEvaluator for StringFilterEvaluator {
    fn evaluate(&self, event: &Event) -> bool {
        let field = match self.path.extract(event) {
            Some(JsonValue::String(s)) => s,
            _ => return false,
        };

        match &self.filter {
            Filter::BeginsWith { value, .. } => field.starts_with(value.as_str()),
            Filter::Contains { value, .. } => field.contains(value.as_str()),
            Filter::Equals { value, .. } => field == value,
        }
    }

    fn filter(&self) -> &Filter {
        &self.filter
    }
}

/// All filters of one processor, combined with AND logic
pub struct FilterSet {
    evaluators: Vec<Box<dyn FilterEvaluator>>,
}

impl FilterSet {
    pub fn compile(filters: &[Filter], factory: &dyn FilterEvaluatorFactory) -> Result<Self> {
        let evaluators = filters
            .iter()
            .map(|filter| factory.build(filter))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { evaluators })
    }

    /// Returns true if ALL filters match. An empty set matches every event.
    pub fn matches(&self, event: &Event) -> bool {
        self.evaluators.iter().all(|evaluator| evaluator.evaluate(event))
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

/// Pre-split dotted path into an event document (`data.user.id`, `$.items.0.sku`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(key: &str) -> std::result::Result<Self, String> {
        let path = key.strip_prefix("$.").unwrap_or(key);
        if path.is_empty() {
            return Err("field key cannot be empty".to_string());
        }

        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(format!("field key '{}' has an empty path segment", key));
        }

        Ok(Self { segments })
    }

    /// Walk the document; numeric segments index into arrays
    pub fn extract<'a>(&self, value: &'a JsonValue) -> Option<&'a JsonValue> {
        let mut current = value;

        for part in &self.segments {
            current = match current {
                JsonValue::Object(map) => map.get(part)?,
                JsonValue::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        Some(current)
    }
}
