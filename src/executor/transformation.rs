//! Transformation templates.
//!
//! A template is literal text with `{path}` expression tags, where `path` is a dotted
//! path into the event (`{data.user.name}`). A `{` that is not followed by an identifier
//! character is kept literally, so JSON documents can be written without escaping:
//!
//! ```text
//! {"text": "New order {data.id} from {data.customer}"}
//! ```
//!
//! Strings render raw, missing or null values render empty, and any other value renders
//! as compact JSON. Templates are compiled once, when the executor is built.

use crate::executor::filter::FieldPath;
use crate::types::Event;
use crate::{error::BridgeError, Result};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

/// Renders an event into an action payload
pub trait TransformationEvaluator: Send + Sync {
    fn render(&self, event: &Event) -> String;
}

/// Compiles a processor's template. `None` or an empty template yields an evaluator
/// that forwards the whole event.
pub trait TransformationEvaluatorFactory: Send + Sync {
    fn build(&self, template: Option<&str>) -> Result<Box<dyn TransformationEvaluator>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateEvaluatorFactory;

impl TransformationEvaluatorFactory for TemplateEvaluatorFactory {
    fn build(&self, template: Option<&str>) -> Result<Box<dyn TransformationEvaluator>> {
        match template {
            Some(source) if !source.is_empty() => Ok(Box::new(CompiledTemplate::compile(source)?)),
            _ => Ok(Box::new(PassThrough)),
        }
    }
}

struct PassThrough;

impl TransformationEvaluator for PassThrough {
    fn render(&self, event: &Event) -> String {
        event.to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expression(FieldPath),
}

/// Template split into literal and expression segments
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    segments: Vec<Segment>,
}

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_\-]*(\.[A-Za-z0-9_\-]+)*$")
            .expect("Failed to compile template expression pattern")
    })
}

fn starts_expression(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = source;

        while let Some(open) = rest.find('{') {
            let after = &rest[open + 1..];
            if !after.chars().next().map_or(false, starts_expression) {
                literal.push_str(&rest[..=open]);
                rest = after;
                continue;
            }

            let close = after.find('}').ok_or_else(|| {
                BridgeError::InvalidTemplate(format!(
                    "unterminated expression at offset {}",
                    source.len() - rest.len() + open
                ))
            })?;
            let expression = &after[..close];
            if !expression_pattern().is_match(expression) {
                return Err(BridgeError::InvalidTemplate(format!(
                    "invalid expression '{{{}}}'",
                    expression
                )));
            }

            literal.push_str(&rest[..open]);
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let path = FieldPath::parse(expression).map_err(BridgeError::InvalidTemplate)?;
            segments.push(Segment::Expression(path));
            rest = &after[close + 1..];
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self { segments })
    }

    pub fn expression_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Expression(_)))
            .count()
    }
}

impl TransformationEvaluator for CompiledTemplate {
    fn render(&self, event: &Event) -> String {
        let mut output = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Expression(path) => match path.extract(event) {
                    None | Some(JsonValue::Null) => {}
                    Some(JsonValue::String(s)) => output.push_str(s),
                    Some(other) => output.push_str(&other.to_string()),
                },
            }
        }
        output
    }
}
