//! Skip-logic navigation.
//!
//! A schema's jump rules form a forward-only graph over field positions. The
//! plan compiles every rule once into an integer target so evaluation never
//! looks ids up again, then walks the fields from the top for each answer
//! state. Because a jump only ever moves the cursor forward, the walk ends
//! after at most `fields.len()` steps without any cycle bookkeeping.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, trace};

use crate::Answers;
use crate::spec::{FormField, FormSchema};

/// When a compiled rule fires.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Always,
    Equals(String),
}

impl Condition {
    fn matches(&self, answer: &str) -> bool {
        match self {
            Condition::Always => true,
            Condition::Equals(expected) => expected == answer,
        }
    }
}

/// Where a matching rule sends the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpTarget {
    /// Continue at this field index.
    Forward(usize),
    /// The destination does not name any field.
    Unresolved,
    /// The destination is the field itself or an earlier one.
    Backward(usize),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    condition: Condition,
    target: JumpTarget,
}

/// Jump rules of a schema resolved against field positions.
#[derive(Debug, Clone)]
pub struct NavigationPlan<'a> {
    schema: &'a FormSchema,
    rules: Vec<Vec<CompiledRule>>,
}

impl<'a> NavigationPlan<'a> {
    pub fn compile(schema: &'a FormSchema) -> Self {
        let mut positions = HashMap::with_capacity(schema.fields.len());
        for (index, field) in schema.fields.iter().enumerate() {
            positions.entry(field.id.as_str()).or_insert(index);
        }

        let rules = schema
            .fields
            .iter()
            .enumerate()
            .map(|(index, field)| {
                field
                    .logic
                    .iter()
                    .map(|rule| {
                        let condition = if rule.is_wildcard() {
                            Condition::Always
                        } else {
                            Condition::Equals(rule.condition.clone())
                        };
                        let target = match positions.get(rule.destination.as_str()) {
                            Some(&target) if target > index => JumpTarget::Forward(target),
                            Some(&target) => JumpTarget::Backward(target),
                            None => JumpTarget::Unresolved,
                        };
                        CompiledRule { condition, target }
                    })
                    .collect()
            })
            .collect();

        debug!(form_id = %schema.id, fields = schema.fields.len(), "compiled navigation plan");
        Self { schema, rules }
    }

    pub fn schema(&self) -> &'a FormSchema {
        self.schema
    }

    /// Target of the first rule on `index` that matches `answer`, if any.
    ///
    /// Only the first structural match counts, even when its target is inert.
    pub fn matching_target(&self, index: usize, answer: &str) -> Option<JumpTarget> {
        self.rules
            .get(index)?
            .iter()
            .find(|rule| rule.condition.matches(answer))
            .map(|rule| rule.target)
    }

    /// Walks the fields for the given answers and returns the visible path.
    pub fn evaluate(&self, answers: &Answers) -> VisibleFields<'a> {
        let fields = &self.schema.fields;
        let mut indices = Vec::with_capacity(fields.len());
        let mut cursor = 0;

        while cursor < fields.len() {
            indices.push(cursor);
            let field = &fields[cursor];
            let mut next = cursor + 1;

            if !self.rules[cursor].is_empty()
                && let Some(answer) = answers.get(&field.id).and_then(answer_text)
                && let Some(target) = self.matching_target(cursor, &answer)
            {
                match target {
                    JumpTarget::Forward(target) => {
                        trace!(from = %field.id, to = %fields[target].id, "jump");
                        next = target;
                    }
                    JumpTarget::Unresolved | JumpTarget::Backward(_) => {
                        trace!(field = %field.id, "matching rule is inert");
                    }
                }
            }

            cursor = next;
        }

        VisibleFields {
            schema: self.schema,
            indices,
        }
    }
}

/// Convenience wrapper compiling the plan and evaluating it once.
pub fn visible_fields<'a>(schema: &'a FormSchema, answers: &Answers) -> VisibleFields<'a> {
    NavigationPlan::compile(schema).evaluate(answers)
}

/// Ordered subset of a schema's fields reachable under some answers.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleFields<'a> {
    schema: &'a FormSchema,
    indices: Vec<usize>,
}

impl<'a> VisibleFields<'a> {
    /// Positions of the visible fields, strictly increasing.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn fields(&self) -> impl Iterator<Item = &'a FormField> + '_ {
        let schema = self.schema;
        self.indices.iter().map(move |&index| &schema.fields[index])
    }

    pub fn ids(&self) -> Vec<&'a str> {
        self.fields().map(|field| field.id.as_str()).collect()
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.fields().any(|field| field.id == field_id)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// First visible field that has no answer yet.
    pub fn next_unanswered(&self, answers: &Answers) -> Option<&'a FormField> {
        self.fields()
            .find(|field| !answers.get(&field.id).is_some_and(has_value))
    }
}

/// Whether an answer has been recorded at all, including `false` and `0`.
pub fn has_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(text) => !text.is_empty(),
        _ => true,
    }
}

/// Whether a value counts as an answer for jump evaluation.
///
/// Mirrors loose truthiness: `null`, `false`, `0` and empty strings do not
/// trigger jumps. Lists always do, even when empty.
pub fn is_answered(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of an answer as compared against rule conditions.
///
/// Returns `None` for values that do not count as answered.
pub fn answer_text(value: &Value) -> Option<String> {
    if !is_answered(value) {
        return None;
    }
    Some(display_value(value))
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match number.as_f64() {
            Some(n) if number.is_f64() && n.fract() == 0.0 && n.abs() < 1e15 => {
                format!("{}", n as i64)
            }
            _ => number.to_string(),
        },
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => display_value(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Null => String::new(),
        Value::Object(_) => "[object Object]".to_string(),
    }
}
