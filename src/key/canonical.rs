//! Canonical form of query options.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Number, Value};

use crate::query::{Field, Marker, Op, QueryValue};

/// Emitted in place of a node that points back at one of its ancestors.
pub const CIRCULAR: &str = "[Circular]";

/// Maps placeholder values to stable, hashable equivalents.
///
/// The defaults use [`Op::label`] and [`Marker::label`]; override either
/// to change how placeholders contribute to cache keys.
pub trait FlattenHook: Send + Sync {
    /// Label used for an operator, as a map key or as a value.
    fn op_label(&self, op: Op) -> String {
        op.label().to_string()
    }

    /// Canonical value for an opaque marker.
    fn flatten(&self, marker: &dyn Marker) -> Value {
        Value::String(marker.label())
    }
}

/// The default hook: every placeholder becomes its own label.
#[derive(Debug, Default, Clone, Copy)]
pub struct LabelHook;

impl FlattenHook for LabelHook {}

/// Rewrite `value` into plain JSON with sorted keys.
///
/// Operator keys are replaced by their labels, markers are flattened
/// through `hook`, collection handles become their name and cycles through
/// shared nodes become [`CIRCULAR`].
pub fn canonicalize(value: &QueryValue, hook: &dyn FlattenHook) -> Value {
    let mut ancestors = Vec::new();
    canonical(value, hook, &mut ancestors)
}

fn canonical(value: &QueryValue, hook: &dyn FlattenHook, ancestors: &mut Vec<*const RwLock<QueryValue>>) -> Value {
    match value {
        QueryValue::Null => Value::Null,
        QueryValue::Bool(b) => Value::Bool(*b),
        QueryValue::Int(i) => Value::from(*i),
        // NaN and infinities have no JSON form
        QueryValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        QueryValue::Str(s) => Value::String(s.clone()),
        QueryValue::List(items) => Value::Array(
            items
                .iter()
                .map(|item| canonical(item, hook, ancestors))
                .collect(),
        ),
        QueryValue::Map(entries) => {
            let mut sorted = BTreeMap::new();
            for (field, item) in entries {
                let key = match field {
                    Field::Name(name) => name.clone(),
                    Field::Op(op) => hook.op_label(*op),
                };
                sorted.insert(key, canonical(item, hook, ancestors));
            }
            Value::Object(sorted.into_iter().collect())
        }
        QueryValue::Op(op) => Value::String(hook.op_label(*op)),
        QueryValue::Marker(marker) => hook.flatten(marker.as_ref()),
        QueryValue::Model(model) => Value::String(model.name().to_string()),
        QueryValue::Shared(node) => {
            let ptr = Arc::as_ptr(node);
            if ancestors.contains(&ptr) {
                return Value::String(CIRCULAR.to_string());
            }
            ancestors.push(ptr);
            let out = canonical(&node.read(), hook, ancestors);
            ancestors.pop();
            out
        }
    }
}
