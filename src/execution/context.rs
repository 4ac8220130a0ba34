//! Capability surface handed to a running script
//!
//! Scripts never reach into host objects. They see a frozen JS object built
//! from a fixed accessor table plus a few host helper functions.

use chrono::{DateTime, Utc};
use rquickjs::{Ctx, Function, Object};
use std::fmt;
use std::sync::Arc;

use crate::model::RecordId;

/// A record type scripts can be evaluated against
pub trait ScriptConsumer: Send + Sync + 'static {
    /// Consumer id: labels compiled units and partitions the module cache
    const TYPE_ID: &'static str;

    /// Wrapper template the snippet is spliced into
    const TEMPLATE: &'static str;

    fn record_id(&self) -> RecordId;

    /// Build the read-only surface for one evaluation of this record
    fn context(&self) -> EvaluationContext;
}

/// Value of a single accessor
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Timestamp(DateTime<Utc>),
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// Host-computed helper exposed to scripts as a zero-argument function
pub type HostFunction = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Immutable per-record accessor table
#[derive(Clone)]
pub struct EvaluationContext {
    record_id: RecordId,
    fields: Vec<(&'static str, FieldValue)>,
    helpers: Vec<(&'static str, HostFunction)>,
}

impl EvaluationContext {
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            fields: Vec::new(),
            helpers: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &'static str, value: impl Into<FieldValue>) -> Self {
        self.fields.push((name, value.into()));
        self
    }

    pub fn with_helper<F>(mut self, name: &'static str, helper: F) -> Self
    where
        F: Fn() -> f64 + Send + Sync + 'static,
    {
        self.helpers.push((name, Arc::new(helper)));
        self
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, value)| value)
    }

    pub fn helper(&self, name: &str) -> Option<&HostFunction> {
        self.helpers
            .iter()
            .find(|(helper, _)| *helper == name)
            .map(|(_, helper)| helper)
    }

    /// Materialize the context as a frozen JS object
    pub(crate) fn to_js<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Object<'js>> {
        let object = Object::new(ctx.clone())?;

        for (name, value) in &self.fields {
            match value {
                FieldValue::Text(text) => object.set(*name, text.as_str())?,
                FieldValue::Number(number) => object.set(*name, *number)?,
                // exact up to 2^53
                FieldValue::Integer(integer) => object.set(*name, *integer as f64)?,
                FieldValue::Timestamp(timestamp) => {
                    object.set(*name, timestamp.timestamp_millis() as f64)?
                }
            }
        }

        for (name, helper) in &self.helpers {
            let helper = Arc::clone(helper);
            object.set(*name, Function::new(ctx.clone(), move || helper())?)?;
        }

        let freeze: Function = ctx.globals().get::<_, Object>("Object")?.get("freeze")?;
        freeze.call::<_, Object>((object,))
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("record_id", &self.record_id)
            .field("fields", &self.fields)
            .field(
                "helpers",
                &self.helpers.iter().map(|(name, _)| *name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn context() -> EvaluationContext {
        EvaluationContext::new(11)
            .with_field("Symbol", "ABC")
            .with_field("OpenPrice", 12.5)
            .with_field("Volume", 300_i64)
            .with_helper("Answer", || 42.0)
    }

    #[test]
    fn test_lookup_fields_and_helpers() {
        let context = context();
        assert_eq!(context.field("Symbol"), Some(&FieldValue::Text("ABC".into())));
        assert_eq!(context.field("Missing"), None);
        assert_eq!(context.helper("Answer").map(|helper| helper()), Some(42.0));
    }

    #[test]
    fn test_js_object_is_frozen_and_callable() {
        let runtime = Runtime::new().unwrap();
        let js = Context::full(&runtime).unwrap();

        js.with(|ctx| {
            let object = context().to_js(&ctx).unwrap();
            ctx.globals().set("record", object).unwrap();

            let open: f64 = ctx.eval("record.OpenPrice").unwrap();
            assert_eq!(open, 12.5);

            let answer: f64 = ctx.eval("record.Answer()").unwrap();
            assert_eq!(answer, 42.0);

            let frozen: bool = ctx.eval("Object.isFrozen(record)").unwrap();
            assert!(frozen);
        });
    }

    #[test]
    fn test_debug_lists_helper_names() {
        let debug = format!("{:?}", context());
        assert!(debug.contains("Answer"));
        assert!(debug.contains("record_id: 11"));
    }
}
