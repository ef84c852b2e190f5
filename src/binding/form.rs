//! Merged request data bound to `ParamSpec::Form` parameters.

use std::collections::HashMap;
use std::str::FromStr;

use serde_json::Value;

use crate::context::Context;
use crate::error::{JoltError, JoltResult};

/// Flat string map built from every request data source.
///
/// Sources are merged in this order, later ones overriding earlier ones on
/// key collisions: query string and urlencoded body, JSON body fields, path
/// parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: HashMap<String, String>,
}

impl Form {
    /// An empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the merged form for a request.
    pub fn from_context(ctx: &Context) -> JoltResult<Self> {
        let request = ctx.request();
        let mut form = Self::new();

        form.extend(request.query_params().iter().map(|(k, v)| (k.clone(), v.clone())));
        form.extend(request.form_params());

        if request.is_json() {
            if let Value::Object(map) = request.json_value()? {
                form.extend(map.into_iter().map(|(k, v)| (k, scalar_text(v))));
            }
        }

        form.extend(ctx.params().iter().map(|(k, v)| (k.to_owned(), v.to_owned())));
        Ok(form)
    }

    /// Sets a field, replacing any earlier value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw text of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// A required field, parsed into `T`.
    pub fn require<T: FromStr>(&self, key: &str) -> JoltResult<T> {
        let raw = self.get(key).ok_or_else(|| JoltError::Binding {
            name: key.to_owned(),
            reason: "missing form field".to_owned(),
        })?;
        raw.parse().map_err(|_| JoltError::Binding {
            name: key.to_owned(),
            reason: format!("cannot parse `{raw}`"),
        })
    }

    /// `true` if the field was submitted.
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Number of distinct fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates over `(name, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Consumes the form, returning the underlying map.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.fields
    }
}

impl Extend<(String, String)> for Form {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.fields.extend(iter);
    }
}

// Strings stay unquoted; everything else keeps its JSON text.
fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
