//! Parameter binding: turning a matched request into endpoint arguments.
//!
//! Every endpoint declares its parameters up front as a list of
//! [`ParamSpec`] descriptors. [`bind`] walks that list in order against the
//! request [`Context`] and produces [`Args`], which the endpoint reads back
//! through typed accessors.
//!
//! | Descriptor           | Source                                   | Missing value        |
//! |----------------------|------------------------------------------|----------------------|
//! | `Path { name, kind }`  | router-bound path parameter            | `JoltError::Binding` |
//! | `Query { name, kind }` | query string                           | `null`               |
//! | `Body { field: None }` | whole JSON body                        | `null` (empty body)  |
//! | `Body { field: Some }` | one top-level field of the JSON body   | `null`               |
//! | `Form`                 | merged [`Form`]                        | empty form           |
//! | `Context`              | the request context itself             | never                |

use serde::de::DeserializeOwned;
use serde_json::{Number, Value};

use crate::context::Context;
use crate::error::{JoltError, JoltResult};

mod endpoint;
mod form;

pub use endpoint::{Endpoint, Reply, ReplyFuture};
pub use form::Form;

/// Target type of a path or query parameter conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    Double,
    /// `true` / `false`, case-insensitive.
    Boolean,
}

impl ScalarKind {
    /// Converts a raw request string into a JSON scalar of this kind.
    ///
    /// Returns the reason on failure; the caller attaches the parameter name.
    pub fn convert(self, raw: &str) -> Result<Value, String> {
        let raw_trimmed = raw.trim();
        match self {
            Self::String => Ok(Value::String(raw.to_owned())),
            Self::Int => raw_trimmed
                .parse::<i32>()
                .map(Value::from)
                .map_err(|_| format!("`{raw}` is not a 32-bit integer")),
            Self::Long => raw_trimmed
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("`{raw}` is not a 64-bit integer")),
            Self::Double => raw_trimmed
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("`{raw}` is not a finite number")),
            Self::Boolean => {
                if raw_trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Bool(true))
                } else if raw_trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Bool(false))
                } else {
                    Err(format!("`{raw}` is not a boolean"))
                }
            }
        }
    }
}

/// Declares where one endpoint parameter comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSpec {
    Path { name: String, kind: ScalarKind },
    Query { name: String, kind: ScalarKind },
    Body { field: Option<String> },
    Form,
    Context,
}

/// One bound argument.
#[derive(Debug, Clone)]
pub enum Arg {
    Value(Value),
    Form(Form),
    Context(Context),
}

/// Arguments bound for one invocation, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    args: Vec<Arg>,
}

impl Args {
    /// Wraps already-bound arguments.
    pub fn new(args: Vec<Arg>) -> Self {
        Self { args }
    }

    /// Number of bound arguments.
    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Deserializes the value argument at `index` into `T`.
    ///
    /// Missing optional values are `null`, so `Option<T>` reads them as `None`.
    ///
    /// # Errors
    ///
    /// [`JoltError::UnsupportedParameter`] if `index` is out of range or not a
    /// value argument, [`JoltError::Binding`] if the value does not fit `T`.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> JoltResult<T> {
        match self.args.get(index) {
            Some(Arg::Value(value)) => {
                T::deserialize(value).map_err(|e| JoltError::Binding {
                    name: format!("#{index}"),
                    reason: e.to_string(),
                })
            }
            _ => Err(JoltError::UnsupportedParameter { index }),
        }
    }

    /// The form argument at `index`.
    ///
    /// # Errors
    ///
    /// [`JoltError::UnsupportedParameter`] if that argument is not a form.
    pub fn form(&self, index: usize) -> JoltResult<&Form> {
        match self.args.get(index) {
            Some(Arg::Form(form)) => Ok(form),
            _ => Err(JoltError::UnsupportedParameter { index }),
        }
    }

    /// The request context bound at `index`.
    pub fn context(&self, index: usize) -> JoltResult<Context> {
        match self.args.get(index) {
            Some(Arg::Context(ctx)) => Ok(ctx.clone()),
            _ => Err(JoltError::UnsupportedParameter { index }),
        }
    }

    /// Iterates over the arguments in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter()
    }
}

/// Binds `specs` against `ctx`, in order.
///
/// The first failing parameter aborts binding.
pub fn bind(specs: &[ParamSpec], ctx: &Context) -> JoltResult<Args> {
    let mut args = Vec::with_capacity(specs.len());
    // Parsed lazily, at most once, when a body parameter is declared.
    let mut body: Option<Value> = None;

    for spec in specs {
        let arg = match spec {
            ParamSpec::Path { name, kind } => {
                let raw = ctx.path_param(name).ok_or_else(|| JoltError::Binding {
                    name: name.clone(),
                    reason: "missing path parameter".to_owned(),
                })?;
                Arg::Value(convert(name, *kind, raw)?)
            }
            ParamSpec::Query { name, kind } => match ctx.query_param(name) {
                Some(raw) => Arg::Value(convert(name, *kind, raw)?),
                None => Arg::Value(Value::Null),
            },
            ParamSpec::Body { field } => {
                if body.is_none() {
                    body = Some(ctx.request().json_value()?);
                }
                let whole = body.as_ref().unwrap_or(&Value::Null);
                let value = match field {
                    None => whole.clone(),
                    Some(field) => whole.get(field).cloned().unwrap_or(Value::Null),
                };
                Arg::Value(value)
            }
            ParamSpec::Form => Arg::Form(Form::from_context(ctx)?),
            ParamSpec::Context => Arg::Context(ctx.clone()),
        };
        args.push(arg);
    }

    Ok(Args::new(args))
}

fn convert(name: &str, kind: ScalarKind, raw: &str) -> JoltResult<Value> {
    kind.convert(raw).map_err(|reason| JoltError::Binding {
        name: name.to_owned(),
        reason,
    })
}
