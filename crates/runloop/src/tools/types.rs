//! Tool descriptors and argument schemas.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;

/// Decoded keyword arguments handed to a tool.
pub type Kwargs = Map<String, Value>;

/// Error type returned by tool functions.
pub type ToolFnError = Box<dyn std::error::Error + Send + Sync>;

/// A callable tool implementation.
///
/// This is the boundary between the run loop and side effects. Any error
/// returned here becomes the call's output text.
#[async_trait]
pub trait ToolFunction: Send + Sync {
    async fn call(&self, args: Kwargs) -> Result<Value, ToolFnError>;
}

/// Adapter that lets async functions and closures act as tools.
struct FnTool<F>(F);

#[async_trait]
impl<F, Fut> ToolFunction for FnTool<F>
where
    F: Fn(Kwargs) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolFnError>> + Send + 'static,
{
    async fn call(&self, args: Kwargs) -> Result<Value, ToolFnError> {
        (self.0)(args).await
    }
}

/// JSON type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// Accept any JSON value.
    Any,
}

impl ParamKind {
    /// Whether `value` has this kind.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        };
        f.write_str(name)
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    /// Value used when an optional parameter is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Param {
    /// A parameter the caller must supply.
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
            description: None,
        }
    }

    /// A parameter the caller may omit.
    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind)
        }
    }

    /// Set the value used when the parameter is omitted.
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Ordered set of parameters accepted by a tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    params: Vec<Param>,
}

impl ToolSchema {
    /// A schema with no parameters.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(params: impl IntoIterator<Item = Param>) -> Self {
        params.into_iter().fold(Self::empty(), Self::param)
    }

    /// Add a parameter. A parameter with the same name is replaced in place.
    pub fn param(mut self, param: Param) -> Self {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(existing) => *existing = param,
            None => self.params.push(param),
        }
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// A registered tool: name, schema, and the function that runs it.
#[derive(Clone)]
pub struct ToolDescriptor {
    name: String,
    schema: ToolSchema,
    function: Arc<dyn ToolFunction>,
}

impl ToolDescriptor {
    /// Describe a tool backed by an async function or closure.
    pub fn new<F, Fut>(name: impl Into<String>, schema: ToolSchema, function: F) -> Self
    where
        F: Fn(Kwargs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolFnError>> + Send + 'static,
    {
        Self::from_function(name, schema, FnTool(function))
    }

    /// Describe a tool backed by a [`ToolFunction`] implementation.
    pub fn from_function(
        name: impl Into<String>,
        schema: ToolSchema,
        function: impl ToolFunction + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    pub(crate) fn function(&self) -> &dyn ToolFunction {
        self.function.as_ref()
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn schema_keeps_declaration_order() {
        let schema = ToolSchema::empty()
            .param(Param::required("location", ParamKind::String))
            .param(Param::optional("unit", ParamKind::String).with_default(json!("celsius")));

        let names: Vec<_> = schema.params().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["location", "unit"]);
        assert!(schema.get("unit").is_some_and(|p| !p.required));
    }

    #[test]
    fn redeclared_param_replaces_in_place() {
        let schema = ToolSchema::new([
            Param::required("a", ParamKind::String),
            Param::required("b", ParamKind::String),
            Param::optional("a", ParamKind::Integer),
        ]);
        assert_eq!(schema.params().len(), 2);
        assert_eq!(schema.params()[0].kind, ParamKind::Integer);
    }

    #[test]
    fn kinds_match_json_types() {
        assert!(ParamKind::Integer.matches(&json!(3)));
        assert!(!ParamKind::Integer.matches(&json!(3.5)));
        assert!(ParamKind::Number.matches(&json!(3.5)));
        assert!(ParamKind::Any.matches(&Value::Null));
        assert!(!ParamKind::String.matches(&json!(1)));
    }
}
