//! Raw argument payload → validated keyword arguments.

use serde_json::Value;

use super::{Kwargs, ToolError, ToolSchema};

/// Decode and validate a raw argument payload against a tool's schema.
///
/// An empty payload means no arguments were supplied. Anything else must be
/// a JSON object. Fields the schema does not declare are dropped; declared
/// optional fields that are absent (or `null`) take their default, if any.
pub fn decode_arguments(raw: &str, schema: &ToolSchema) -> Result<Kwargs, ToolError> {
    let mut supplied = parse_object(raw)?;
    let mut kwargs = Kwargs::new();
    let mut missing = Vec::new();

    for param in schema.params() {
        match supplied.remove(&param.name) {
            Some(value) if !value.is_null() => {
                if !param.kind.matches(&value) {
                    return Err(ToolError::ArgumentValidation(format!(
                        "field `{}` must be {}, got {}",
                        param.name,
                        param.kind,
                        json_type(&value)
                    )));
                }
                kwargs.insert(param.name.clone(), value);
            }
            _ if param.required => missing.push(param.name.as_str()),
            _ => {
                if let Some(default) = &param.default {
                    kwargs.insert(param.name.clone(), default.clone());
                }
            }
        }
    }

    if !missing.is_empty() {
        return Err(ToolError::ArgumentValidation(format!(
            "missing required field(s): {}",
            missing.join(", ")
        )));
    }

    if !supplied.is_empty() {
        let extra: Vec<_> = supplied.keys().map(String::as_str).collect();
        tracing::debug!(fields = ?extra, "dropping undeclared tool arguments");
    }

    Ok(kwargs)
}

fn parse_object(raw: &str) -> Result<Kwargs, ToolError> {
    if raw.trim().is_empty() {
        return Ok(Kwargs::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::ArgumentDecode {
            raw: raw.to_string(),
            reason: format!("expected a JSON object, got {}", json_type(&other)),
        }),
        Err(e) => Err(ToolError::ArgumentDecode {
            raw: raw.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Param, ParamKind};
    use serde_json::json;

    fn forecast_schema() -> ToolSchema {
        ToolSchema::new([
            Param::required("location", ParamKind::String),
            Param::required("dt_str", ParamKind::String),
            Param::optional("unit", ParamKind::String).with_default(json!("celsius")),
        ])
    }

    #[test]
    fn empty_payload_is_no_arguments() {
        assert!(decode_arguments("", &ToolSchema::empty()).unwrap().is_empty());
        assert!(decode_arguments("  \n", &ToolSchema::empty()).unwrap().is_empty());
    }

    #[test]
    fn empty_payload_still_checks_required_fields() {
        let err = decode_arguments("", &forecast_schema()).unwrap_err();
        assert!(matches!(err, ToolError::ArgumentValidation(msg) if msg.contains("location")));
    }

    #[test]
    fn malformed_payload_is_a_decode_error() {
        let err = decode_arguments("{\"location\": ", &forecast_schema()).unwrap_err();
        match err {
            ToolError::ArgumentDecode { raw, .. } => assert_eq!(raw, "{\"location\": "),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn non_object_payload_is_a_decode_error() {
        let err = decode_arguments("[1, 2]", &ToolSchema::empty()).unwrap_err();
        assert!(matches!(
            err,
            ToolError::ArgumentDecode { reason, .. } if reason.contains("array")
        ));
    }

    #[test]
    fn fills_defaults_and_drops_extras() {
        let kwargs = decode_arguments(
            r#"{"location": "Recife", "dt_str": "tomorrow", "verbose": true}"#,
            &forecast_schema(),
        )
        .unwrap();

        assert_eq!(kwargs["location"], "Recife");
        assert_eq!(kwargs["unit"], "celsius");
        assert!(!kwargs.contains_key("verbose"));
        let keys: Vec<_> = kwargs.keys().cloned().collect();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn null_optional_takes_default() {
        let kwargs = decode_arguments(
            r#"{"location": "Recife", "dt_str": "now", "unit": null}"#,
            &forecast_schema(),
        )
        .unwrap();
        assert_eq!(kwargs["unit"], "celsius");
    }

    #[test]
    fn wrong_type_is_a_validation_error() {
        let err = decode_arguments(r#"{"location": 7, "dt_str": "now"}"#, &forecast_schema())
            .unwrap_err();
        assert_eq!(
            err,
            ToolError::ArgumentValidation("field `location` must be string, got integer".into())
        );
    }

    #[test]
    fn reports_every_missing_field() {
        let err = decode_arguments("{}", &forecast_schema()).unwrap_err();
        assert_eq!(
            err,
            ToolError::ArgumentValidation("missing required field(s): location, dt_str".into())
        );
    }
}
