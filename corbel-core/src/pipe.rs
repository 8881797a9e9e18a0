// Pipes: per-parameter transformation and validation

use crate::params::{ArgValue, ParamDescriptor};
use crate::{Error, FieldError};
use serde_json::Value;

/// Transforms or validates a resolved argument before the handler sees it.
pub trait Pipe: Send + Sync {
    fn transform(
        &self,
        value: Option<ArgValue>,
        param: &ParamDescriptor,
    ) -> Result<Option<ArgValue>, Error>;
}

/// Converts a string argument into a JSON integer.
///
/// Absent values pass through; pair with [`DefaultValuePipe`] to require one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseIntPipe;

impl Pipe for ParseIntPipe {
    fn transform(
        &self,
        value: Option<ArgValue>,
        param: &ParamDescriptor,
    ) -> Result<Option<ArgValue>, Error> {
        let Some(value) = value else {
            return Ok(None);
        };
        let parsed = value
            .as_str()
            .and_then(|s| s.trim().parse::<i64>().ok())
            .ok_or_else(|| Error::Type(format!("{} must be an integer", param.label())))?;
        Ok(Some(ArgValue::Json(Value::from(parsed))))
    }
}

/// Converts `"true"`/`"false"` (also `1`/`0`) into a JSON boolean.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseBoolPipe;

impl Pipe for ParseBoolPipe {
    fn transform(
        &self,
        value: Option<ArgValue>,
        param: &ParamDescriptor,
    ) -> Result<Option<ArgValue>, Error> {
        let Some(value) = value else {
            return Ok(None);
        };
        let parsed = match value.as_str().map(str::trim) {
            Some("true") | Some("1") => true,
            Some("false") | Some("0") => false,
            _ => {
                return Err(Error::Type(format!("{} must be a boolean", param.label())));
            }
        };
        Ok(Some(ArgValue::Json(Value::Bool(parsed))))
    }
}

/// Fills in an absent argument.
#[derive(Debug, Clone)]
pub struct DefaultValuePipe {
    default: ArgValue,
}

impl DefaultValuePipe {
    pub fn new(default: ArgValue) -> Self {
        Self { default }
    }

    pub fn str(default: impl Into<String>) -> Self {
        Self::new(ArgValue::Str(default.into()))
    }
}

impl Pipe for DefaultValuePipe {
    fn transform(
        &self,
        value: Option<ArgValue>,
        _param: &ParamDescriptor,
    ) -> Result<Option<ArgValue>, Error> {
        Ok(value.or_else(|| Some(self.default.clone())))
    }
}

type Validator = dyn Fn(Option<&ArgValue>) -> Vec<FieldError> + Send + Sync;

/// Runs a validator; any field errors fail the request with a validation error.
pub struct ValidationPipe {
    validator: Box<Validator>,
}

impl ValidationPipe {
    pub fn new<F>(validator: F) -> Self
    where
        F: Fn(Option<&ArgValue>) -> Vec<FieldError> + Send + Sync + 'static,
    {
        Self {
            validator: Box::new(validator),
        }
    }

    /// Reject an absent argument.
    pub fn required() -> Self {
        Self::new(|value| match value {
            Some(_) => Vec::new(),
            None => vec![FieldError::new("value", "is required")],
        })
    }
}

impl Pipe for ValidationPipe {
    fn transform(
        &self,
        value: Option<ArgValue>,
        param: &ParamDescriptor,
    ) -> Result<Option<ArgValue>, Error> {
        let errors = (self.validator)(value.as_ref());
        if errors.is_empty() {
            return Ok(value);
        }
        // Validators that do not know the parameter name report it as "value"
        let errors = errors
            .into_iter()
            .map(|mut e| {
                if e.field == "value" {
                    e.field = param.label();
                }
                e
            })
            .collect();
        Err(Error::Validation(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int() {
        let param = ParamDescriptor::path(0, "id");
        let out = ParseIntPipe
            .transform(Some(ArgValue::Str("42".to_string())), &param)
            .unwrap();
        assert!(matches!(out, Some(ArgValue::Json(v)) if v == 42));

        let err = ParseIntPipe
            .transform(Some(ArgValue::Str("abc".to_string())), &param)
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(err.to_string().contains("id must be an integer"));

        assert!(ParseIntPipe.transform(None, &param).unwrap().is_none());
    }

    #[test]
    fn test_parse_bool() {
        let param = ParamDescriptor::query(0, "active");
        let out = ParseBoolPipe
            .transform(Some(ArgValue::Str("1".to_string())), &param)
            .unwrap();
        assert!(matches!(out, Some(ArgValue::Json(Value::Bool(true)))));
        assert!(ParseBoolPipe
            .transform(Some(ArgValue::Str("maybe".to_string())), &param)
            .is_err());
    }

    #[test]
    fn test_default_value_fills_none_only() {
        let param = ParamDescriptor::query(0, "page");
        let pipe = DefaultValuePipe::str("1");
        let out = pipe.transform(None, &param).unwrap();
        assert_eq!(out.as_ref().and_then(ArgValue::as_str), Some("1"));

        let out = pipe.transform(Some(ArgValue::Str("3".to_string())), &param).unwrap();
        assert_eq!(out.as_ref().and_then(ArgValue::as_str), Some("3"));
    }

    #[test]
    fn test_validation_pipe_names_field() {
        let param = ParamDescriptor::query(0, "email");
        let err = ValidationPipe::required().transform(None, &param).unwrap_err();
        let fields = err.field_errors().unwrap();
        assert_eq!(fields[0].field, "email");
        assert_eq!(err.public_message(false), "Validation failed");
    }
}
