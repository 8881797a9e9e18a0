//! Handler parameter resolution
//!
//! Each handler declares, per positional argument, where its value comes
//! from. At dispatch time [`resolve_params`] turns those declarations into a
//! sparse positional list: index `i` holds the value for argument `i`, and
//! indices nobody declared stay `None`.

use crate::logging::trace;
use crate::pipe::Pipe;
use crate::{Error, HttpRequest, ResponseHandle};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

/// Where a handler argument is read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    Path,
    Query,
    Body,
    Header,
    RawRequest,
    RawResponse,
}

/// Argument indices must be below this bound; registration rejects larger ones.
pub const MAX_PARAM_INDEX: usize = 64;

/// Declaration of one handler argument.
#[derive(Clone)]
pub struct ParamDescriptor {
    pub index: usize,
    pub source: ParamSource,
    /// Single entry to read; `None` selects the whole map. Ignored for body and raw sources.
    pub key: Option<String>,
    pub pipes: Vec<Arc<dyn Pipe>>,
}

impl ParamDescriptor {
    pub fn new(index: usize, source: ParamSource, key: Option<&str>) -> Self {
        let key = key.map(|k| match source {
            ParamSource::Header => k.to_ascii_lowercase(),
            _ => k.to_string(),
        });
        Self {
            index,
            source,
            key,
            pipes: Vec::new(),
        }
    }

    pub fn path(index: usize, key: &str) -> Self {
        Self::new(index, ParamSource::Path, Some(key))
    }

    pub fn path_map(index: usize) -> Self {
        Self::new(index, ParamSource::Path, None)
    }

    pub fn query(index: usize, key: &str) -> Self {
        Self::new(index, ParamSource::Query, Some(key))
    }

    pub fn query_map(index: usize) -> Self {
        Self::new(index, ParamSource::Query, None)
    }

    pub fn body(index: usize) -> Self {
        Self::new(index, ParamSource::Body, None)
    }

    pub fn header(index: usize, key: &str) -> Self {
        Self::new(index, ParamSource::Header, Some(key))
    }

    pub fn headers(index: usize) -> Self {
        Self::new(index, ParamSource::Header, None)
    }

    pub fn request(index: usize) -> Self {
        Self::new(index, ParamSource::RawRequest, None)
    }

    pub fn response(index: usize) -> Self {
        Self::new(index, ParamSource::RawResponse, None)
    }

    /// Attach a pipe; pipes run in the order they are attached.
    pub fn pipe<P: Pipe + 'static>(mut self, pipe: P) -> Self {
        self.pipes.push(Arc::new(pipe));
        self
    }

    /// Name used in error messages: the key, or the source for keyless params.
    pub fn label(&self) -> String {
        match &self.key {
            Some(key) => key.clone(),
            None => format!("{:?}", self.source).to_ascii_lowercase(),
        }
    }
}

impl std::fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("index", &self.index)
            .field("source", &self.source)
            .field("key", &self.key)
            .field("pipes", &self.pipes.len())
            .finish()
    }
}

/// A resolved argument value
#[derive(Debug, Clone)]
pub enum ArgValue {
    Str(String),
    Map(HashMap<String, String>),
    Json(Value),
    Request(HttpRequest),
    Response(ResponseHandle),
}

impl ArgValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ArgValue::Str(s) => Some(s),
            ArgValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    /// The value as JSON, for deserialization into a handler type.
    fn to_json(&self) -> Option<Value> {
        match self {
            ArgValue::Str(s) => Some(Value::String(s.clone())),
            ArgValue::Map(map) => serde_json::to_value(map).ok(),
            ArgValue::Json(v) => Some(v.clone()),
            ArgValue::Request(_) | ArgValue::Response(_) => None,
        }
    }
}

/// Positional handler arguments.
#[derive(Debug, Clone, Default)]
pub struct HandlerArgs {
    values: Vec<Option<ArgValue>>,
}

impl HandlerArgs {
    pub fn new(values: Vec<Option<ArgValue>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Option<ArgValue>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&ArgValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).and_then(ArgValue::as_str)
    }

    pub fn map(&self, index: usize) -> Option<&HashMap<String, String>> {
        match self.get(index) {
            Some(ArgValue::Map(map)) => Some(map),
            _ => None,
        }
    }

    pub fn json(&self, index: usize) -> Option<&Value> {
        match self.get(index) {
            Some(ArgValue::Json(value)) => Some(value),
            _ => None,
        }
    }

    pub fn request(&self, index: usize) -> Option<&HttpRequest> {
        match self.get(index) {
            Some(ArgValue::Request(req)) => Some(req),
            _ => None,
        }
    }

    pub fn response(&self, index: usize) -> Option<&ResponseHandle> {
        match self.get(index) {
            Some(ArgValue::Response(res)) => Some(res),
            _ => None,
        }
    }

    /// Deserialize argument `index` into `T`.
    ///
    /// A missing argument or a shape mismatch is a parse error (400).
    pub fn body<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let value = self
            .get(index)
            .and_then(ArgValue::to_json)
            .ok_or_else(|| Error::Parse(format!("argument {index} is missing")))?;
        serde_json::from_value(value).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Parse a scalar argument with `FromStr`.
    ///
    /// A missing argument or a failed conversion is a type error (400).
    pub fn parse<T>(&self, index: usize) -> Result<T, Error>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = match self.get(index) {
            Some(ArgValue::Str(s)) => s.clone(),
            Some(ArgValue::Json(Value::String(s))) => s.clone(),
            Some(ArgValue::Json(v @ (Value::Number(_) | Value::Bool(_)))) => v.to_string(),
            _ => return Err(Error::Type(format!("argument {index} is missing"))),
        };
        raw.parse::<T>()
            .map_err(|e| Error::Type(format!("argument {index}: {e}")))
    }
}

/// Build the positional argument list for one request.
///
/// Descriptors are processed in ascending index order (stable, so among
/// descriptors sharing an index the later declaration wins). Missing keys
/// resolve to `None`; the resolver never fails. Descriptors at or above
/// [`MAX_PARAM_INDEX`] are skipped.
pub fn resolve_params(
    descriptors: &[ParamDescriptor],
    request: &HttpRequest,
    body: Option<&Value>,
    response: &ResponseHandle,
) -> HandlerArgs {
    let (sorted, len) = in_range_sorted(descriptors);
    let mut values = vec![None; len];
    for descriptor in sorted {
        values[descriptor.index] = resolve_one(descriptor, request, body, response);
    }

    trace!(count = values.len(), "Resolved handler parameters");
    HandlerArgs::new(values)
}

/// Resolve parameters, then run each parameter's pipes over its value.
pub fn resolve_with_pipes(
    descriptors: &[ParamDescriptor],
    request: &HttpRequest,
    body: Option<&Value>,
    response: &ResponseHandle,
) -> Result<HandlerArgs, Error> {
    let (sorted, len) = in_range_sorted(descriptors);
    let mut values = vec![None; len];
    for descriptor in sorted {
        let mut value = resolve_one(descriptor, request, body, response);
        for pipe in &descriptor.pipes {
            value = pipe.transform(value, descriptor)?;
        }
        values[descriptor.index] = value;
    }

    Ok(HandlerArgs::new(values))
}

fn in_range_sorted(descriptors: &[ParamDescriptor]) -> (Vec<&ParamDescriptor>, usize) {
    let mut sorted: Vec<&ParamDescriptor> = descriptors
        .iter()
        .filter(|d| d.index < MAX_PARAM_INDEX)
        .collect();
    sorted.sort_by_key(|d| d.index);
    let len = sorted
        .last()
        .and_then(|d| d.index.checked_add(1))
        .unwrap_or(0);
    (sorted, len)
}

/// Indices claimed by more than one descriptor, ascending.
pub fn duplicate_indices(descriptors: &[ParamDescriptor]) -> Vec<usize> {
    let mut counts: HashMap<usize, usize> = HashMap::new();
    for d in descriptors {
        *counts.entry(d.index).or_default() += 1;
    }
    let mut dups: Vec<usize> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(i, _)| i)
        .collect();
    dups.sort_unstable();
    dups
}

/// Whether any descriptor reads the request body.
pub fn needs_body(descriptors: &[ParamDescriptor]) -> bool {
    descriptors.iter().any(|d| d.source == ParamSource::Body)
}

fn resolve_one(
    descriptor: &ParamDescriptor,
    request: &HttpRequest,
    body: Option<&Value>,
    response: &ResponseHandle,
) -> Option<ArgValue> {
    let key = descriptor.key.as_deref();
    match descriptor.source {
        ParamSource::Path => lookup(&request.path_params, key),
        ParamSource::Query => lookup(&request.query_params, key),
        ParamSource::Header => match key {
            Some(k) => request.header(k).cloned().map(ArgValue::Str),
            None => Some(ArgValue::Map(request.headers.clone())),
        },
        ParamSource::Body => body.cloned().map(ArgValue::Json),
        ParamSource::RawRequest => Some(ArgValue::Request(request.clone())),
        ParamSource::RawResponse => Some(ArgValue::Response(response.clone())),
    }
}

fn lookup(map: &HashMap<String, String>, key: Option<&str>) -> Option<ArgValue> {
    match key {
        Some(k) => map.get(k).cloned().map(ArgValue::Str),
        None => Some(ArgValue::Map(map.clone())),
    }
}
