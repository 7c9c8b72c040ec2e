//! Typed option schemas and the resolver that turns user option bags into
//! cache keys.
//!
//! Resolution applies defaults, coerces each value to its declared type, and
//! splits the result into *mangling* options (part of the cache key) and the
//! rest. The suffix is the delimiter-joined string form of the mangling
//! options in ascending name order; [`parse_suffix`] reverses it using the
//! schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::{EngineError, EngineResult};
use crate::util::{escape_component, unescape_component};
use crate::value::Value;

/// User-supplied options, keyed by option name.
pub type OptionBag = BTreeMap<String, Value>;

/// Separator between fields of a cache-key suffix. Escaped out of every field.
pub const SUFFIX_DELIMITER: char = ',';

/// Declared type of an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Bool,
    Int,
    Float,
    Str,
    List,
    Any,
}

/// Extra check run after coercion.
pub type Validator = fn(&Value) -> bool;

/// Declaration of a single option.
#[derive(Debug, Clone)]
pub struct OptionSpec {
    pub ty: OptionType,
    /// `None` makes the option required.
    pub default: Option<Value>,
    /// Mangling options participate in the cache key.
    pub mangle: bool,
    pub description: String,
    pub validator: Option<Validator>,
}

impl OptionSpec {
    pub fn new(ty: OptionType, description: impl Into<String>) -> Self {
        Self { ty, default: None, mangle: false, description: description.into(), validator: None }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn mangle(mut self) -> Self {
        self.mangle = true;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Mapping from option name to declaration.
#[derive(Debug, Clone, Default)]
pub struct OptionSchema {
    specs: BTreeMap<String, OptionSpec>,
    closed: bool,
}

impl OptionSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject keys the schema does not declare.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }

    pub fn with(mut self, name: impl Into<String>, spec: OptionSpec) -> Self {
        self.specs.insert(name.into(), spec);
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionSpec)> {
        self.specs.iter()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    fn mangled(&self) -> impl Iterator<Item = (&String, &OptionSpec)> {
        self.specs.iter().filter(|(_, spec)| spec.mangle)
    }
}

/// Result of resolving an option bag against a schema.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResolvedOptions {
    /// Options whose values participate in the cache key.
    pub mangle: OptionBag,
    /// Everything else, including undeclared keys of open schemas.
    pub other: OptionBag,
    suffix: String,
}

impl ResolvedOptions {
    /// Cache-key suffix of the mangling options.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.mangle.get(name).or_else(|| self.other.get(name))
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(Value::as_bool)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(Value::as_int)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Both views merged back into one bag (what a remote peer needs to re-resolve).
    pub fn to_bag(&self) -> OptionBag {
        let mut bag = self.other.clone();
        bag.extend(self.mangle.iter().map(|(k, v)| (k.clone(), v.clone())));
        bag
    }
}

/// Resolve `bag` against the schema of `module`.
pub fn resolve(module: &str, schema: &OptionSchema, bag: &OptionBag) -> EngineResult<ResolvedOptions> {
    let mut resolved = ResolvedOptions::default();

    for (name, value) in bag {
        if schema.get(name).is_none() {
            if schema.is_closed() {
                return Err(EngineError::UnknownOption {
                    module: module.to_string(),
                    option: name.clone(),
                });
            }
            resolved.other.insert(name.clone(), value.clone());
        }
    }

    for (name, spec) in schema.iter() {
        let supplied = bag.get(name).filter(|v| !matches!(v, Value::Null));
        let raw = match (supplied, &spec.default) {
            (Some(value), _) => value.clone(),
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return Err(EngineError::OptionMissingRequired {
                    module: module.to_string(),
                    option: name.clone(),
                })
            }
        };
        let value = coerce(module, name, spec.ty, raw)?;
        if let Some(check) = spec.validator {
            if !check(&value) {
                return Err(EngineError::OptionTypeError {
                    module: module.to_string(),
                    option: name.clone(),
                    message: format!("value {value} failed validation"),
                });
            }
        }
        if spec.mangle {
            resolved.mangle.insert(name.clone(), value);
        } else {
            resolved.other.insert(name.clone(), value);
        }
    }

    resolved.suffix = build_suffix(schema, &resolved.mangle)?;
    Ok(resolved)
}

/// Coerce `value` to `ty`. Strings are parsed for scalar types so option bags
/// coming from a command line resolve the same as typed ones.
pub fn coerce(module: &str, option: &str, ty: OptionType, value: Value) -> EngineResult<Value> {
    let mismatch = |value: &Value| EngineError::OptionTypeError {
        module: module.to_string(),
        option: option.to_string(),
        message: format!("expected {ty:?}, got {} ({value})", value.type_name()),
    };

    let coerced = match (ty, value) {
        (OptionType::Any, v) => Some(v),
        (OptionType::Bool, Value::Bool(b)) => Some(Value::Bool(b)),
        (OptionType::Bool, Value::Int(i)) if i == 0 || i == 1 => Some(Value::Bool(i == 1)),
        (OptionType::Bool, Value::Str(ref s)) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(Value::Bool(true)),
            "false" | "0" | "no" => Some(Value::Bool(false)),
            _ => return Err(mismatch(&Value::Str(s.clone()))),
        },
        (OptionType::Int, Value::Int(i)) => Some(Value::Int(i)),
        (OptionType::Int, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
            Some(Value::Int(f as i64))
        }
        (OptionType::Int, Value::Str(ref s)) => s.trim().parse::<i64>().ok().map(Value::Int),
        (OptionType::Float, Value::Float(f)) => Some(Value::Float(f)),
        (OptionType::Float, Value::Int(i)) => Some(Value::Float(i as f64)),
        (OptionType::Float, Value::Str(ref s)) => s.trim().parse::<f64>().ok().map(Value::Float),
        (OptionType::Str, Value::Str(s)) => Some(Value::Str(s)),
        (OptionType::Str, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
            Some(Value::Str(v.to_string()))
        }
        (OptionType::List, Value::List(items)) => Some(Value::List(items)),
        (_, other) => return Err(mismatch(&other)),
    };

    coerced.ok_or_else(|| EngineError::OptionTypeError {
        module: module.to_string(),
        option: option.to_string(),
        message: format!("could not parse value as {ty:?}"),
    })
}

/// Build the cache-key suffix for already-coerced mangling options.
pub fn build_suffix(schema: &OptionSchema, mangle: &OptionBag) -> EngineResult<String> {
    let mut fields = Vec::new();
    for (name, spec) in schema.mangled() {
        let value = mangle.get(name).cloned().unwrap_or(Value::Null);
        fields.push(escape_component(&suffix_field(spec.ty, &value)?));
    }
    Ok(fields.join(&SUFFIX_DELIMITER.to_string()))
}

/// Parse a suffix back into the mangling options it was built from.
pub fn parse_suffix(module: &str, schema: &OptionSchema, suffix: &str) -> EngineResult<OptionBag> {
    let specs: Vec<(&String, &OptionSpec)> = schema.mangled().collect();
    let fields: Vec<&str> = if specs.is_empty() {
        if !suffix.is_empty() {
            return Err(suffix_error(module, suffix, "module has no mangling options"));
        }
        Vec::new()
    } else {
        suffix.split(SUFFIX_DELIMITER).collect()
    };
    if fields.len() != specs.len() {
        return Err(suffix_error(
            module,
            suffix,
            &format!("expected {} fields, found {}", specs.len(), fields.len()),
        ));
    }

    let mut bag = OptionBag::new();
    for ((name, spec), field) in specs.into_iter().zip(fields) {
        let text = unescape_component(field)
            .ok_or_else(|| suffix_error(module, suffix, "malformed escape"))?;
        let value = match spec.ty {
            OptionType::List | OptionType::Any => {
                let bytes = hex::decode(&text)
                    .map_err(|_| suffix_error(module, suffix, "malformed encoded field"))?;
                codec::decode::<Value>(&bytes)?
            }
            scalar => coerce(module, name, scalar, Value::Str(text))?,
        };
        bag.insert(name.clone(), value);
    }
    Ok(bag)
}

fn suffix_field(ty: OptionType, value: &Value) -> EngineResult<String> {
    Ok(match (ty, value) {
        (OptionType::List | OptionType::Any, v) => hex::encode(codec::encode(v)?),
        (_, Value::Str(s)) => s.clone(),
        (_, Value::Null) => String::new(),
        // `{:?}` is the shortest text that parses back to the same bits,
        // including `inf`, `-inf` and `NaN`.
        (_, Value::Float(f)) => format!("{f:?}"),
        (_, other) => other.to_string(),
    })
}

fn suffix_error(module: &str, suffix: &str, message: &str) -> EngineError {
    EngineError::OptionTypeError {
        module: module.to_string(),
        option: "<suffix>".to_string(),
        message: format!("cannot parse suffix '{suffix}': {message}"),
    }
}
