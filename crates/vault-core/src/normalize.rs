//! Error normalization
//!
//! Native vault modules report failures in several shapes: a JSON string,
//! an object with loosely typed `code`/`subCode` fields (numbers or
//! strings), or an object whose `message` is itself a JSON-encoded error
//! (Android rejects promises with the serialized error as the message).
//! [`normalize`] accepts all of them and produces a [`VaultError`].

use serde_json::Value;
use tracing::warn;

use crate::error::{SubCode, VaultError};

/// Raw failure payload as delivered by a backend
#[derive(Debug, Clone, PartialEq)]
pub enum RawError {
    /// JSON text, parsed before anything else
    Json(String),
    /// Already-decoded JSON value
    Value(Value),
    /// Loosely typed fields
    Native(NativeError),
}

/// Loosely typed native error fields.
///
/// `code` and `sub_code` may hold numbers or strings; nothing is trusted
/// until [`normalize`] coerces it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NativeError {
    pub code: Value,
    pub message: Option<String>,
    pub sub_code: Option<Value>,
}

impl NativeError {
    pub fn new(code: impl Into<Value>) -> Self {
        Self {
            code: code.into(),
            message: None,
            sub_code: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_sub_code(mut self, sub_code: impl Into<Value>) -> Self {
        self.sub_code = Some(sub_code.into());
        self
    }

    /// Pick the error fields out of an arbitrary JSON value.
    ///
    /// A non-object value carries no code; its text becomes the message.
    fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map) => Self {
                code: map.remove("code").unwrap_or(Value::Null),
                message: map.remove("message").and_then(text_of),
                sub_code: map.remove("subCode").filter(|v| !v.is_null()),
            },
            Value::Null => Self::default(),
            other => Self {
                message: text_of(other),
                ..Self::default()
            },
        }
    }

    /// If `message` holds a JSON-encoded error object, that object wins.
    fn unwrap_message(self) -> Self {
        let inner = self
            .message
            .as_deref()
            .filter(|message| !message.is_empty())
            .and_then(|message| serde_json::from_str::<Value>(message).ok())
            .filter(Value::is_object);

        match inner {
            Some(inner) => Self::from_value(inner),
            None => self,
        }
    }

    fn into_vault_error(self) -> VaultError {
        let code = parse_decimal(&stringify(&self.code));
        let sub_code = self.sub_code.map(|raw| {
            let text = stringify(&raw);
            match parse_decimal(&text) {
                Some(value) => SubCode::Int(value),
                None => SubCode::Text(text),
            }
        });
        VaultError::from_parts(code, sub_code, self.message)
    }
}

impl From<VaultError> for RawError {
    fn from(err: VaultError) -> Self {
        let mut native = NativeError::new(err.raw_code().map_or(Value::Null, Value::from));
        native.message = err.message().map(str::to_string);
        native.sub_code = err.sub_code().map(|sub_code| match sub_code {
            SubCode::Int(value) => Value::from(*value),
            SubCode::Text(text) => Value::from(text.as_str()),
        });
        RawError::Native(native)
    }
}

impl From<NativeError> for RawError {
    fn from(native: NativeError) -> Self {
        RawError::Native(native)
    }
}

impl From<Value> for RawError {
    fn from(value: Value) -> Self {
        RawError::Value(value)
    }
}

/// Normalize any raw backend failure into a [`VaultError`].
///
/// Never panics. A top-level string that is not JSON is a backend defect;
/// it is reported as an error without a code carrying the raw text.
pub fn normalize(raw: RawError) -> VaultError {
    let native = match raw {
        RawError::Json(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => NativeError::from_value(value),
            Err(e) => {
                warn!(error = %e, "native error payload is not valid JSON");
                return VaultError::from_parts(None, None, Some(text));
            }
        },
        RawError::Value(Value::String(text)) => return normalize(RawError::Json(text)),
        RawError::Value(value) => NativeError::from_value(value),
        RawError::Native(native) => native,
    };

    native.unwrap_message().into_vault_error()
}

/// String form of a loosely typed field, the way it would be interpolated
fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

/// Leading-integer decimal parse.
///
/// Skips leading whitespace, accepts an optional sign, then takes digits up
/// to the first non-digit: `" 21"` → 21, `"40abc"` → 40, `"12.5"` → 12.
/// Returns `None` when no digit is found or the value overflows.
pub fn parse_decimal(text: &str) -> Option<i64> {
    let trimmed = text.trim_start();
    let (negative, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let digits_len = rest.bytes().take_while(u8::is_ascii_digit).count();
    if digits_len == 0 {
        return None;
    }

    let magnitude: i64 = rest[..digits_len].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}
