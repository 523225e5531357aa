// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Canonical cache keys derived from a query identity.

use std::{borrow::Borrow, collections::BTreeMap, fmt};

use serde_json::Value;

/// A cache key uniquely determined by a namespace and a parameter set.
///
/// Keys built by [`build_key`] are canonical: parameters are sorted by name (recursively for
/// nested objects) before they are rendered, so the iteration order of the input never affects
/// the result.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the key and returns the underlying string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}

/// Builds the canonical key for `namespace` and `params`.
///
/// The key has the form `namespace:{"a":1,"b":2}` with parameters sorted by name, or just
/// `namespace` when there are no parameters. When a parameter name repeats, the last value wins.
///
/// Backslashes and colons in `namespace` are escaped with a backslash, so a namespace can never
/// pose as another namespace's parameter list.
///
/// # Examples
///
/// ```
/// use stockpile::build_key;
///
/// let a = build_key("usage", [("device", "89852"), ("period", "month")]);
/// let b = build_key("usage", [("period", "month"), ("device", "89852")]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), r#"usage:{"device":"89852","period":"month"}"#);
///
/// assert_eq!(build_key("inventory", Vec::<(&str, u32)>::new()).as_str(), "inventory");
/// ```
pub fn build_key<I, K, V>(namespace: &str, params: I) -> CacheKey
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    let sorted: BTreeMap<String, Value> = params.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

    let mut key = String::with_capacity(namespace.len());
    for c in namespace.chars() {
        if matches!(c, '\\' | ':') {
            key.push('\\');
        }
        key.push(c);
    }

    if !sorted.is_empty() {
        key.push(':');
        write_object(&mut key, sorted.iter());
    }

    CacheKey(key)
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    out.push('{');
    for (index, (name, value)) in entries.enumerate() {
        if index > 0 {
            out.push(',');
        }
        // Value's Display renders compact JSON with proper escaping.
        out.push_str(&Value::String(name.clone()).to_string());
        out.push(':');
        write_value(out, value);
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            write_object(out, sorted.into_iter());
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
