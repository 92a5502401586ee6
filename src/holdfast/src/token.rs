use std::any;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde_json::Value;

/// A stable identity naming an injectable dependency.
///
/// A [`Token`] carries the type it resolves to and a string id the engine
/// keys everything by. Two tokens are equal iff their ids are equal; the
/// type parameter only drives the typed resolution surface. Tokens are
/// immutable and cheap to copy.
pub struct Token<T> {
    id: &'static str,
    _marker: PhantomData<fn() -> T>,
}

/// Returns a token whose id is the target's type name.
pub fn of<T>() -> Token<T> {
    Token {
        id: any::type_name::<T>(),
        _marker: PhantomData,
    }
}

/// Returns a token with an explicit id, independent of the target type.
///
/// Named tokens allow several bindings of the same type (e.g. two
/// connection pools) to coexist.
pub fn named<T>(name: &'static str) -> Token<T> {
    Token {
        id: name,
        _marker: PhantomData,
    }
}

impl<T> Token<T> {
    pub fn id(&self) -> &'static str {
        self.id
    }

    /// The name of the instance this token resolves to, given the call
    /// arguments. Argument-free resolutions use the token id itself;
    /// parameterized resolutions append a canonical rendering of the
    /// arguments, so each distinct argument set owns one instance.
    pub fn instance_name(&self, args: Option<&Value>) -> String {
        instance_name(self.id, args)
    }
}

pub(crate) fn instance_name(id: &str, args: Option<&Value>) -> String {
    match args {
        None => id.to_string(),
        Some(args) => {
            let mut out = String::with_capacity(id.len() + 16);
            out.push_str(id);
            out.push('(');
            write_canonical(args, &mut out);
            out.push(')');
            out
        }
    }
}

/// Writes `value` with object keys sorted, so semantically equal argument
/// sets always render to the same name.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

impl<T> Clone for Token<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Token<T> {}

impl<T> Debug for Token<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(self, f)
    }
}

impl<T> Display for Token<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.id)
    }
}

impl<T> PartialEq for Token<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Token<T> {}

impl<T> Hash for Token<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tokens_compare_by_id() {
        let a = named::<i32>("left");
        let b = named::<i32>("left");
        let c = named::<i32>("right");

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn instance_name_without_args_is_the_id() {
        let token = named::<i32>("db");
        assert_eq!(token.instance_name(None), "db");
    }

    #[test]
    fn instance_name_is_stable_across_key_order() {
        let token = named::<i32>("db");
        let first = token.instance_name(Some(&json!({"a": 1, "b": [2, "x"]})));
        let second = token.instance_name(Some(&json!({"b": [2, "x"], "a": 1})));

        assert_eq!(first, second);
        assert_eq!(first, r#"db({"a":1,"b":[2,"x"]})"#);
    }

    #[test]
    fn instance_name_distinguishes_argument_sets() {
        let token = named::<i32>("db");
        let a = token.instance_name(Some(&json!({"foo": "a"})));
        let b = token.instance_name(Some(&json!({"foo": "b"})));

        assert_ne!(a, b);
    }
}
