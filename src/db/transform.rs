use crate::db::source::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_MASK_CHAR: char = 'x';

/// Produces a fresh replacement value for every row.
pub type Supplier = Arc<dyn Fn() -> Value + Send + Sync>;

/// How a single column value is obfuscated before it is written.
#[derive(Clone)]
pub enum ValueTransform {
    /// Replace every character with the given one, keeping the length.
    Mask(char),
    ReplaceLiteral(Value),
    ReplaceSupplier(Supplier),
}

impl ValueTransform {
    pub fn mask(mask_char: char) -> Self {
        ValueTransform::Mask(mask_char)
    }

    pub fn replace(value: impl Into<Value>) -> Self {
        ValueTransform::ReplaceLiteral(value.into())
    }

    pub fn replace_with<F>(supplier: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        ValueTransform::ReplaceSupplier(Arc::new(supplier))
    }

    /// Numbered values from a template: every `{n}` becomes 1, 2, 3, ... per row.
    pub fn sequence(template: &str) -> Self {
        let template = template.to_string();
        let counter = AtomicU64::new(0);
        Self::replace_with(move || {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            Value::Text(template.replace("{n}", &n.to_string()))
        })
    }

    pub fn apply(&self, raw: Value) -> Value {
        match self {
            ValueTransform::Mask(c) => {
                if raw.is_null() || raw.is_empty() {
                    raw
                } else {
                    Value::Text(std::iter::repeat(*c).take(raw.char_len()).collect())
                }
            }
            ValueTransform::ReplaceLiteral(value) => value.clone(),
            ValueTransform::ReplaceSupplier(supplier) => supplier(),
        }
    }
}

impl fmt::Debug for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTransform::Mask(c) => f.debug_tuple("Mask").field(c).finish(),
            ValueTransform::ReplaceLiteral(v) => f.debug_tuple("ReplaceLiteral").field(v).finish(),
            ValueTransform::ReplaceSupplier(_) => f.write_str("ReplaceSupplier(..)"),
        }
    }
}

impl fmt::Display for ValueTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTransform::Mask(c) => write!(f, "mask '{}'", c),
            ValueTransform::ReplaceLiteral(v) => write!(f, "replace with {}", v),
            ValueTransform::ReplaceSupplier(_) => write!(f, "replace with generated value"),
        }
    }
}

/// Binds a transform to a column name.
#[derive(Debug, Clone)]
pub struct ColumnPolicy {
    column: String,
    transform: ValueTransform,
}

impl ColumnPolicy {
    pub fn new(column: impl Into<String>, transform: ValueTransform) -> Self {
        Self {
            column: column.into(),
            transform,
        }
    }

    pub fn mask(column: impl Into<String>, mask_char: char) -> Self {
        Self::new(column, ValueTransform::mask(mask_char))
    }

    pub fn replace(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, ValueTransform::replace(value))
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn transform(&self) -> &ValueTransform {
        &self.transform
    }

    pub fn apply(&self, raw: Value) -> Value {
        self.transform.apply(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_preserves_length() {
        let masked = ValueTransform::mask('*').apply(Value::from("a@b.com"));
        assert_eq!(masked, Value::from("*******"));

        for input in ["x", "hello world", "ünïcødé", "'; DROP TABLE users; --"] {
            let Value::Text(out) = ValueTransform::mask('#').apply(Value::from(input)) else {
                panic!("mask must produce text");
            };
            assert_eq!(out.chars().count(), input.chars().count());
            assert!(out.chars().all(|c| c == '#'));
        }
    }

    #[test]
    fn test_mask_leaves_null_and_empty() {
        let mask = ValueTransform::mask(DEFAULT_MASK_CHAR);
        assert_eq!(mask.apply(Value::Null), Value::Null);
        assert_eq!(mask.apply(Value::from("")), Value::from(""));
    }

    #[test]
    fn test_mask_non_text_values() {
        let mask = ValueTransform::mask('x');
        assert_eq!(mask.apply(Value::Int(4242)), Value::from("xxxx"));
        assert_eq!(mask.apply(Value::Bytes(vec![1, 2, 3])), Value::from("xxx"));
    }

    #[test]
    fn test_replace_literal_ignores_input() {
        let replace = ValueTransform::replace("000-00-0000");
        assert_eq!(replace.apply(Value::from("123-45-6789")), Value::from("000-00-0000"));
        assert_eq!(replace.apply(Value::Null), Value::from("000-00-0000"));
    }

    #[test]
    fn test_supplier_runs_per_row() {
        let seq = ValueTransform::sequence("user{n}@example.com");
        assert_eq!(seq.apply(Value::Null), Value::from("user1@example.com"));
        assert_eq!(seq.apply(Value::Null), Value::from("user2@example.com"));
    }

    #[test]
    fn test_column_policy_applies_transform() {
        let policy = ColumnPolicy::mask("email", '*');
        assert_eq!(policy.column(), "email");
        assert_eq!(policy.apply(Value::from("abc")), Value::from("***"));
    }
}
