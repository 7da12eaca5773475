//! Dynamic values flowing through templates.
//!
//! Template scopes, filter arguments and YAML front matter all share one
//! tagged [`Value`] type. Coercions are permissive: numeric conversion of a
//! non-numeric string yields zero, missing attributes yield [`Value::Null`],
//! and anything can be rendered as text.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Map type used for template maps.
pub type Map = BTreeMap<String, Value>;

/// Host object exposed to templates with computed attributes.
///
/// Implemented by types that should not be copied into a [`Map`] up front,
/// for example content entries whose rendered body is produced on demand.
pub trait Object: fmt::Debug + Send + Sync {
    /// Attribute lookup; `None` renders as null.
    fn get(&self, key: &str) -> Option<Value>;

    /// Text form used when the object itself is printed.
    fn to_text(&self) -> String {
        String::new()
    }

    /// Attribute names, for iteration and JSON output.
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A template value.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Arc<Vec<Value>>),
    Map(Arc<Map>),
    Date(DateTime<Utc>),
    Object(Arc<dyn Object>),
}

impl Value {
    /// Wrap a host object.
    pub fn object(object: impl Object + 'static) -> Self {
        Self::Object(Arc::new(object))
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Truthiness used by `if`, `and`, `or` and `where_exp`.
    ///
    /// Null, `false`, zero, empty strings, `"false"`, `"0"` and empty
    /// collections are false.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty() && s != "false" && s != "0",
            Self::List(items) => !items.is_empty(),
            Self::Map(map) => !map.is_empty(),
            Self::Date(_) | Self::Object(_) => true,
        }
    }

    /// Whether the `default` filter replaces this value.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null | Self::Bool(false) => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Integer view, or `None` when there is no sensible one.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int_opt(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            Self::String(s) => {
                let s = s.trim();
                s.parse::<i64>().ok().or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
            }
            _ => None,
        }
    }

    /// Integer view with zero fallback.
    #[must_use]
    pub fn to_int(&self) -> i64 {
        self.to_int_opt().unwrap_or(0)
    }

    /// Float view, or `None` when there is no sensible one.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_float_opt(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view; `None` only for null.
    #[must_use]
    pub fn to_text_opt(&self) -> Option<String> {
        match self {
            Self::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Items when iterated: lists yield their items, maps their values,
    /// null nothing, anything else itself.
    #[must_use]
    pub fn to_list(&self) -> Vec<Value> {
        match self {
            Self::Null => Vec::new(),
            Self::List(items) => items.as_ref().clone(),
            Self::Map(map) => map.values().cloned().collect(),
            other => vec![other.clone()],
        }
    }

    /// Number of items, characters or keys.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::String(s) => s.chars().count(),
            Self::List(items) => items.len(),
            Self::Map(map) => map.len(),
            Self::Object(object) => object.keys().len(),
            _ => 0,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attribute or index access.
    ///
    /// Lists accept integer indices (negative counts from the end) and the
    /// pseudo attributes `size`, `first` and `last`. Missing keys are null.
    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        match self {
            Self::Map(map) => {
                let name = key.to_string();
                match map.get(&name) {
                    Some(value) => value.clone(),
                    None if name == "size" => Self::from(map.len()),
                    None => Self::Null,
                }
            }
            Self::List(items) => match key {
                Self::Int(_) | Self::Float(_) => index(items, key.to_int()),
                _ => match key.to_string().as_str() {
                    "size" | "length" => Self::from(items.len()),
                    "first" => items.first().cloned().unwrap_or_default(),
                    "last" => items.last().cloned().unwrap_or_default(),
                    other => other
                        .parse::<i64>()
                        .map_or(Self::Null, |i| index(items, i)),
                },
            },
            Self::String(s) => match key.to_string().as_str() {
                "size" | "length" => Self::from(s.chars().count()),
                _ => Self::Null,
            },
            Self::Object(object) => object.get(&key.to_string()).unwrap_or_default(),
            _ => Self::Null,
        }
    }

    /// Attribute access by name.
    #[must_use]
    pub fn attr(&self, name: &str) -> Value {
        self.get(&Self::String(name.to_owned()))
    }

    /// Loose equality: numbers compare numerically, other values by kind.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => {
                self.to_float_opt() == other.to_float_opt()
            }
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.loose_eq(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::String(s), Self::Int(_) | Self::Float(_))
            | (Self::Int(_) | Self::Float(_), Self::String(s)) => {
                let number = if matches!(self, Self::String(_)) { other } else { self };
                s.trim().parse::<f64>().ok() == number.to_float_opt()
            }
            _ => false,
        }
    }

    /// Ordering for comparisons and sorting; `None` for unrelated kinds.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Int(_) | Self::Float(_), Self::Int(_) | Self::Float(_)) => self
                .to_float_opt()
                .and_then(|a| other.to_float_opt().and_then(|b| a.partial_cmp(&b))),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Date(a), Self::Date(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Whether `needle` is an item, key or substring of this value.
    #[must_use]
    pub fn contains(&self, needle: &Value) -> bool {
        match self {
            Self::List(items) => items.iter().any(|item| item.loose_eq(needle)),
            Self::Map(map) => map.contains_key(&needle.to_string()),
            Self::String(s) => s.contains(&needle.to_string()),
            Self::Object(object) => object.get(&needle.to_string()).is_some(),
            _ => false,
        }
    }

    /// JSON representation.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Map(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>()
                .into(),
            Self::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Self::Object(object) => object
                .keys()
                .into_iter()
                .map(|k| {
                    let v = object.get(&k).unwrap_or_default().to_json();
                    (k, v)
                })
                .collect::<serde_json::Map<_, _>>()
                .into(),
        }
    }
}

fn index(items: &[Value], i: i64) -> Value {
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let i = if i < 0 { len + i } else { i };
    usize::try_from(i)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .unwrap_or_default()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::List(items) => items.iter().try_for_each(|item| write!(f, "{item}")),
            Self::Map(_) => write!(f, "{}", self.to_json()),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d %H:%M:%S %z")),
            Self::Object(object) => f.write_str(&object.to_text()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Self::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(Arc::new(items))
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(Arc::new(map))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from(iter.into_iter().collect::<Vec<_>>())
    }
}

impl From<&serde_yaml::Value> for Value {
    fn from(value: &serde_yaml::Value) -> Self {
        match value {
            serde_yaml::Value::Null => Self::Null,
            serde_yaml::Value::Bool(b) => Self::Bool(*b),
            serde_yaml::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_default(),
            serde_yaml::Value::String(s) => Self::String(s.clone()),
            serde_yaml::Value::Sequence(items) => items.iter().map(Self::from).collect(),
            serde_yaml::Value::Mapping(map) => Self::from(yaml_map(map)),
            serde_yaml::Value::Tagged(tagged) => Self::from(&tagged.value),
        }
    }
}

/// Convert a YAML mapping into a template map, stringifying keys.
#[must_use]
pub fn yaml_map(map: &serde_yaml::Mapping) -> Map {
    map.iter()
        .map(|(k, v)| {
            let key = match k {
                serde_yaml::Value::String(s) => s.clone(),
                other => Value::from(other).to_string(),
            };
            (key, Value::from(v))
        })
        .collect()
}

impl From<&serde_json::Value> for Value {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or_default(),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => items.iter().map(Self::from).collect(),
            serde_json::Value::Object(map) => Self::from(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect::<Map>(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    static_assertions::assert_impl_all!(Value: Send, Sync);

    #[derive(Debug)]
    struct Point;

    impl Object for Point {
        fn get(&self, key: &str) -> Option<Value> {
            match key {
                "x" => Some(Value::Int(3)),
                _ => None,
            }
        }

        fn to_text(&self) -> String {
            "(3)".to_owned()
        }

        fn keys(&self) -> Vec<String> {
            vec!["x".to_owned()]
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::from("false").is_truthy());
        assert!(!Value::from(Vec::new()).is_truthy());
        assert!(Value::from("yes").is_truthy());
        assert!(Value::object(Point).is_truthy());
    }

    #[test]
    fn test_blank_matches_default_filter_rules() {
        assert!(Value::Null.is_blank());
        assert!(Value::Bool(false).is_blank());
        assert!(Value::from("").is_blank());
        assert!(!Value::Int(0).is_blank());
        assert!(!Value::from(" ").is_blank());
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::from("42").to_int(), 42);
        assert_eq!(Value::from(" 3.9 ").to_int(), 3);
        assert_eq!(Value::from("abc").to_int(), 0);
        assert_eq!(Value::from("abc").to_int_opt(), None);
        assert_eq!(Value::Float(2.5).to_int(), 2);
    }

    #[test]
    fn test_list_access() {
        let list = Value::from(vec![Value::from("a"), Value::from("b"), Value::from("c")]);

        assert_eq!(list.get(&Value::Int(1)).to_string(), "b");
        assert_eq!(list.get(&Value::Int(-1)).to_string(), "c");
        assert!(list.get(&Value::Int(5)).is_null());
        assert_eq!(list.attr("size").to_int(), 3);
        assert_eq!(list.attr("first").to_string(), "a");
    }

    #[test]
    fn test_object_access_and_display() {
        let point = Value::object(Point);

        assert_eq!(point.attr("x").to_int(), 3);
        assert!(point.attr("y").is_null());
        assert_eq!(point.to_string(), "(3)");
        assert_eq!(point.to_json(), serde_json::json!({"x": 3}));
    }

    #[test]
    fn test_loose_equality() {
        assert!(Value::Int(1).loose_eq(&Value::Float(1.0)));
        assert!(Value::from("3").loose_eq(&Value::Int(3)));
        assert!(!Value::from("a").loose_eq(&Value::Int(0)));
        assert!(Value::Null.loose_eq(&Value::Null));
    }

    #[test]
    fn test_contains() {
        let tags = Value::from(vec![Value::from("rust"), Value::from("web")]);
        assert!(tags.contains(&Value::from("rust")));
        assert!(!tags.contains(&Value::from("go")));
        assert!(Value::from("hello world").contains(&Value::from("lo w")));
    }

    #[test]
    fn test_from_yaml() {
        let yaml: serde_yaml::Value =
            serde_yaml::from_str("title: Hi\ncount: 2\ntags: [a, b]\n1: one").unwrap();
        let value = Value::from(&yaml);

        assert_eq!(value.attr("title").to_string(), "Hi");
        assert_eq!(value.attr("count").to_int(), 2);
        assert_eq!(value.attr("tags").len(), 2);
        assert_eq!(value.attr("1").to_string(), "one");
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        let date = DateTime::parse_from_rfc3339("2020-07-22T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Value::Date(date).to_string(), "2020-07-22 10:00:00 +0000");
    }
}
