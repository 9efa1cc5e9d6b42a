use crate::DagError;
use crate::node::DagNodeId;
use crate::runtime::{ActorHandle, ObjectRef};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Keyword arguments, call options and the auxiliary resolution map all share this shape.
pub type Kwargs = BTreeMap<String, Value>;
pub type Options = BTreeMap<String, Value>;

/// A user-defined argument type that opts into node scanning.
///
/// Records expose their field values in a stable order and can rebuild
/// themselves from a replaced set of fields of the same length.
pub trait ScanRecord: Send + Sync + Debug {
    fn type_name(&self) -> &str;
    fn fields(&self) -> Vec<&Value>;
    fn with_fields(&self, fields: Vec<Value>) -> Arc<dyn ScanRecord>;

    /// Subscript access, when the record supports it.
    fn get_item(&self, _key: &Value) -> Option<&Value> {
        None
    }
}

/// Plain named record with ordered fields.
#[derive(Clone, Debug)]
pub struct GenericRecord {
    pub name: String,
    pub fields: Vec<(String, Value)>,
}

impl GenericRecord {
    pub fn new(name: impl Into<String>, fields: Vec<(String, Value)>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Record(Arc::new(self))
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == field).map(|(_, v)| v)
    }
}

impl ScanRecord for GenericRecord {
    fn type_name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> Vec<&Value> {
        self.fields.iter().map(|(_, v)| v).collect()
    }

    fn with_fields(&self, fields: Vec<Value>) -> Arc<dyn ScanRecord> {
        let fields = self
            .fields
            .iter()
            .map(|(k, _)| k.clone())
            .zip(fields)
            .collect();
        Arc::new(GenericRecord {
            name: self.name.clone(),
            fields,
        })
    }

    fn get_item(&self, key: &Value) -> Option<&Value> {
        key.as_str().and_then(|k| self.get(k))
    }
}

/// Argument values bound into a graph node.
///
/// Only `List`, `Tuple`, `Map` and `Record` are traversed when looking for
/// nested node references. `Opaque` values are carried through untouched.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Record(Arc<dyn ScanRecord>),
    Node(DagNodeId),
    Ref(ObjectRef),
    Actor(ActorHandle),
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn as_node(&self) -> Option<DagNodeId> {
        match self {
            Value::Node(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Value::Node(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_actor(&self) -> Option<&ActorHandle> {
        match self {
            Value::Actor(x) => Some(x),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "map",
            Value::Record(r) => r.type_name(),
            Value::Node(_) => "node",
            Value::Ref(_) => "ref",
            Value::Actor(_) => "actor",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Index into a sequence by position or into a mapping by key.
    pub fn get_item(&self, key: &Value) -> Option<&Value> {
        match (self, key) {
            (Value::List(items) | Value::Tuple(items), Value::Int(idx)) => {
                let idx = if *idx < 0 {
                    items.len() as i64 + *idx
                } else {
                    *idx
                };
                usize::try_from(idx).ok().and_then(|i| items.get(i))
            }
            (Value::Map(map), Value::Str(name)) => map.get(name),
            (Value::Record(record), key) => record.get_item(key),
            _ => None,
        }
    }

    /// Await every `Ref` reachable through the scanned composite shapes.
    pub fn resolve_refs(self) -> BoxFuture<'static, Result<Value, DagError>> {
        async move {
            match self {
                Value::Ref(r) => r.resolve().await?.resolve_refs().await,
                Value::List(items) => Ok(Value::List(resolve_all(items).await?)),
                Value::Tuple(items) => Ok(Value::Tuple(resolve_all(items).await?)),
                Value::Map(map) => {
                    let mut out = BTreeMap::new();
                    for (k, v) in map {
                        out.insert(k, v.resolve_refs().await?);
                    }
                    Ok(Value::Map(out))
                }
                Value::Record(record) => {
                    let fields: Vec<Value> = record.fields().into_iter().cloned().collect();
                    Ok(Value::Record(record.with_fields(resolve_all(fields).await?)))
                }
                other => Ok(other),
            }
        }
        .boxed()
    }
}

async fn resolve_all(items: Vec<Value>) -> Result<Vec<Value>, DagError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        out.push(item.resolve_refs().await?);
    }
    Ok(out)
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(x) => write!(f, "{x}"),
            Value::Int(x) => write!(f, "{x}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(x) => write!(f, "{x:?}"),
            Value::List(x) => f.debug_list().entries(x).finish(),
            Value::Tuple(x) => {
                let mut t = f.debug_tuple("");
                for v in x {
                    t.field(v);
                }
                t.finish()
            }
            Value::Map(x) => f.debug_map().entries(x).finish(),
            Value::Record(r) => {
                let mut t = f.debug_tuple(r.type_name());
                for v in r.fields() {
                    t.field(v);
                }
                t.finish()
            }
            Value::Node(id) => write!(f, "{id}"),
            Value::Ref(r) => write!(f, "{r:?}"),
            Value::Actor(a) => write!(f, "{a:?}"),
            Value::Opaque(_) => write!(f, "<opaque>"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => {
                a.type_name() == b.type_name() && a.fields() == b.fields()
            }
            (Value::Node(a), Value::Node(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a.id() == b.id(),
            (Value::Actor(a), Value::Actor(b)) => a.actor_id() == b.actor_id(),
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<DagNodeId> for Value {
    fn from(value: DagNodeId) -> Self {
        Value::Node(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Value::Ref(value)
    }
}

impl From<ActorHandle> for Value {
    fn from(value: ActorHandle) -> Self {
        Value::Actor(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Build a keyword map from `(name, value)` pairs.
pub fn kwargs<K: Into<String>, V: Into<Value>>(pairs: impl IntoIterator<Item = (K, V)>) -> Kwargs {
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
