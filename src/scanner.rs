//! Discovery and substitution of node references nested inside argument values.
//!
//! A [`NodeScanner`] holds a snapshot of the values it scanned so that a
//! later [`NodeScanner::replace_nodes`] call rebuilds exactly those values.
//! The snapshot and the visited-record set are released by
//! [`NodeScanner::clear`], or when the scanner is dropped.

use crate::node::DagNodeId;
use crate::value::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Default)]
pub struct NodeScanner {
    source: Vec<Value>,
    found: Vec<DagNodeId>,
    seen_nodes: HashSet<DagNodeId>,
    visited_records: HashSet<usize>,
}

impl NodeScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deep scan of `values`, returning distinct node references in first-encounter order.
    ///
    /// The scanned values become this scanner's snapshot for `replace_nodes`.
    pub fn find_nodes(&mut self, values: Vec<Value>) -> Vec<DagNodeId> {
        self.found.clear();
        self.seen_nodes.clear();
        self.visited_records.clear();
        for value in &values {
            self.visit(value);
        }
        self.source = values;
        self.found.clone()
    }

    fn visit(&mut self, value: &Value) {
        match value {
            Value::Node(id) => {
                if self.seen_nodes.insert(*id) {
                    self.found.push(*id);
                }
            }
            Value::List(items) | Value::Tuple(items) => {
                for item in items {
                    self.visit(item);
                }
            }
            Value::Map(map) => {
                for item in map.values() {
                    self.visit(item);
                }
            }
            Value::Record(record) => {
                // Records are immutable behind an Arc, so a shared record only needs one visit.
                let addr = Arc::as_ptr(record) as *const () as usize;
                if self.visited_records.insert(addr) {
                    for field in record.fields() {
                        self.visit(field);
                    }
                }
            }
            _ => {}
        }
    }

    /// Rebuild the snapshot with every node in `table` substituted.
    ///
    /// Nodes absent from `table` are left as references.
    pub fn replace_nodes(&self, table: &HashMap<DagNodeId, Value>) -> Vec<Value> {
        self.source
            .iter()
            .map(|value| replace_value(value, table))
            .collect()
    }

    /// Release the snapshot and all traversal state.
    pub fn clear(&mut self) {
        self.source = Vec::new();
        self.found = Vec::new();
        self.seen_nodes = HashSet::new();
        self.visited_records = HashSet::new();
    }

    pub fn is_clear(&self) -> bool {
        self.source.is_empty() && self.found.is_empty() && self.visited_records.is_empty()
    }
}

impl Drop for NodeScanner {
    fn drop(&mut self) {
        self.clear();
    }
}

fn replace_value(value: &Value, table: &HashMap<DagNodeId, Value>) -> Value {
    match value {
        Value::Node(id) => match table.get(id) {
            Some(replacement) => replacement.clone(),
            None => value.clone(),
        },
        Value::List(items) => Value::List(items.iter().map(|x| replace_value(x, table)).collect()),
        Value::Tuple(items) => {
            Value::Tuple(items.iter().map(|x| replace_value(x, table)).collect())
        }
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), replace_value(v, table)))
                .collect(),
        ),
        Value::Record(record) => {
            let fields = record
                .fields()
                .into_iter()
                .map(|x| replace_value(x, table))
                .collect();
            Value::Record(record.with_fields(fields))
        }
        other => other.clone(),
    }
}

/// Scoped find-and-replace: runs `f` with a fresh scanner and releases it afterwards,
/// including when `f` fails.
pub fn with_scanner<R>(f: impl FnOnce(&mut NodeScanner) -> R) -> R {
    let mut scanner = NodeScanner::new();
    let result = f(&mut scanner);
    scanner.clear();
    result
}

/// Deep discovery without keeping a snapshot.
pub fn find_nodes(values: &[&Value]) -> Vec<DagNodeId> {
    with_scanner(|scanner| scanner.find_nodes(values.iter().map(|v| (*v).clone()).collect()))
}

/// Non-recursive discovery: only values that are themselves node references.
pub fn find_toplevel_nodes<'a>(values: impl IntoIterator<Item = &'a Value>) -> Vec<DagNodeId> {
    let mut out = Vec::new();
    for value in values {
        if let Value::Node(id) = value {
            if !out.contains(id) {
                out.push(*id);
            }
        }
    }
    out
}
