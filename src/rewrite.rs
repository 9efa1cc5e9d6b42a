//! Bottom-up, memoized rewriting of the graph reachable through bound arguments.

use crate::DagError;
use crate::dag::Dag;
use crate::node::{DagNodeId, StableId};
use crate::scanner::NodeScanner;
use crate::value::{Kwargs, Value};
use std::collections::HashMap;

/// Memo table for one recursive application, keyed by stable identity.
///
/// Entries keep insertion order, which is the order nodes finished rewriting.
#[derive(Debug)]
pub struct RewriteCache<T> {
    entries: Vec<(StableId, T)>,
    index: HashMap<StableId, usize>,
    input_node: Option<StableId>,
}

impl<T> Default for RewriteCache<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            input_node: None,
        }
    }
}

impl<T: Clone> RewriteCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &StableId) -> Option<&T> {
        self.index.get(id).map(|&i| &self.entries[i].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(StableId, T)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(StableId, T)> {
        self.entries
    }

    /// The input node seen during the application, if any.
    pub fn input_node(&self) -> Option<StableId> {
        self.input_node
    }

    /// Forget every entry recorded after `len` and restore the input node.
    fn truncate(&mut self, len: usize, input_node: Option<StableId>) {
        for (id, _) in self.entries.drain(len..) {
            self.index.remove(&id);
        }
        self.input_node = input_node;
    }

    fn insert(&mut self, id: StableId, value: T) {
        self.index.insert(id, self.entries.len());
        self.entries.push((id, value));
    }

    /// Apply `f` to `node` unless its identity was already handled, and
    /// enforce the single-input-node rule.
    fn call<F>(&mut self, dag: &mut Dag, node: DagNodeId, f: &mut F) -> Result<T, DagError>
    where
        F: FnMut(&mut Dag, DagNodeId) -> Result<T, DagError>,
    {
        let (stable_id, is_input) = {
            let n = dag.node(node)?;
            (n.stable_id(), n.is_input())
        };
        if self.get(&stable_id).is_none() {
            let value = f(dag, node)?;
            self.insert(stable_id, value);
        }
        if is_input {
            match self.input_node {
                None => self.input_node = Some(stable_id),
                Some(existing) if existing != stable_id => {
                    log::warn!("rejecting graph with input nodes {existing} and {stable_id}");
                    return Err(DagError::MultipleInputNodes {
                        first: existing,
                        second: stable_id,
                    });
                }
                Some(_) => {}
            }
        }
        self.get(&stable_id)
            .cloned()
            .ok_or_else(|| DagError::Internal(format!("rewrite cache lost {stable_id}")))
    }
}

impl Dag {
    /// Apply `f` once to every distinct node reachable through `node`'s args,
    /// kwargs and auxiliary values, then copy `node` with each reference
    /// replaced by `f`'s result. Options pass through unchanged.
    pub fn apply_and_replace_children<T, F>(
        &mut self,
        node: DagNodeId,
        mut f: F,
    ) -> Result<DagNodeId, DagError>
    where
        T: Into<Value>,
        F: FnMut(&mut Dag, DagNodeId) -> Result<T, DagError>,
    {
        let n = self.node(node)?;
        let options = n.options();
        let mut scanner = NodeScanner::new();
        let children = scanner.find_nodes(vec![
            Value::List(n.bound_args.clone()),
            Value::Map(n.bound_kwargs.clone()),
            Value::Map(n.bound_other_args_to_resolve.clone()),
        ]);

        let mut table = HashMap::new();
        for child in children {
            let replacement = f(self, child)?;
            table.insert(child, replacement.into());
        }
        let replaced = scanner.replace_nodes(&table);
        scanner.clear();

        let (args, kwargs, other) = unpack_bound(replaced)?;
        self.copy(node, args, kwargs, options, other)
    }

    /// Apply `f` bottom-up over the graph reachable from `root` through bound
    /// values (never through downstream edges).
    ///
    /// Each logical node is handed to `f` once, as a copy whose children were
    /// already replaced by their results. Nodes created along the way are
    /// discarded again if the application fails.
    pub fn apply_recursive<T, F>(&mut self, root: DagNodeId, mut f: F) -> Result<T, DagError>
    where
        T: Clone + Into<Value>,
        F: FnMut(&mut Dag, DagNodeId) -> Result<T, DagError>,
    {
        let mut cache = RewriteCache::new();
        self.apply_recursive_with(root, &mut cache, &mut f)
    }

    /// [`Dag::apply_recursive`] with a caller-owned memo table.
    pub fn apply_recursive_with<T, F>(
        &mut self,
        root: DagNodeId,
        cache: &mut RewriteCache<T>,
        f: &mut F,
    ) -> Result<T, DagError>
    where
        T: Clone + Into<Value>,
        F: FnMut(&mut Dag, DagNodeId) -> Result<T, DagError>,
    {
        let checkpoint = self.checkpoint();
        let (cache_len, input_node) = (cache.len(), cache.input_node());
        let result = self.apply_recursive_inner(root, cache, f);
        if result.is_err() {
            // Cached results may name the copies that are about to be discarded.
            cache.truncate(cache_len, input_node);
            self.rollback(checkpoint);
        }
        result
    }

    fn apply_recursive_inner<T, F>(
        &mut self,
        node: DagNodeId,
        cache: &mut RewriteCache<T>,
        f: &mut F,
    ) -> Result<T, DagError>
    where
        T: Clone + Into<Value>,
        F: FnMut(&mut Dag, DagNodeId) -> Result<T, DagError>,
    {
        let stable_id = self.node(node)?.stable_id();
        if let Some(hit) = cache.get(&stable_id) {
            return Ok(hit.clone());
        }
        let replaced = self.apply_and_replace_children(node, |dag, child| {
            dag.apply_recursive_inner(child, cache, f)
        })?;
        log::debug!("rewriting {}", self.node(replaced)?);
        cache.call(self, replaced, f)
    }

    /// Substitute nodes passing `predicate` inside arbitrary values, without
    /// copying or mutating any node.
    pub fn apply_functional<P, F>(
        &mut self,
        values: Vec<Value>,
        mut predicate: P,
        mut f: F,
    ) -> Result<Vec<Value>, DagError>
    where
        P: FnMut(&Dag, DagNodeId) -> bool,
        F: FnMut(&mut Dag, DagNodeId) -> Result<Value, DagError>,
    {
        let mut scanner = NodeScanner::new();
        let mut table = HashMap::new();
        for node in scanner.find_nodes(values) {
            if predicate(self, node) && !table.contains_key(&node) {
                let replacement = f(self, node)?;
                table.insert(node, replacement);
            }
        }
        let replaced = scanner.replace_nodes(&table);
        scanner.clear();
        Ok(replaced)
    }
}

fn unpack_bound(replaced: Vec<Value>) -> Result<(Vec<Value>, Kwargs, Kwargs), DagError> {
    let mut it = replaced.into_iter();
    match (it.next(), it.next(), it.next()) {
        (Some(Value::List(args)), Some(Value::Map(kwargs)), Some(Value::Map(other))) => {
            Ok((args, kwargs, other))
        }
        _ => Err(DagError::Internal(
            "node replacement changed the shape of bound arguments".to_string(),
        )),
    }
}
