//! Whole-component validation walk and root discovery.

use crate::DagError;
use crate::dag::Dag;
use crate::node::DagNodeId;
use crate::scanner::find_nodes;
use crate::value::Value;
use std::collections::{HashSet, VecDeque};

impl Dag {
    /// Breadth-first walk over the connected component of `start`, following
    /// both upstream and downstream edges, applying `f` once per node.
    ///
    /// Fails on the first node that holds a node reference inside a
    /// positional container, or on a second compile root. Returns the
    /// compile root, if one was found.
    pub fn traverse_and_apply<F>(
        &self,
        start: DagNodeId,
        mut f: F,
    ) -> Result<Option<DagNodeId>, DagError>
    where
        F: FnMut(&Dag, DagNodeId) -> Result<(), DagError>,
    {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        let mut compile_root: Option<DagNodeId> = None;

        while let Some(id) = queue.pop_front() {
            let node = self.node(id)?;
            if node.args_contain_nested_dag_node() {
                return Err(self.nested_dag_node_error(id));
            }
            if !visited.insert(id) {
                continue;
            }
            if node.is_compile_root() {
                if let Some(first) = compile_root {
                    log::warn!("{} and {} both requested compilation", self.node(first)?, node);
                    return Err(DagError::CompiledMoreThanOnce {
                        first: self.node(first)?.to_string(),
                        second: node.to_string(),
                    });
                }
                compile_root = Some(id);
            }
            f(self, id)?;
            // Upstream edges are followed too, so nodes not descending from the
            // input still get visited and reported.
            for neighbor in node.downstream().iter().chain(node.upstream()) {
                if !visited.contains(neighbor) {
                    queue.push_back(*neighbor);
                }
            }
        }
        Ok(compile_root)
    }

    fn nested_dag_node_error(&self, id: DagNodeId) -> DagError {
        let node = match self.node(id) {
            Ok(node) => node,
            Err(e) => return e,
        };
        for arg in node.args() {
            if matches!(arg, Value::Node(_)) {
                continue;
            }
            let found = find_nodes(&[arg]);
            if !found.is_empty() {
                return DagError::NestedDagNode {
                    count: found.len(),
                    arg: format!("{arg:?}"),
                    node: node.to_string(),
                };
            }
        }
        DagError::Internal(format!(
            "{node} is flagged as holding nested nodes in its args, but none were found"
        ))
    }

    /// Follow first upstream edges from `start` until an input node is found.
    pub fn find_root(&self, start: DagNodeId) -> Result<DagNodeId, DagError> {
        let mut id = start;
        loop {
            let node = self.node(id)?;
            if node.is_input() {
                return Ok(id);
            }
            match node.upstream().first() {
                Some(next) => id = *next,
                None => return Err(DagError::MissingRoot(node.to_string())),
            }
        }
    }
}
