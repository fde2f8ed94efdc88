//! # Navigation Tree
//!
//! Per-compilation arena of navigation tree nodes and source mappings.
//!
//! Every logical input stream owns one [`SourceMapping`] whose tree records the
//! navigations discovered so far. Nodes are addressed by [`NodeId`], so two
//! bindings of the same path always share a node by index equality.
//!
//! A node's physical access path is never stored in its final form. Instead
//! each mapping keeps a *flattening history*: every time a join wraps the row in
//! an `{ outer, inner }` record, the prefix it adds is appended. The path of a
//! node is its `base_path` (recorded when it was expanded) with every prefix
//! recorded after that point prepended.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity_catalog::Navigation;


#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceMappingId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for SourceMappingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationNode {
    pub id: NodeId,
    pub mapping: SourceMappingId,
    pub parent: Option<NodeId>,
    /// Relationship this node was reached through; `None` for roots and
    /// materialized record fields.
    pub edge: Option<Navigation>,
    /// Entity type of the rows behind this node; `None` for opaque records.
    pub entity: Option<String>,
    /// Record field name, for nodes standing for a field of a materialized row.
    pub field: Option<String>,
    pub children: Vec<NodeId>,
    pub optional: bool,
    pub expanded: bool,
    pub removed: bool,
    /// Logical paths that resolve to this node.
    pub from_mappings: Vec<Vec<String>>,
    base_path: Vec<String>,
    expanded_at: usize,
}

impl NavigationNode {
    pub fn is_collection(&self) -> bool {
        self.edge.as_ref().is_some_and(|e| e.is_collection)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Name of the member that leads to this node from its parent.
    pub fn step_name(&self) -> Option<&str> {
        match (&self.edge, &self.field) {
            (Some(edge), _) => Some(edge.name.as_str()),
            (None, Some(field)) => Some(field.as_str()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatteningStep {
    pub prefix: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceMapping {
    pub id: SourceMappingId,
    /// `None` for the opaque record root of a materialized projection.
    pub root_entity: Option<String>,
    pub root: NodeId,
    history: Vec<FlatteningStep>,
}

impl SourceMapping {
    pub fn history(&self) -> &[FlatteningStep] {
        &self.history
    }
}

#[derive(Debug, Clone, Default)]
pub struct NavigationArena {
    nodes: Vec<NavigationNode>,
    mappings: Vec<SourceMapping>,
}

impl NavigationArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &NavigationNode {
        &self.nodes[id.0]
    }

    pub fn mapping(&self, id: SourceMappingId) -> &SourceMapping {
        &self.mappings[id.0]
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn push_node(&mut self, mut node: NavigationNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        self.nodes.push(node);
        id
    }

    /// Create a mapping for a new input stream. Its root is the whole physical
    /// row, so it starts out expanded with an empty path.
    pub fn add_source_mapping(&mut self, entity: Option<&str>, optional: bool) -> SourceMappingId {
        let mapping_id = SourceMappingId(self.mappings.len());
        let root = self.push_node(NavigationNode {
            id: NodeId(0),
            mapping: mapping_id,
            parent: None,
            edge: None,
            entity: entity.map(str::to_string),
            field: None,
            children: vec![],
            optional,
            expanded: true,
            removed: false,
            from_mappings: vec![vec![]],
            base_path: vec![],
            expanded_at: 0,
        });
        self.mappings.push(SourceMapping {
            id: mapping_id,
            root_entity: entity.map(str::to_string),
            root,
            history: vec![],
        });
        log::trace!("NavigationArena: new mapping {} rooted at {}", mapping_id, root);
        mapping_id
    }

    pub fn find_child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|c| self.node(*c).step_name() == Some(name))
    }

    /// Return the child reached through `edge`, creating it on first use.
    pub fn get_or_add_child(&mut self, parent: NodeId, edge: &Navigation) -> NodeId {
        if let Some(existing) = self.find_child(parent, &edge.name) {
            return existing;
        }

        let parent_node = self.node(parent);
        let mut path = self.logical_path(parent);
        path.push(edge.name.clone());
        let child = NavigationNode {
            id: NodeId(0),
            mapping: parent_node.mapping,
            parent: Some(parent),
            edge: Some(edge.clone()),
            entity: Some(edge.target.clone()),
            field: None,
            children: vec![],
            optional: parent_node.optional || edge.is_optional(),
            expanded: false,
            removed: false,
            from_mappings: vec![path],
            base_path: vec![],
            expanded_at: 0,
        };
        let id = self.push_node(child);
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Add an already-present record field under an opaque root.
    pub fn add_field_node(
        &mut self,
        parent: NodeId,
        field: &str,
        entity: Option<&str>,
        optional: bool,
    ) -> NodeId {
        let mapping = self.node(parent).mapping;
        let parent_optional = self.node(parent).optional;
        let expanded_at = self.mapping(mapping).history.len();
        let id = self.push_node(NavigationNode {
            id: NodeId(0),
            mapping,
            parent: Some(parent),
            edge: None,
            entity: entity.map(str::to_string),
            field: Some(field.to_string()),
            children: vec![],
            optional: optional || parent_optional,
            expanded: true,
            removed: false,
            from_mappings: vec![vec![field.to_string()]],
            base_path: vec![field.to_string()],
            expanded_at,
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn add_from_mapping(&mut self, node: NodeId, path: Vec<String>) {
        let node = &mut self.nodes[node.0];
        if !node.from_mappings.contains(&path) {
            node.from_mappings.push(path);
        }
    }

    /// Detach a node (and with it, its subtree) from its parent.
    pub fn remove(&mut self, id: NodeId) {
        if let Some(parent) = self.node(id).parent {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.nodes[current.0].removed = true;
            stack.extend(self.nodes[current.0].children.iter().copied());
        }
    }

    /// A join wrapped every row of `mapping` in a flattening record.
    pub fn record_flattening(&mut self, mapping: SourceMappingId, prefix: &[&str]) {
        self.mappings[mapping.0].history.push(FlatteningStep {
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
        });
    }

    /// The node's rows are now physically present at `base_path` of the
    /// current row.
    pub fn mark_expanded(&mut self, id: NodeId, base_path: &[&str]) {
        let expanded_at = self.mapping(self.node(id).mapping).history.len();
        let node = &mut self.nodes[id.0];
        node.expanded = true;
        node.base_path = base_path.iter().map(|s| s.to_string()).collect();
        node.expanded_at = expanded_at;
    }

    /// Mark every node of a mapping optional (right side of a left join).
    pub fn mark_optional(&mut self, mapping: SourceMappingId) {
        for node in self.nodes.iter_mut().filter(|n| n.mapping == mapping) {
            node.optional = true;
        }
    }

    /// Physical access path from the current row to this node's data, or
    /// `None` while the node has not been expanded.
    pub fn to_mapping(&self, id: NodeId) -> Option<Vec<String>> {
        let node = self.node(id);
        if !node.expanded || node.removed {
            return None;
        }
        let history = &self.mapping(node.mapping).history;
        let mut path = node.base_path.clone();
        for step in history.iter().skip(node.expanded_at) {
            let mut prefixed = step.prefix.clone();
            prefixed.extend(path);
            path = prefixed;
        }
        Some(path)
    }

    /// Member names from the mapping root to this node.
    pub fn logical_path(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if let Some(step) = node.step_name() {
                path.push(step.to_string());
            }
            current = node.parent;
        }
        path.reverse();
        path
    }

    /// Number of navigation hops from the root.
    pub fn depth(&self, id: NodeId) -> usize {
        let mut depth = 0;
        let mut current = self.node(id).parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.node(parent).parent;
        }
        depth
    }

    /// Follow member names from a mapping root through existing nodes.
    pub fn resolve_logical_path(&self, mapping: SourceMappingId, path: &[&str]) -> Option<NodeId> {
        let mut current = self.mapping(mapping).root;
        for step in path {
            current = self.find_child(current, step)?;
        }
        Some(current)
    }

    /// The node and all its live descendants, parents before children.
    pub fn flatten(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            if node.removed {
                continue;
            }
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Human-readable dump of a mapping, for trace logging.
    pub fn describe(&self, mapping: SourceMappingId) -> String {
        let root = self.mapping(mapping).root;
        self.flatten(root)
            .into_iter()
            .map(|id| {
                let node = self.node(id);
                format!(
                    "{}{} [{}{}] -> {}",
                    "  ".repeat(self.depth(id)),
                    node.step_name().unwrap_or("<root>"),
                    node.entity.as_deref().unwrap_or("record"),
                    if node.optional { ", optional" } else { "" },
                    match self.to_mapping(id) {
                        Some(path) if path.is_empty() => "<row>".to_string(),
                        Some(path) => path.join("."),
                        None => "<unexpanded>".to_string(),
                    }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
