//! The compiled route tree.
//!
//! Nodes live in an arena (`Vec`) with parent/child indices; a name index
//! maps fully-qualified names (`"users.view"`) to nodes. The tree is
//! immutable once compiled — the engine recompiles it after any route
//! mutation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::PathError;
use crate::pattern::PathPattern;

/// The sanitized shape of one route definition: name, path, children.
///
/// This is the serde round-trip form of a route table; everything
/// behavioral (guards, forwards, encoders) lives outside the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeDef {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeDef>,
}

impl TreeDef {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct RouteNode {
    name: String,
    local_name: String,
    pattern: PathPattern,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// A borrowed view of one node in the tree.
#[derive(Debug, Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a RouteTree,
    index: usize,
}

impl<'a> NodeRef<'a> {
    /// Fully-qualified, dot-joined name.
    pub fn name(&self) -> &'a str {
        &self.tree.nodes[self.index].name
    }

    /// The final name segment.
    pub fn local_name(&self) -> &'a str {
        &self.tree.nodes[self.index].local_name
    }

    /// This node's own compiled template.
    pub fn pattern(&self) -> &'a PathPattern {
        &self.tree.nodes[self.index].pattern
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.tree.nodes[self.index].parent.map(|index| NodeRef {
            tree: self.tree,
            index,
        })
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.tree.nodes[self.index]
            .children
            .iter()
            .map(move |&index| NodeRef { tree, index })
    }
}

/// The compiled route tree plus its root path prefix.
#[derive(Debug, Clone)]
pub struct RouteTree {
    root_path: String,
    nodes: Vec<RouteNode>,
    by_name: HashMap<String, usize>,
    roots: Vec<usize>,
}

impl RouteTree {
    /// An empty tree with no root prefix.
    pub fn empty() -> Self {
        Self::compile(&[], "").expect("empty tree always compiles")
    }

    /// Compile definitions into a tree rooted at `root_path`.
    ///
    /// Fails when a template does not parse or a fully-qualified name
    /// occurs twice.
    pub fn compile(defs: &[TreeDef], root_path: &str) -> Result<RouteTree, PathError> {
        let mut tree = RouteTree {
            root_path: root_path.trim_end_matches('/').to_string(),
            nodes: Vec::new(),
            by_name: HashMap::new(),
            roots: Vec::new(),
        };
        for def in defs {
            let index = tree.insert(def, None, "")?;
            tree.roots.push(index);
        }
        tree.sort_children();
        Ok(tree)
    }

    fn insert(&mut self, def: &TreeDef, parent: Option<usize>, prefix: &str) -> Result<usize, PathError> {
        let name = if prefix.is_empty() {
            def.name.clone()
        } else {
            format!("{}.{}", prefix, def.name)
        };
        if self.by_name.contains_key(&name) {
            return Err(PathError::InvalidTemplate {
                template: def.path.clone(),
                reason: format!("route '{}' defined twice", name),
            });
        }
        let pattern = PathPattern::parse(&def.path)?;
        let index = self.nodes.len();
        self.nodes.push(RouteNode {
            name: name.clone(),
            local_name: def.name.clone(),
            pattern,
            parent,
            children: Vec::new(),
        });
        self.by_name.insert(name.clone(), index);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(index);
        }
        for child in &def.children {
            self.insert(child, Some(index), &name)?;
        }
        Ok(index)
    }

    /// Order siblings so static-leading templates are tried before
    /// param-leading ones, splats and empty templates last. Stable within a
    /// class, so definition order still breaks ties.
    fn sort_children(&mut self) {
        let keys: Vec<u8> = self
            .nodes
            .iter()
            .map(|n| n.pattern.specificity_class())
            .collect();
        let mut order: Vec<Vec<usize>> = self.nodes.iter().map(|n| n.children.clone()).collect();
        for children in &mut order {
            children.sort_by_key(|&c| keys[c]);
        }
        for (node, children) in self.nodes.iter_mut().zip(order) {
            node.children = children;
        }
        self.roots.sort_by_key(|&r| keys[r]);
    }

    /// The root path prefix, normalized without a trailing slash.
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn get(&self, name: &str) -> Option<NodeRef<'_>> {
        self.by_name.get(name).map(|&index| NodeRef { tree: self, index })
    }

    pub fn has(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of named routes in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every fully-qualified name, in definition order.
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.name.as_str()).collect()
    }

    pub(crate) fn root_nodes(&self) -> impl Iterator<Item = NodeRef<'_>> {
        self.roots.iter().map(move |&index| NodeRef { tree: self, index })
    }

    /// The chain of nodes from a root down to `name`, inclusive.
    pub fn chain(&self, name: &str) -> Option<Vec<NodeRef<'_>>> {
        let mut index = *self.by_name.get(name)?;
        let mut chain = vec![index];
        while let Some(parent) = self.nodes[index].parent {
            chain.push(parent);
            index = parent;
        }
        chain.reverse();
        Some(
            chain
                .into_iter()
                .map(|index| NodeRef { tree: self, index })
                .collect(),
        )
    }

    /// Reconstruct the sanitized definitions this tree was compiled from.
    pub fn definitions(&self) -> Vec<TreeDef> {
        self.roots.iter().map(|&r| self.def_of(r)).collect()
    }

    fn def_of(&self, index: usize) -> TreeDef {
        let node = &self.nodes[index];
        TreeDef {
            name: node.local_name.clone(),
            path: node.pattern.template().to_string(),
            children: node.children.iter().map(|&c| self.def_of(c)).collect(),
        }
    }
}
