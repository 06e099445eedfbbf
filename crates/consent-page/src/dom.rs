//! Minimal element tree
//!
//! Only what script gating needs: elements with ordered attributes and text,
//! parent/child links, and connectedness. Nodes are never freed; a removed
//! node is simply detached, like a DOM node still referenced from script.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PageError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Script types a browser will execute
pub fn is_executable_script_type(script_type: Option<&str>) -> bool {
    match script_type.map(|t| t.trim().to_ascii_lowercase()) {
        None => true,
        Some(t) => matches!(
            t.as_str(),
            "" | "module"
                | "text/javascript"
                | "application/javascript"
                | "text/ecmascript"
                | "application/ecmascript"
                | "application/x-javascript"
                | "text/jscript"
        ),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Script "already started" flag: a script element runs at most once
    pub started: bool,
}

impl Element {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attributes: Vec::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            started: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    pub fn is_script(&self) -> bool {
        self.tag == "script"
    }

    /// A script that would execute when connected
    pub fn is_live_script(&self) -> bool {
        self.is_script() && is_executable_script_type(self.attribute("type"))
    }
}

pub struct Dom {
    nodes: Vec<Element>,
    root: NodeId,
    head: NodeId,
    body: Option<NodeId>,
}

impl Dom {
    /// Document with `<html>` and `<head>`; `<body>` is added by [`Dom::ensure_body`]
    pub fn new() -> Self {
        let mut dom = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            head: NodeId(0),
            body: None,
        };

        let root = dom.create_element("html");
        let head = dom.create_element("head");
        dom.attach(root, head, None);
        dom.root = root;
        dom.head = head;
        dom
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    pub fn body(&self) -> Option<NodeId> {
        self.body
    }

    pub fn ensure_body(&mut self) -> NodeId {
        if let Some(body) = self.body {
            return body;
        }

        let body = self.create_element("body");
        self.attach(self.root, body, None);
        self.body = Some(body);
        body
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.nodes.push(Element::new(tag));
        NodeId(self.nodes.len() - 1)
    }

    pub fn get(&self, id: NodeId) -> Result<&Element> {
        self.nodes.get(id.0).ok_or(PageError::NodeNotFound(id))
    }

    fn get_mut(&mut self, id: NodeId) -> Result<&mut Element> {
        self.nodes.get_mut(id.0).ok_or(PageError::NodeNotFound(id))
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let element = self.get_mut(id)?;
        match element
            .attributes
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value.to_string(),
            None => element
                .attributes
                .push((name.to_ascii_lowercase(), value.to_string())),
        }
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<()> {
        self.get_mut(id)?
            .attributes
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        Ok(())
    }

    pub fn set_text(&mut self, id: NodeId, text: &str) -> Result<()> {
        self.get_mut(id)?.text = text.to_string();
        Ok(())
    }

    pub fn mark_started(&mut self, id: NodeId) -> Result<()> {
        self.get_mut(id)?.started = true;
        Ok(())
    }

    /// Insert `node` under `parent`, before `reference` or at the end.
    /// Moves the node if it is already attached elsewhere.
    pub fn insert(
        &mut self,
        parent: NodeId,
        node: NodeId,
        reference: Option<NodeId>,
    ) -> Result<NodeId> {
        self.get(parent)?;
        self.get(node)?;

        if node == self.root || self.is_inclusive_ancestor(node, parent) {
            return Err(PageError::HierarchyRequest { parent, node });
        }

        if let Some(reference) = reference {
            if self.get(reference)?.parent != Some(parent) {
                return Err(PageError::NotAChild { parent, reference });
            }
        }

        self.detach(node)?;
        self.attach(parent, node, reference);
        Ok(node)
    }

    fn attach(&mut self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        let children = &mut self.nodes[parent.0].children;
        let index = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        children.insert(index, node);
        self.nodes[node.0].parent = Some(parent);
    }

    /// Detach a node from its parent; a no-op for detached nodes
    pub fn detach(&mut self, node: NodeId) -> Result<()> {
        if let Some(parent) = self.get(node)?.parent {
            self.nodes[parent.0].children.retain(|c| *c != node);
            self.nodes[node.0].parent = None;
        }
        Ok(())
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, mut node: NodeId) -> bool {
        loop {
            if node == ancestor {
                return true;
            }
            match self.nodes[node.0].parent {
                Some(parent) => node = parent,
                None => return false,
            }
        }
    }

    /// Whether the node is part of the document tree
    pub fn is_connected(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some() && self.is_inclusive_ancestor(self.root, node)
    }

    /// Node and all its descendants in tree order
    pub fn subtree(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(element) = self.nodes.get(current.0) else {
                continue;
            };
            out.push(current);
            stack.extend(element.children.iter().rev().copied());
        }
        out
    }

    /// Connected elements matching `predicate`, in document order
    pub fn find<F>(&self, predicate: F) -> Vec<NodeId>
    where
        F: Fn(&Element) -> bool,
    {
        self.subtree(self.root)
            .into_iter()
            .filter(|id| predicate(&self.nodes[id.0]))
            .collect()
    }
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}
