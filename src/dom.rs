//! Document capability used by the drag behavior, plus an in-memory tree.
//!
//! [`Document`] is the seam between the behavior and whatever owns the real
//! nodes: a browser (see the `wasm/` crate) or [`MemoryDocument`], which
//! backs the CLI and the tests.

use crate::error::{DragError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PointerDown,
    PointerMove,
    PointerUp,
    Resize,
}

impl EventKind {
    /// DOM event type the browser host subscribes to.
    pub fn dom_name(self) -> &'static str {
        match self {
            Self::PointerDown => "mousedown",
            Self::PointerMove => "mousemove",
            Self::PointerUp => "mouseup",
            Self::Resize => "resize",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenTarget<N> {
    Node(N),
    Document,
    Window,
}

pub trait Document {
    type Node: Clone + PartialEq + fmt::Debug;
    /// Subscription handle; passing it back to [`Document::unlisten`] releases it.
    type Listener;

    fn body(&self) -> Self::Node;
    /// Lowercase local tag name.
    fn tag_name(&self, node: &Self::Node) -> String;
    /// Nearest `<svg>` ancestor, not counting the node itself.
    fn owner_svg(&self, node: &Self::Node) -> Option<Self::Node>;
    /// Elements under `root` matching `svg[attr], svg [attr]`, in document order.
    fn find_marked(&self, root: &Self::Node, attribute: &str) -> Result<Vec<Self::Node>>;
    fn attribute(&self, node: &Self::Node, name: &str) -> Option<String>;
    fn set_attribute(&mut self, node: &Self::Node, name: &str, value: &str) -> Result<()>;
    fn remove_attribute(&mut self, node: &Self::Node, name: &str) -> Result<()>;
    fn set_style_property(&mut self, node: &Self::Node, property: &str, value: &str)
    -> Result<()>;
    fn clone_node(&mut self, node: &Self::Node, deep: bool) -> Result<Self::Node>;
    fn append_child(&mut self, parent: &Self::Node, child: &Self::Node) -> Result<()>;
    /// Detaches the node from its parent. Detached nodes stay valid handles.
    fn remove_node(&mut self, node: &Self::Node) -> Result<()>;
    fn is_connected(&self, node: &Self::Node) -> bool;
    fn listen(
        &mut self,
        target: ListenTarget<Self::Node>,
        kind: EventKind,
    ) -> Result<Self::Listener>;
    fn unlisten(&mut self, listener: Self::Listener);

    fn is_svg(&self, node: &Self::Node) -> bool {
        self.tag_name(node) == "svg"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub target: ListenTarget<NodeId>,
    pub kind: EventKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed document tree: a root holding a single `<body>`.
///
/// Nodes are never freed; removing a node only detaches it, which matches
/// how the behavior treats proxies (handles stay usable after removal).
#[derive(Debug, Clone)]
pub struct MemoryDocument {
    nodes: Vec<NodeData>,
    root: NodeId,
    body: NodeId,
    listeners: BTreeMap<ListenerId, Subscription>,
    next_listener: u64,
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            root: NodeId(0),
            body: NodeId(0),
            listeners: BTreeMap::new(),
            next_listener: 1,
        };
        doc.root = doc.push(NodeKind::Root);
        doc.body = doc.create_element("body");
        doc.attach(doc.root, doc.body);
        doc
    }

    /// Builds a document whose body holds the given markup.
    pub fn from_markup(markup: &str) -> Result<Self> {
        let mut doc = Self::new();
        let body = doc.body;
        doc.load_markup(&body, markup)?;
        Ok(doc)
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeKind::Text(text.to_string()))
    }

    fn attach(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != node);
        }
    }

    /// Parses markup and appends its top-level nodes to `parent`.
    ///
    /// Returns the top-level elements that were appended.
    pub fn load_markup(&mut self, parent: &NodeId, markup: &str) -> Result<Vec<NodeId>> {
        let mut reader = Reader::from_str(markup);
        reader.config_mut().trim_text(true);
        let mut stack = vec![*parent];
        let mut top_level = Vec::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|err| DragError::Markup(err.to_string()))?;
            match event {
                Event::Start(start) => {
                    let node = self.element_from(&start)?;
                    let current = *stack.last().unwrap_or(parent);
                    self.attach(current, node);
                    if stack.len() == 1 {
                        top_level.push(node);
                    }
                    stack.push(node);
                }
                Event::Empty(start) => {
                    let node = self.element_from(&start)?;
                    let current = *stack.last().unwrap_or(parent);
                    self.attach(current, node);
                    if stack.len() == 1 {
                        top_level.push(node);
                    }
                }
                Event::End(_) => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                Event::Text(text) => {
                    let value = text
                        .unescape()
                        .map_err(|err| DragError::Markup(err.to_string()))?;
                    if !value.trim().is_empty() {
                        let node = self.create_text(&value);
                        let current = *stack.last().unwrap_or(parent);
                        self.attach(current, node);
                    }
                }
                Event::CData(data) => {
                    let value = String::from_utf8_lossy(&data.into_inner()).into_owned();
                    let node = self.create_text(&value);
                    let current = *stack.last().unwrap_or(parent);
                    self.attach(current, node);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if stack.len() > 1 {
            return Err(DragError::Markup("unclosed element at end of input".to_string()));
        }
        Ok(top_level)
    }

    fn element_from(&mut self, start: &BytesStart<'_>) -> Result<NodeId> {
        let tag = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|err| DragError::Markup(err.to_string()))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| DragError::Markup(err.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(self.push(NodeKind::Element { tag, attributes }))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    /// Child elements only, skipping text.
    pub fn element_children(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[node.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.is_element(*child))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.nodes[node.0].kind, NodeKind::Element { .. })
    }

    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { tag, .. } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn get_attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.nodes[node.0].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.get_attribute(node, name).is_some()
    }

    fn attributes_mut(&mut self, node: NodeId) -> Option<&mut Vec<(String, String)>> {
        match &mut self.nodes[node.0].kind {
            NodeKind::Element { attributes, .. } => Some(attributes),
            _ => None,
        }
    }

    pub fn put_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(attributes) = self.attributes_mut(node) else {
            return;
        };
        match attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => attributes.push((name.to_string(), value.to_string())),
        }
    }

    pub fn delete_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(attributes) = self.attributes_mut(node) {
            attributes.retain(|(key, _)| key != name);
        }
    }

    pub fn style_property(&self, node: NodeId, property: &str) -> Option<String> {
        let style = self.get_attribute(node, "style")?;
        parse_style(style)
            .into_iter()
            .find(|(key, _)| key == property)
            .map(|(_, value)| value)
    }

    pub fn put_style_property(&mut self, node: NodeId, property: &str, value: &str) {
        let mut declarations = self
            .get_attribute(node, "style")
            .map(parse_style)
            .unwrap_or_default();
        match declarations.iter_mut().find(|(key, _)| key == property) {
            Some(entry) => entry.1 = value.to_string(),
            None => declarations.push((property.to_string(), value.to_string())),
        }
        let style = format_style(&declarations);
        self.put_attribute(node, "style", &style);
    }

    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root)
            .into_iter()
            .find(|node| self.get_attribute(*node, "id") == Some(id))
    }

    /// Preorder descendants of `node`, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[node.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev().copied());
        }
        out
    }

    fn ancestor_svg(&self, node: NodeId) -> Option<NodeId> {
        let mut current = self.nodes[node.0].parent;
        while let Some(parent) = current {
            if self.tag(parent) == Some("svg") {
                return Some(parent);
            }
            current = self.nodes[parent.0].parent;
        }
        None
    }

    fn copy_node(&mut self, node: NodeId, deep: bool) -> NodeId {
        let kind = self.nodes[node.0].kind.clone();
        let copy = self.push(kind);
        if deep {
            let children = self.nodes[node.0].children.clone();
            for child in children {
                let child_copy = self.copy_node(child, true);
                self.attach(copy, child_copy);
            }
        }
        copy
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners.len()
    }

    pub fn subscriptions(&self) -> impl Iterator<Item = &Subscription> {
        self.listeners.values()
    }

    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        if let NodeKind::Text(text) = &self.nodes[node.0].kind {
            out.push_str(text);
        }
        for descendant in self.descendants(node) {
            if let NodeKind::Text(text) = &self.nodes[descendant.0].kind {
                out.push_str(text);
            }
        }
        out
    }

    /// Serializes a node and its subtree.
    pub fn to_markup(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_markup(node, &mut out);
        out
    }

    fn write_markup(&self, node: NodeId, out: &mut String) {
        let data = &self.nodes[node.0];
        match &data.kind {
            NodeKind::Root => {
                for child in &data.children {
                    self.write_markup(*child, out);
                }
            }
            NodeKind::Text(text) => out.push_str(&escape_xml(text)),
            NodeKind::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (key, value) in attributes {
                    out.push_str(&format!(" {}=\"{}\"", key, escape_xml(value)));
                }
                if data.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &data.children {
                    self.write_markup(*child, out);
                }
                out.push_str(&format!("</{tag}>"));
            }
        }
    }
}

impl Document for MemoryDocument {
    type Node = NodeId;
    type Listener = ListenerId;

    fn body(&self) -> NodeId {
        self.body
    }

    fn tag_name(&self, node: &NodeId) -> String {
        self.tag(*node).unwrap_or_default().to_ascii_lowercase()
    }

    fn owner_svg(&self, node: &NodeId) -> Option<NodeId> {
        self.ancestor_svg(*node)
    }

    fn find_marked(&self, root: &NodeId, attribute: &str) -> Result<Vec<NodeId>> {
        let mut matches = Vec::new();
        let root_in_svg = self.tag(*root) == Some("svg") || self.ancestor_svg(*root).is_some();
        if self.is_element(*root) && self.has_attribute(*root, attribute) && root_in_svg {
            matches.push(*root);
        }
        // (node, inside an <svg> ancestor)
        let mut stack: Vec<(NodeId, bool)> = self.nodes[root.0]
            .children
            .iter()
            .rev()
            .map(|child| (*child, root_in_svg))
            .collect();
        while let Some((node, in_svg)) = stack.pop() {
            if !self.is_element(node) {
                continue;
            }
            let is_svg = self.tag(node) == Some("svg");
            if self.has_attribute(node, attribute) && (is_svg || in_svg) {
                matches.push(node);
            }
            let child_in_svg = in_svg || is_svg;
            stack.extend(
                self.nodes[node.0]
                    .children
                    .iter()
                    .rev()
                    .map(|child| (*child, child_in_svg)),
            );
        }
        Ok(matches)
    }

    fn attribute(&self, node: &NodeId, name: &str) -> Option<String> {
        self.get_attribute(*node, name).map(str::to_string)
    }

    fn set_attribute(&mut self, node: &NodeId, name: &str, value: &str) -> Result<()> {
        self.put_attribute(*node, name, value);
        Ok(())
    }

    fn remove_attribute(&mut self, node: &NodeId, name: &str) -> Result<()> {
        self.delete_attribute(*node, name);
        Ok(())
    }

    fn set_style_property(&mut self, node: &NodeId, property: &str, value: &str) -> Result<()> {
        self.put_style_property(*node, property, value);
        Ok(())
    }

    fn clone_node(&mut self, node: &NodeId, deep: bool) -> Result<NodeId> {
        Ok(self.copy_node(*node, deep))
    }

    fn append_child(&mut self, parent: &NodeId, child: &NodeId) -> Result<()> {
        self.attach(*parent, *child);
        Ok(())
    }

    fn remove_node(&mut self, node: &NodeId) -> Result<()> {
        self.detach(*node);
        Ok(())
    }

    fn is_connected(&self, node: &NodeId) -> bool {
        let mut current = *node;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes[current.0].parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    fn listen(&mut self, target: ListenTarget<NodeId>, kind: EventKind) -> Result<ListenerId> {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.insert(id, Subscription { target, kind });
        Ok(id)
    }

    fn unlisten(&mut self, listener: ListenerId) {
        self.listeners.remove(&listener);
    }
}

fn parse_style(style: &str) -> Vec<(String, String)> {
    style
        .split(';')
        .filter_map(|declaration| {
            let (key, value) = declaration.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn format_style(declarations: &[(String, String)]) -> String {
    declarations
        .iter()
        .map(|(key, value)| format!("{key}: {value};"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn escape_xml(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
