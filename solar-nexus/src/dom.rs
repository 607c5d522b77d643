//! In-memory host document.
//!
//! Elements live in an arena keyed by [`ElementId`]. The [`Document`] handle
//! is cheap to clone; all clones see the same tree. Locks are held only for
//! the duration of a single call, never across an await.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(u64);

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attributes: BTreeMap<String, String>,
    text: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Tree {
    nodes: HashMap<ElementId, Node>,
    body: ElementId,
    next_id: u64,
    title: String,
    meta: BTreeMap<String, String>,
    scroll_y: u32,
}

impl Tree {
    fn alloc(&mut self, tag: &str) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(tag));
        id
    }

    fn detach(&mut self, id: ElementId) {
        let parent = self.nodes.get_mut(&id).and_then(|node| node.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != id);
        }
    }

    fn drop_subtree(&mut self, id: ElementId) {
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children);
            }
        }
    }

    /// Depth-first, document order.
    fn descendants(&self, root: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Whether `ancestor` is `id` or lies on its parent chain.
    fn is_ancestor(&self, ancestor: ElementId, id: ElementId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.nodes.get(&current).and_then(|node| node.parent);
        }
        false
    }
}

/// Shared handle to the host document.
#[derive(Clone)]
pub struct Document {
    inner: Arc<RwLock<Tree>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tree = self.read();
        f.debug_struct("Document")
            .field("title", &tree.title)
            .field("elements", &tree.nodes.len())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document containing only `<body>`.
    pub fn new() -> Self {
        let mut tree = Tree {
            nodes: HashMap::new(),
            body: ElementId(0),
            next_id: 0,
            title: String::new(),
            meta: BTreeMap::new(),
            scroll_y: 0,
        };
        tree.body = tree.alloc("body");
        Self {
            inner: Arc::new(RwLock::new(tree)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Tree> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tree> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn body(&self) -> ElementId {
        self.read().body
    }

    /// Wrap `id` in an [`Element`] handle.
    pub fn element(&self, id: ElementId) -> Element {
        Element {
            id,
            document: self.clone(),
        }
    }

    /// Create a detached element.
    pub fn create_element(&self, tag: &str) -> ElementId {
        self.write().alloc(tag)
    }

    /// Move `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&self, parent: ElementId, child: ElementId) -> bool {
        let mut tree = self.write();
        if !tree.nodes.contains_key(&parent) || !tree.nodes.contains_key(&child) {
            return false;
        }
        // An element cannot move under itself or its own descendants.
        if tree.is_ancestor(child, parent) {
            return false;
        }
        tree.detach(child);
        if let Some(node) = tree.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
        if let Some(node) = tree.nodes.get_mut(&parent) {
            node.children.push(child);
        }
        true
    }

    /// Remove `id` and its subtree from the document.
    pub fn remove(&self, id: ElementId) {
        let mut tree = self.write();
        if id == tree.body {
            return;
        }
        tree.detach(id);
        tree.drop_subtree(id);
    }

    /// Remove every child of `id`.
    pub fn clear_children(&self, id: ElementId) {
        let mut tree = self.write();
        let children = match tree.nodes.get_mut(&id) {
            Some(node) => std::mem::take(&mut node.children),
            None => return,
        };
        for child in children {
            tree.drop_subtree(child);
        }
    }

    pub fn exists(&self, id: ElementId) -> bool {
        self.read().nodes.contains_key(&id)
    }

    pub fn tag(&self, id: ElementId) -> Option<String> {
        self.read().nodes.get(&id).map(|node| node.tag.clone())
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.read().nodes.get(&id).and_then(|node| node.parent)
    }

    pub fn children(&self, id: ElementId) -> Vec<ElementId> {
        self.read()
            .nodes
            .get(&id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Whether `id` is `ancestor` or lies beneath it.
    pub fn contains(&self, ancestor: ElementId, id: ElementId) -> bool {
        self.read().is_ancestor(ancestor, id)
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<String> {
        self.read()
            .nodes
            .get(&id)
            .and_then(|node| node.attributes.get(name).cloned())
    }

    pub fn has_attribute(&self, id: ElementId, name: &str) -> bool {
        self.read()
            .nodes
            .get(&id)
            .is_some_and(|node| node.attributes.contains_key(name))
    }

    pub fn set_attribute(&self, id: ElementId, name: &str, value: impl Into<String>) {
        if let Some(node) = self.write().nodes.get_mut(&id) {
            node.attributes.insert(name.to_string(), value.into());
        }
    }

    pub fn remove_attribute(&self, id: ElementId, name: &str) {
        if let Some(node) = self.write().nodes.get_mut(&id) {
            node.attributes.remove(name);
        }
    }

    pub fn text(&self, id: ElementId) -> String {
        self.read()
            .nodes
            .get(&id)
            .map(|node| node.text.clone())
            .unwrap_or_default()
    }

    pub fn set_text(&self, id: ElementId, text: impl Into<String>) {
        if let Some(node) = self.write().nodes.get_mut(&id) {
            node.text = text.into();
        }
    }

    /// Concatenated text of `id` and its descendants, one line per element
    /// that carries text.
    pub fn text_content(&self, id: ElementId) -> String {
        let tree = self.read();
        tree.descendants(id)
            .into_iter()
            .filter_map(|el| tree.nodes.get(&el))
            .filter(|node| !node.text.is_empty())
            .map(|node| node.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every attached element carrying `name`, in document order.
    pub fn query_attribute(&self, name: &str) -> Vec<ElementId> {
        let body = self.body();
        self.query_attribute_within(body, name)
    }

    /// Elements under `root` (inclusive) carrying `name`, in document order.
    pub fn query_attribute_within(&self, root: ElementId, name: &str) -> Vec<ElementId> {
        let tree = self.read();
        tree.descendants(root)
            .into_iter()
            .filter(|id| {
                tree.nodes
                    .get(id)
                    .is_some_and(|node| node.attributes.contains_key(name))
            })
            .collect()
    }

    /// First element whose `id` attribute equals `dom_id`.
    pub fn find_by_id(&self, dom_id: &str) -> Option<ElementId> {
        let tree = self.read();
        tree.descendants(tree.body).into_iter().find(|id| {
            tree.nodes
                .get(id)
                .and_then(|node| node.attributes.get("id"))
                .is_some_and(|value| value == dom_id)
        })
    }

    pub fn title(&self) -> String {
        self.read().title.clone()
    }

    pub fn set_title(&self, title: impl Into<String>) {
        self.write().title = title.into();
    }

    /// Content of the `<meta>` tag keyed by `name` (or `property` for Open Graph).
    pub fn meta(&self, name: &str) -> Option<String> {
        self.read().meta.get(name).cloned()
    }

    pub fn set_meta(&self, name: &str, content: impl Into<String>) {
        self.write().meta.insert(name.to_string(), content.into());
    }

    pub fn remove_meta(&self, name: &str) {
        self.write().meta.remove(name);
    }

    pub fn scroll_y(&self) -> u32 {
        self.read().scroll_y
    }

    pub fn scroll_to(&self, y: u32) {
        self.write().scroll_y = y;
    }
}

/// An element paired with its document.
#[derive(Clone, Debug)]
pub struct Element {
    id: ElementId,
    document: Document,
}

impl Element {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.document.attribute(self.id, name)
    }

    pub fn set_attribute(&self, name: &str, value: impl Into<String>) {
        self.document.set_attribute(self.id, name, value);
    }

    pub fn set_text(&self, text: impl Into<String>) {
        self.document.set_text(self.id, text);
    }

    /// Create a child element with the given tag and text.
    pub fn append(&self, tag: &str, text: impl Into<String>) -> Element {
        let child = self.document.create_element(tag);
        self.document.set_text(child, text);
        self.document.append_child(self.id, child);
        self.document.element(child)
    }

    pub fn clear(&self) {
        self.document.clear_children(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_returns_document_order() {
        let doc = Document::new();
        let body = doc.body();
        let nav = doc.create_element("nav");
        let main = doc.create_element("main");
        let inner = doc.create_element("div");
        doc.append_child(body, nav);
        doc.append_child(body, main);
        doc.append_child(main, inner);
        doc.set_attribute(inner, "data-component", "hero");
        doc.set_attribute(nav, "data-component", "nav");
        doc.set_attribute(main, "data-component", "page");

        assert_eq!(doc.query_attribute("data-component"), vec![nav, main, inner]);
        assert_eq!(doc.query_attribute_within(main, "data-component"), vec![main, inner]);
    }

    #[test]
    fn appending_an_ancestor_under_its_descendant_is_refused() {
        let doc = Document::new();
        let body = doc.body();
        let outer = doc.element(body).append("section", "");
        let inner = outer.append("div", "");
        let leaf = inner.append("p", "quote");

        assert!(!doc.append_child(leaf.id(), outer.id()));
        assert!(!doc.append_child(inner.id(), inner.id()));
        assert!(!doc.append_child(leaf.id(), body));
        assert_eq!(doc.parent(outer.id()), Some(body));
        assert!(doc.contains(body, leaf.id()));
        assert_eq!(doc.text_content(outer.id()), "quote");

        // moving a descendant up is still allowed
        assert!(doc.append_child(body, leaf.id()));
        assert!(!doc.contains(outer.id(), leaf.id()));
    }

    #[test]
    fn detached_elements_are_not_queried() {
        let doc = Document::new();
        let loose = doc.create_element("div");
        doc.set_attribute(loose, "data-component", "hero");
        assert!(doc.query_attribute("data-component").is_empty());
    }

    #[test]
    fn clear_children_drops_subtree() {
        let doc = Document::new();
        let body = doc.body();
        let app = doc.element(body).append("div", "");
        let child = app.append("p", "hello");
        let grandchild = child.append("span", "world");

        assert_eq!(doc.text_content(app.id()), "hello\nworld");
        app.clear();
        assert!(doc.children(app.id()).is_empty());
        assert!(!doc.exists(child.id()));
        assert!(!doc.exists(grandchild.id()));
    }

    #[test]
    fn append_moves_between_parents() {
        let doc = Document::new();
        let a = doc.element(doc.body()).append("div", "a");
        let b = doc.element(doc.body()).append("div", "b");
        let item = a.append("span", "item");

        assert!(doc.append_child(b.id(), item.id()));
        assert!(doc.children(a.id()).is_empty());
        assert_eq!(doc.parent(item.id()), Some(b.id()));
        assert!(doc.contains(b.id(), item.id()));
        assert!(!doc.contains(a.id(), item.id()));
    }

    #[test]
    fn body_cannot_be_removed() {
        let doc = Document::new();
        doc.remove(doc.body());
        assert!(doc.exists(doc.body()));
    }

    #[test]
    fn find_by_id_and_meta() {
        let doc = Document::new();
        let app = doc.element(doc.body()).append("div", "");
        app.set_attribute("id", "app");
        assert_eq!(doc.find_by_id("app"), Some(app.id()));

        doc.set_meta("csrf-token", "abc");
        assert_eq!(doc.meta("csrf-token").as_deref(), Some("abc"));
        doc.remove_meta("csrf-token");
        assert_eq!(doc.meta("csrf-token"), None);
    }
}
