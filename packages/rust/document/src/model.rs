//! Arena-backed document tree.
//!
//! Pages and structure nodes live in two arenas addressed by [`PageId`] and
//! [`NodeId`]. A node lists the pages it covers (`logical_physical`), and each
//! page lists the nodes pointing at it, so both directions are a lookup away
//! without shared ownership.

use std::path::Path;

use serde::{Deserialize, Serialize};

use folioscan_shared::{FolioError, Result};

/// Handle of a structure node in a [`DocumentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Handle of a physical page in a [`DocumentTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

/// A name/value pair carried through untouched (title, identifiers, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub value: String,
}

/// A logical structural unit (chapter, cover, endsheet, ...).
#[derive(Debug, Clone)]
pub struct StructureNode {
    /// Structural type name, as resolved against the schema.
    pub type_name: String,
    /// Anchor nodes group several volumes; the work itself is their first child.
    pub anchor: bool,
    /// Pass-through metadata.
    pub metadata: Vec<Metadata>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pages: Vec<PageId>,
}

impl StructureNode {
    fn new(type_name: impl Into<String>, anchor: bool) -> Self {
        Self {
            type_name: type_name.into(),
            anchor,
            metadata: Vec::new(),
            parent: None,
            children: Vec::new(),
            pages: Vec::new(),
        }
    }

    /// Parent node, if attached.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Referenced pages, in the order the references were added.
    pub fn pages(&self) -> &[PageId] {
        &self.pages
    }
}

/// One scanned page.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based position in the physical sequence, once assigned.
    pub physical_number: Option<u32>,
    /// Pagination text or `uncounted`.
    pub logical_label: String,
    /// Location of the image file (`file://` URL).
    pub content_file: String,
    referenced_by: Vec<NodeId>,
}

impl Page {
    /// Nodes that reference this page.
    pub fn referenced_by(&self) -> &[NodeId] {
        &self.referenced_by
    }
}

/// Counts returned by [`DocumentTree::clear_structure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearedStructure {
    pub pages: usize,
    pub logical_children: usize,
}

/// Physical page sequence plus logical structure tree of one work.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<StructureNode>,
    pages: Vec<Page>,
    top: NodeId,
    physical_type: String,
    physical: Vec<PageId>,
}

impl DocumentTree {
    /// Create an empty document whose logical top node is the work itself.
    pub fn new(logical_type: impl Into<String>, physical_type: impl Into<String>) -> Self {
        Self {
            nodes: vec![StructureNode::new(logical_type, false)],
            pages: Vec::new(),
            top: NodeId(0),
            physical_type: physical_type.into(),
            physical: Vec::new(),
        }
    }

    /// Create an empty document for a volume held by an anchor (e.g. one
    /// volume of a periodical).
    pub fn with_anchor(
        anchor_type: impl Into<String>,
        logical_type: impl Into<String>,
        physical_type: impl Into<String>,
    ) -> Self {
        let mut tree = Self {
            nodes: vec![StructureNode::new(anchor_type, true)],
            pages: Vec::new(),
            top: NodeId(0),
            physical_type: physical_type.into(),
            physical: Vec::new(),
        };
        let volume = tree.add_node(logical_type);
        tree.nodes[0].children.push(volume);
        tree.nodes[volume.0 as usize].parent = Some(tree.top);
        tree
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// The topmost logical node (an anchor, or the work itself).
    pub fn top(&self) -> NodeId {
        self.top
    }

    /// The node representing the work: the first child of an anchor, or the
    /// top node.
    pub fn logical_root(&self) -> NodeId {
        let top = self.node(self.top);
        match top.children.first() {
            Some(first) if top.anchor => *first,
            _ => self.top,
        }
    }

    /// Structural type of the physical root.
    pub fn physical_type(&self) -> &str {
        &self.physical_type
    }

    pub fn node(&self, id: NodeId) -> &StructureNode {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut StructureNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn page(&self, id: PageId) -> &Page {
        &self.pages[id.0 as usize]
    }

    pub fn page_mut(&mut self, id: PageId) -> &mut Page {
        &mut self.pages[id.0 as usize]
    }

    /// Pages in physical order.
    pub fn physical_pages(&self) -> &[PageId] {
        &self.physical
    }

    pub fn page_count(&self) -> usize {
        self.physical.len()
    }

    pub fn has_pages(&self) -> bool {
        !self.physical.is_empty()
    }

    /// All nodes reachable from `from`, preorder, `from` included.
    pub fn descendants(&self, from: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    // -----------------------------------------------------------------------
    // Mutators
    // -----------------------------------------------------------------------

    /// Create a detached structure node.
    pub fn add_node(&mut self, type_name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(StructureNode::new(type_name, false));
        id
    }

    /// Append `child` to `parent`'s children.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if parent == child {
            return Err(FolioError::validation("a node cannot be its own child"));
        }
        if let Some(current) = self.node(child).parent {
            return Err(FolioError::validation(format!(
                "node {} is already a child of node {}",
                child.0, current.0
            )));
        }
        self.nodes[parent.0 as usize].children.push(child);
        self.nodes[child.0 as usize].parent = Some(parent);
        Ok(())
    }

    /// Remove `child` from `parent`. Returns false when it was not a child.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let children = &mut self.nodes[parent.0 as usize].children;
        let before = children.len();
        children.retain(|c| *c != child);
        if children.len() == before {
            return false;
        }
        self.nodes[child.0 as usize].parent = None;
        true
    }

    /// Append a page to the physical sequence.
    pub fn add_page(&mut self, content_file: impl Into<String>) -> PageId {
        let id = PageId(self.pages.len() as u32);
        self.pages.push(Page {
            physical_number: None,
            logical_label: String::new(),
            content_file: content_file.into(),
            referenced_by: Vec::new(),
        });
        self.physical.push(id);
        id
    }

    /// Add a `logical_physical` reference from `node` to `page`.
    pub fn add_reference(&mut self, node: NodeId, page: PageId) {
        self.nodes[node.0 as usize].pages.push(page);
        let back = &mut self.pages[page.0 as usize].referenced_by;
        if !back.contains(&node) {
            back.push(node);
        }
    }

    /// Drop every reference from `node` to `page`.
    pub fn remove_reference(&mut self, node: NodeId, page: PageId) {
        self.nodes[node.0 as usize].pages.retain(|p| *p != page);
        self.pages[page.0 as usize].referenced_by.retain(|n| *n != node);
    }

    /// Remove every page and every child of the logical root, detaching all
    /// references first. Nodes above the logical root and their other
    /// children are kept.
    pub fn clear_structure(&mut self) -> ClearedStructure {
        let cleared_pages = self.physical.len();
        for page in std::mem::take(&mut self.physical) {
            let sources = self.pages[page.0 as usize].referenced_by.clone();
            for node in sources {
                self.remove_reference(node, page);
            }
        }
        self.pages.clear();

        let root = self.logical_root();
        let children = std::mem::take(&mut self.nodes[root.0 as usize].children);
        for child in &children {
            self.nodes[child.0 as usize].parent = None;
        }

        self.compact();

        ClearedStructure {
            pages: cleared_pages,
            logical_children: children.len(),
        }
    }

    /// Drop nodes unreachable from the top node. Only valid while no pages
    /// exist, since page back-references are not remapped.
    fn compact(&mut self) {
        debug_assert!(self.pages.is_empty());
        let keep = self.descendants(self.top);
        let mut remap = vec![None; self.nodes.len()];
        for (new, old) in keep.iter().enumerate() {
            remap[old.0 as usize] = Some(NodeId(new as u32));
        }
        let old_nodes = std::mem::take(&mut self.nodes);
        let mut slots: Vec<Option<StructureNode>> = old_nodes.into_iter().map(Some).collect();
        for old in &keep {
            if let Some(mut node) = slots[old.0 as usize].take() {
                node.parent = node.parent.and_then(|p| remap[p.0 as usize]);
                node.children = node
                    .children
                    .iter()
                    .filter_map(|c| remap[c.0 as usize])
                    .collect();
                node.pages.clear();
                self.nodes.push(node);
            }
        }
        self.top = NodeId(0);
    }

    /// Physical numbers of all pages in physical order.
    pub fn physical_numbers(&self) -> Vec<Option<u32>> {
        self.physical
            .iter()
            .map(|p| self.page(*p).physical_number)
            .collect()
    }

    /// Build the `file://` location of an image inside `folder`.
    pub fn content_location(folder: &Path, filename: &str) -> String {
        let path = folder.join(filename);
        match url::Url::from_file_path(&path) {
            Ok(url) => url.to_string(),
            Err(()) => format!("file://{}", path.display()),
        }
    }

    pub(crate) fn from_parts(
        nodes: Vec<StructureNode>,
        pages: Vec<Page>,
        top: NodeId,
        physical_type: String,
    ) -> Self {
        let physical = (0..pages.len() as u32).map(PageId).collect();
        Self {
            nodes,
            pages,
            top,
            physical_type,
            physical,
        }
    }

    pub(crate) fn raw_node(type_name: String, anchor: bool, metadata: Vec<Metadata>) -> StructureNode {
        let mut node = StructureNode::new(type_name, anchor);
        node.metadata = metadata;
        node
    }

    pub(crate) fn raw_page(physical_number: Option<u32>, logical_label: String, content_file: String) -> Page {
        Page {
            physical_number,
            logical_label,
            content_file,
            referenced_by: Vec::new(),
        }
    }
}
