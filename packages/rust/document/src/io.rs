//! JSON persistence of the document structure file.
//!
//! The file nests the logical tree and lists physical pages flat; logical
//! nodes point at pages by their index in that list. Only nodes reachable
//! from the top node are written.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use folioscan_shared::{FolioError, Result};

use crate::model::{DocumentTree, Metadata, NodeId, PageId, StructureNode};

/// Current version of the structure file format.
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// On-disk form of a [`DocumentTree`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentFile {
    pub format_version: u32,
    pub logical: LogicalEntry,
    pub physical: PhysicalEntry,
}

/// A logical node and its subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub anchor: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metadata: Vec<Metadata>,
    /// Indices into [`PhysicalEntry::pages`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pages: Vec<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<LogicalEntry>,
}

/// The physical root and its pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhysicalEntry {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub pages: Vec<PageEntry>,
}

/// One physical page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_number: Option<u32>,
    pub logical_label: String,
    pub file: String,
}

impl DocumentFile {
    /// Snapshot a tree into its on-disk form.
    pub fn from_tree(tree: &DocumentTree) -> Self {
        let position: std::collections::HashMap<PageId, usize> = tree
            .physical_pages()
            .iter()
            .enumerate()
            .map(|(i, p)| (*p, i))
            .collect();

        let pages = tree
            .physical_pages()
            .iter()
            .map(|id| {
                let page = tree.page(*id);
                PageEntry {
                    physical_number: page.physical_number,
                    logical_label: page.logical_label.clone(),
                    file: page.content_file.clone(),
                }
            })
            .collect();

        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            logical: logical_entry(tree, tree.top(), &position),
            physical: PhysicalEntry {
                type_name: tree.physical_type().to_string(),
                pages,
            },
        }
    }

    /// Rebuild the arena form, checking page indices and anchor shape.
    pub fn into_tree(self) -> Result<DocumentTree> {
        if self.format_version != DOCUMENT_FORMAT_VERSION {
            return Err(FolioError::document_read(format!(
                "unsupported format_version: {} (expected {DOCUMENT_FORMAT_VERSION})",
                self.format_version
            )));
        }
        if self.logical.anchor && self.logical.children.is_empty() {
            return Err(FolioError::document_read(format!(
                "anchor '{}' has no child volume",
                self.logical.type_name
            )));
        }

        let page_total = self.physical.pages.len();
        let pages = self
            .physical
            .pages
            .into_iter()
            .map(|p| DocumentTree::raw_page(p.physical_number, p.logical_label, p.file))
            .collect();

        let mut nodes: Vec<StructureNode> = Vec::new();
        let mut links: Vec<(NodeId, Vec<usize>)> = Vec::new();
        let mut children: Vec<(NodeId, NodeId)> = Vec::new();
        flatten(self.logical, None, &mut nodes, &mut links, &mut children);

        let mut tree = DocumentTree::from_parts(nodes, pages, NodeId(0), self.physical.type_name);
        for (parent, child) in children {
            tree.add_child(parent, child)
                .map_err(|e| FolioError::document_read(e.to_string()))?;
        }
        for (node, indices) in links {
            for index in indices {
                if index >= page_total {
                    return Err(FolioError::document_read(format!(
                        "page reference {index} out of range ({page_total} pages)"
                    )));
                }
                tree.add_reference(node, PageId(index as u32));
            }
        }
        Ok(tree)
    }
}

fn logical_entry(
    tree: &DocumentTree,
    id: NodeId,
    position: &std::collections::HashMap<PageId, usize>,
) -> LogicalEntry {
    let node = tree.node(id);
    LogicalEntry {
        type_name: node.type_name.clone(),
        anchor: node.anchor,
        metadata: node.metadata.clone(),
        pages: node
            .pages()
            .iter()
            .filter_map(|p| position.get(p).copied())
            .collect(),
        children: node
            .children()
            .iter()
            .map(|c| logical_entry(tree, *c, position))
            .collect(),
    }
}

fn flatten(
    entry: LogicalEntry,
    parent: Option<NodeId>,
    nodes: &mut Vec<StructureNode>,
    links: &mut Vec<(NodeId, Vec<usize>)>,
    children: &mut Vec<(NodeId, NodeId)>,
) {
    let id = NodeId(nodes.len() as u32);
    nodes.push(DocumentTree::raw_node(
        entry.type_name,
        entry.anchor,
        entry.metadata,
    ));
    if let Some(parent) = parent {
        children.push((parent, id));
    }
    if !entry.pages.is_empty() {
        links.push((id, entry.pages));
    }
    for child in entry.children {
        flatten(child, Some(id), nodes, links, children);
    }
}

/// Read a document structure file.
pub fn load_document(path: &Path) -> Result<DocumentTree> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FolioError::document_read(format!("{}: {e}", path.display())))?;
    let file: DocumentFile = serde_json::from_str(&content)
        .map_err(|e| FolioError::document_read(format!("{}: {e}", path.display())))?;
    let tree = file.into_tree()?;
    debug!(path = %path.display(), pages = tree.page_count(), "loaded document");
    Ok(tree)
}

/// Write a document structure file. The content goes to a sibling temp file
/// first and is renamed into place.
pub fn save_document(path: &Path, tree: &DocumentTree) -> Result<()> {
    let json = serde_json::to_string_pretty(&DocumentFile::from_tree(tree))
        .map_err(|e| FolioError::document_write(format!("JSON serialization failed: {e}")))?;

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)
        .map_err(|e| FolioError::document_write(format!("{}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| FolioError::document_write(format!("{}: {e}", path.display())))?;

    debug!(path = %path.display(), pages = tree.page_count(), "wrote document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fs-document-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sample_tree() -> DocumentTree {
        let mut tree = DocumentTree::with_anchor("Periodical", "PeriodicalVolume", "BoundBook");
        let root = tree.logical_root();
        tree.node_mut(root).metadata.push(Metadata {
            name: "TitleDocMain".into(),
            value: "Jahrgang 1901".into(),
        });
        let title = tree.add_node("TitlePage");
        tree.add_child(root, title).unwrap();

        let p1 = tree.add_page("file:///w/images/b_0001.tif");
        let p2 = tree.add_page("file:///w/images/b_titlepage.tif");
        tree.page_mut(p1).logical_label = "0001".into();
        tree.page_mut(p1).physical_number = Some(1);
        tree.page_mut(p2).logical_label = "uncounted".into();
        tree.page_mut(p2).physical_number = Some(2);
        tree.add_reference(root, p1);
        tree.add_reference(title, p2);
        tree
    }

    #[test]
    fn save_and_load_preserve_structure() {
        let dir = temp_dir();
        let path = dir.join("structure.json");
        let tree = sample_tree();

        save_document(&path, &tree).expect("save");
        let loaded = load_document(&path).expect("load");

        assert_eq!(loaded.page_count(), 2);
        let root = loaded.logical_root();
        assert_eq!(loaded.node(root).type_name, "PeriodicalVolume");
        assert_eq!(loaded.node(root).metadata[0].value, "Jahrgang 1901");
        let title = loaded.node(root).children()[0];
        assert_eq!(loaded.node(title).type_name, "TitlePage");
        let page = loaded.node(title).pages()[0];
        assert_eq!(loaded.page(page).logical_label, "uncounted");
        assert_eq!(loaded.page(page).referenced_by(), &[title]);
        assert!(!dir.join("structure.json.tmp").exists());
    }

    #[test]
    fn unreachable_nodes_are_not_written() {
        let mut tree = sample_tree();
        let orphan = tree.add_node("Fragment");
        let page = tree.physical_pages()[0];
        tree.add_reference(orphan, page);

        let file = DocumentFile::from_tree(&tree);
        let json = serde_json::to_string(&file).unwrap();
        assert!(!json.contains("Fragment"));
        assert_eq!(file.physical.pages.len(), 2);
    }

    #[test]
    fn out_of_range_reference_is_read_failure() {
        let json = r#"{
            "format_version": 1,
            "logical": { "type": "Monograph", "pages": [3] },
            "physical": { "type": "BoundBook", "pages": [] }
        }"#;
        let file: DocumentFile = serde_json::from_str(json).unwrap();
        let err = file.into_tree().unwrap_err();
        assert!(matches!(err, FolioError::DocumentRead { .. }));
    }

    #[test]
    fn childless_anchor_is_read_failure() {
        let json = r#"{
            "format_version": 1,
            "logical": { "type": "Periodical", "anchor": true },
            "physical": { "type": "BoundBook" }
        }"#;
        let file: DocumentFile = serde_json::from_str(json).unwrap();
        assert!(file.into_tree().is_err());
    }

    #[test]
    fn missing_file_is_read_failure() {
        let err = load_document(Path::new("/nonexistent/folioscan/structure.json")).unwrap_err();
        assert!(matches!(err, FolioError::DocumentRead { .. }));
    }
}
