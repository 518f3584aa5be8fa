//! Structure builder.
//!
//! One pass over the ordered image list: every image becomes a physical page,
//! and its classification decides which logical node references it.
//! Structural matches with the same key extend one node instead of creating
//! another.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, instrument, warn};

use folioscan_document::{DocumentTree, NodeId, Schema};
use folioscan_shared::{AnalyzerConfig, ImageFile, Result, Severity, UNCOUNTED};

use crate::classify::{Classification, Classifier, StructureKey};
use crate::journal::Journal;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Structure nodes created during one build, by key.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    nodes: BTreeMap<StructureKey, NodeId>,
}

impl Registry {
    pub fn get(&self, key: &str) -> Option<NodeId> {
        self.nodes.get(&StructureKey::from(key)).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &StructureKey> {
        self.nodes.keys()
    }

    fn lookup(&self, key: &StructureKey) -> Option<NodeId> {
        self.nodes.get(key).copied()
    }

    fn insert(&mut self, key: StructureKey, node: NodeId) {
        self.nodes.insert(key, node);
    }
}

// ---------------------------------------------------------------------------
// Build output
// ---------------------------------------------------------------------------

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    pub pages: usize,
    pub paginated: usize,
    pub structural: usize,
    pub unmatched: usize,
}

/// What the builder leaves behind for the reorder pass.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub registry: Registry,
    /// Catch-all node, present in grouping mode only.
    pub catch_all: Option<NodeId>,
    pub stats: BuildStats,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Drives classification and tree mutation for one work.
pub struct StructureBuilder<'a> {
    classifier: &'a Classifier,
    schema: &'a dyn Schema,
    grouping: bool,
    catch_all_type: &'a str,
    page_type: &'a str,
}

impl<'a> StructureBuilder<'a> {
    pub fn new(classifier: &'a Classifier, schema: &'a dyn Schema, config: &'a AnalyzerConfig) -> Self {
        Self {
            classifier,
            schema,
            grouping: config.order_images_by_docstruct,
            catch_all_type: &config.catch_all_type,
            page_type: &config.page_type,
        }
    }

    /// Append one page per image to `tree` and hang them into the logical
    /// structure. `tree` is expected to have no pages yet.
    #[instrument(skip_all, fields(images = images.len(), grouping = self.grouping))]
    pub fn build(
        &self,
        tree: &mut DocumentTree,
        folder: &Path,
        images: &[ImageFile],
        journal: &mut dyn Journal,
    ) -> Result<BuildOutput> {
        let page_type = self.schema.resolve_type(self.page_type)?;
        self.schema.check_child(tree.physical_type(), &page_type)?;

        let root = tree.logical_root();
        let root_type = tree.node(root).type_name.clone();

        let catch_all = if self.grouping {
            let handle = self.schema.resolve_type(self.catch_all_type)?;
            Some(tree.add_node(handle.name()))
        } else {
            None
        };

        let mut registry = Registry::default();
        let mut stats = BuildStats::default();

        for image in images {
            let page = tree.add_page(DocumentTree::content_location(folder, &image.name));
            if !self.grouping {
                tree.page_mut(page).physical_number = Some(image.index as u32 + 1);
            }
            stats.pages += 1;

            match self.classifier.classify(&image.name) {
                Classification::Paginated { label } => {
                    debug!(image = %image.name, %label, "paginated");
                    tree.page_mut(page).logical_label = label;
                    tree.add_reference(catch_all.unwrap_or(root), page);
                    stats.paginated += 1;
                }
                Classification::StructureMatch { key, type_name } => {
                    tree.page_mut(page).logical_label = UNCOUNTED.to_string();
                    let node = match registry.lookup(&key) {
                        Some(node) => node,
                        None => {
                            let handle = self.schema.resolve_type(&type_name)?;
                            let node = tree.add_node(handle.name());
                            if !self.grouping {
                                self.schema.check_child(&root_type, &handle)?;
                                tree.add_child(root, node)?;
                            }
                            debug!(%key, type_name = handle.name(), "created structure node");
                            registry.insert(key, node);
                            node
                        }
                    };
                    tree.add_reference(node, page);
                    stats.structural += 1;
                }
                Classification::Unmatched => {
                    tree.page_mut(page).logical_label = UNCOUNTED.to_string();
                    journal.record(
                        Severity::Error,
                        format!("no match found for image {}", image.name),
                    );
                    warn!(image = %image.name, "no match found for image");
                    if let Some(catch_all) = catch_all {
                        tree.add_reference(catch_all, page);
                    }
                    stats.unmatched += 1;
                }
            }
        }

        debug!(
            pages = stats.pages,
            paginated = stats.paginated,
            structural = stats.structural,
            unmatched = stats.unmatched,
            nodes = registry.len(),
            "structure built"
        );

        Ok(BuildOutput {
            registry,
            catch_all,
            stats,
        })
    }
}
