//! Rebuild guard: decides what happens to structure left by an earlier run.

use tracing::{debug, info};

use folioscan_document::{ClearedStructure, DocumentTree};

/// Decision taken before building.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// The document already has pages and skipping was requested.
    Skip,
    /// Build may proceed; any previous structure has been removed.
    Proceed { cleared: ClearedStructure },
}

/// Skip or clear existing pagination so the build starts from an empty
/// physical sequence and a childless logical root.
pub fn prepare(tree: &mut DocumentTree, skip_when_data_exists: bool) -> GuardDecision {
    if !tree.has_pages() {
        debug!("no existing pagination");
        return GuardDecision::Proceed {
            cleared: ClearedStructure::default(),
        };
    }

    if skip_when_data_exists {
        info!(pages = tree.page_count(), "pagination exists, skipping");
        return GuardDecision::Skip;
    }

    let cleared = tree.clear_structure();
    info!(
        pages = cleared.pages,
        logical_children = cleared.logical_children,
        "cleared existing pagination"
    );
    GuardDecision::Proceed { cleared }
}
