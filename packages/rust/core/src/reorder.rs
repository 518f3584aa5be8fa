//! Canonical regrouping of the logical tree.
//!
//! In grouping mode nothing is attached to the logical root during the build.
//! This pass attaches the registered nodes in a fixed section order (front
//! covers and endsheets, the catch-all text block, back endsheets and covers,
//! edges, color charts, fragments) and numbers the pages of each node in turn.
//! Registry keys missing from the table are not attached, and their pages
//! receive no physical number.

use tracing::{debug, instrument, warn};

use folioscan_document::{DocumentTree, NodeId, Schema};
use folioscan_shared::Result;

use crate::builder::Registry;
use crate::classify::StructureKey;

/// One slot in the canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// A registry key.
    Key(&'static str),
    /// The catch-all node.
    CatchAll,
}

/// The canonical section order.
pub static CANONICAL_ORDER: &[Slot] = &[
    // front cover and front endsheets
    Slot::Key("VD"),
    Slot::Key("VDS"),
    Slot::Key("VDS2"),
    Slot::Key("VS"),
    Slot::Key("VS1"),
    Slot::Key("VS2"),
    Slot::Key("VS3"),
    Slot::Key("VS4"),
    Slot::Key("VS5"),
    Slot::Key("VS6"),
    Slot::Key("VS7"),
    Slot::Key("VS8"),
    Slot::Key("VS9"),
    Slot::Key("VS10"),
    Slot::Key("VS11"),
    Slot::CatchAll,
    // back endsheets and back cover
    Slot::Key("NS"),
    Slot::Key("NS1"),
    Slot::Key("NS2"),
    Slot::Key("NS3"),
    Slot::Key("NS4"),
    Slot::Key("NS5"),
    Slot::Key("NS6"),
    Slot::Key("NS7"),
    Slot::Key("NS8"),
    Slot::Key("NS9"),
    Slot::Key("HDS"),
    Slot::Key("HD"),
    // spine and edges
    Slot::Key("ER"),
    Slot::Key("SV"),
    Slot::Key("SO"),
    Slot::Key("SU"),
    // color charts
    Slot::Key("Farbkarte"),
    Slot::Key("Farbkarte_Buchblock"),
    Slot::Key("Farbkarte_Bucheinband"),
    Slot::Key("Farbkarte_Einband"),
    // fragments
    Slot::Key("FR"),
    Slot::Key("Fragm"),
];

/// Whether `key` has a slot in [`CANONICAL_ORDER`].
pub fn is_canonical(key: &str) -> bool {
    CANONICAL_ORDER
        .iter()
        .any(|slot| matches!(slot, Slot::Key(k) if *k == key))
}

/// What the reorder pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReorderReport {
    /// Keys attached to the logical root, in order (`None` is the catch-all).
    pub attached: Vec<Option<String>>,
    /// Registry keys with no canonical slot.
    pub dropped: Vec<StructureKey>,
    /// Pages that received a physical number.
    pub numbered: u32,
}

/// Attach registered nodes to the logical root in canonical order and number
/// their pages consecutively from 1.
#[instrument(skip_all, fields(registered = registry.len()))]
pub fn reorder(
    tree: &mut DocumentTree,
    registry: &Registry,
    catch_all: NodeId,
    schema: &dyn Schema,
) -> Result<ReorderReport> {
    let root = tree.logical_root();
    let root_type = tree.node(root).type_name.clone();
    let mut report = ReorderReport::default();
    let mut next = 1u32;

    for slot in CANONICAL_ORDER {
        let (node, label) = match slot {
            Slot::CatchAll => (catch_all, None),
            Slot::Key(key) => match registry.get(key) {
                Some(node) => (node, Some(key.to_string())),
                None => continue,
            },
        };

        let handle = schema.resolve_type(&tree.node(node).type_name)?;
        schema.check_child(&root_type, &handle)?;
        tree.add_child(root, node)?;

        let pages = tree.node(node).pages().to_vec();
        for page in pages {
            tree.page_mut(page).physical_number = Some(next);
            next += 1;
        }
        debug!(
            key = label.as_deref().unwrap_or("<catch-all>"),
            pages = tree.node(node).pages().len(),
            "attached section"
        );
        report.attached.push(label);
    }

    report.dropped = registry
        .keys()
        .filter(|key| !is_canonical(key.as_str()))
        .cloned()
        .collect();
    for key in &report.dropped {
        warn!(%key, "structure key has no canonical position; node left detached");
    }

    report.numbered = next - 1;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use folioscan_document::PermissiveSchema;
    use folioscan_shared::{AnalyzerConfig, AppConfig, ImageFile, StructureRule};

    use crate::builder::{BuildOutput, StructureBuilder};
    use crate::classify::Classifier;
    use crate::journal::NullJournal;

    fn grouped_build(rules: &[&str], names: &[&str]) -> (DocumentTree, BuildOutput) {
        let mut config = AnalyzerConfig::from(&AppConfig::default());
        config.order_images_by_docstruct = true;
        config.structure = rules
            .iter()
            .map(|f| StructureRule {
                filepart: f.to_string(),
                docstruct: format!("T_{f}"),
            })
            .collect();
        let classifier = Classifier::new(&config).unwrap();
        let builder = StructureBuilder::new(&classifier, &PermissiveSchema, &config);
        let mut tree = DocumentTree::new("Monograph", "BoundBook");
        let out = builder
            .build(
                &mut tree,
                Path::new("/w"),
                &ImageFile::sequence(names.iter().copied()),
                &mut NullJournal,
            )
            .unwrap();
        (tree, out)
    }

    #[test]
    fn table_has_one_catch_all_and_unique_keys() {
        let catch_alls = CANONICAL_ORDER.iter().filter(|s| **s == Slot::CatchAll).count();
        assert_eq!(catch_alls, 1);
        let mut keys: Vec<_> = CANONICAL_ORDER
            .iter()
            .filter_map(|s| match s {
                Slot::Key(k) => Some(*k),
                Slot::CatchAll => None,
            })
            .collect();
        let total = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert!(is_canonical("VS11"));
        assert!(!is_canonical("A"));
    }

    #[test]
    fn canonical_lookup_accepts_borrowed_keys() {
        let key = StructureKey::new("NS", "3");
        assert!(is_canonical(key.as_str()));
        let owned = String::from("Farbkarte_Einband");
        assert!(is_canonical(&owned));
        assert!(!is_canonical(&format!("{owned}2")));
    }

    #[test]
    fn canonical_order_overrides_scan_order() {
        let (mut tree, out) = grouped_build(
            &["VD", "NS", "VS"],
            &["b_NS.tif", "b_0001.tif", "b_VS.tif", "b_0002.tif", "b_VD.tif"],
        );
        let catch_all = out.catch_all.unwrap();
        let report = reorder(&mut tree, &out.registry, catch_all, &PermissiveSchema).unwrap();

        let root = tree.logical_root();
        let types: Vec<_> = tree
            .node(root)
            .children()
            .iter()
            .map(|c| tree.node(*c).type_name.clone())
            .collect();
        assert_eq!(types, vec!["T_VD", "T_VS", "Textblock", "T_NS"]);
        assert_eq!(report.numbered, 5);

        // physical order of scan: NS, 0001, VS, 0002, VD
        assert_eq!(
            tree.physical_numbers(),
            vec![Some(5), Some(3), Some(2), Some(4), Some(1)]
        );
        assert_eq!(
            report.attached,
            vec![
                Some("VD".to_string()),
                Some("VS".to_string()),
                None,
                Some("NS".to_string())
            ]
        );
    }

    #[test]
    fn non_canonical_keys_are_dropped() {
        let (mut tree, out) = grouped_build(
            &["VS", "A"],
            &["b_VS.tif", "b_A.tif", "b_VS1.tif", "b_A.jpg"],
        );
        assert!(out.registry.contains("A"));
        let report =
            reorder(&mut tree, &out.registry, out.catch_all.unwrap(), &PermissiveSchema).unwrap();

        let root = tree.logical_root();
        let types: Vec<_> = tree
            .node(root)
            .children()
            .iter()
            .map(|c| tree.node(*c).type_name.clone())
            .collect();
        assert_eq!(types, vec!["T_VS", "T_VS", "Textblock"]);
        assert_eq!(report.dropped, vec![StructureKey::from("A")]);

        let a = out.registry.get("A").unwrap();
        assert!(tree.node(a).parent().is_none());
        for page in tree.node(a).pages() {
            assert_eq!(tree.page(*page).physical_number, None);
        }
        // VS -> 1, VS1 -> 2; A's two pages stay unnumbered.
        assert_eq!(
            tree.physical_numbers(),
            vec![Some(1), None, Some(2), None]
        );
        assert_eq!(report.numbered, 2);
    }

    #[test]
    fn empty_catch_all_is_still_attached() {
        let (mut tree, out) = grouped_build(&["HD"], &["b_HD.tif"]);
        reorder(&mut tree, &out.registry, out.catch_all.unwrap(), &PermissiveSchema).unwrap();
        let root = tree.logical_root();
        assert_eq!(tree.node(root).children().len(), 2);
        let first = tree.node(root).children()[0];
        assert_eq!(tree.node(first).type_name, "Textblock");
        assert_eq!(tree.physical_numbers(), vec![Some(1)]);
    }
}
