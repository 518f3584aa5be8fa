//! End-to-end `analyze` pipeline: image folder → guard → build → reorder → document.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, instrument, warn};

use folioscan_document::{ClearedStructure, DocumentTree, Schema, load_document, save_document};
use folioscan_shared::{
    AnalyzerConfig, FolioError, ImageFile, Result, WorkId, WorkSection,
};

use crate::builder::{BuildStats, StructureBuilder};
use crate::classify::{Classifier, StructureKey};
use crate::guard::{self, GuardDecision};
use crate::journal::Journal;
use crate::reorder;

// ---------------------------------------------------------------------------
// Config & result
// ---------------------------------------------------------------------------

/// Where a work keeps its images and its structure file.
#[derive(Debug, Clone)]
pub struct WorkLayout {
    /// The work directory.
    pub work_dir: PathBuf,
    /// Image folder.
    pub images_dir: PathBuf,
    /// Document structure file.
    pub document_file: PathBuf,
}

impl WorkLayout {
    /// Resolve the layout of `work_dir` from the `[work]` config section.
    pub fn new(work_dir: impl Into<PathBuf>, section: &WorkSection) -> Self {
        let work_dir = work_dir.into();
        Self {
            images_dir: work_dir.join(&section.images_dir),
            document_file: work_dir.join(&section.document_file),
            work_dir,
        }
    }

    pub fn work_id(&self) -> WorkId {
        WorkId::from_dir(&self.work_dir)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Pagination and structure were (re)written.
    Changed,
    /// Existing pagination was kept because skipping was requested.
    Skipped,
}

/// Result of running the analyzer over an in-memory tree.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub outcome: Outcome,
    pub stats: BuildStats,
    /// Structure nodes created (catch-all excluded).
    pub structure_nodes: usize,
    /// Registry keys left out by the regrouping pass.
    pub dropped: Vec<StructureKey>,
    /// What the guard removed before building.
    pub cleared: ClearedStructure,
}

impl RunSummary {
    fn skipped() -> Self {
        Self {
            outcome: Outcome::Skipped,
            stats: BuildStats::default(),
            structure_nodes: 0,
            dropped: Vec::new(),
            cleared: ClearedStructure::default(),
        }
    }
}

/// Result of [`Analyzer::analyze_work`].
#[derive(Debug)]
pub struct AnalyzeResult {
    pub work_id: WorkId,
    pub summary: RunSummary,
    /// The structure file that was read (and written, unless skipped).
    pub document_file: PathBuf,
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a work completes.
    fn done(&self, result: &AnalyzeResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _result: &AnalyzeResult) {}
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

/// Compiled analyzer. Built once from the configuration and reused for
/// every work.
#[derive(Debug, Clone)]
pub struct Analyzer {
    config: AnalyzerConfig,
    classifier: Classifier,
}

impl Analyzer {
    /// Validate the configuration and compile the classifier.
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        let classifier = Classifier::new(&config)?;
        Ok(Self { config, classifier })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Run guard, build, and (in grouping mode) reorder against `tree`.
    ///
    /// All work happens on a copy; `tree` is replaced only when every step
    /// succeeds, so an error leaves it exactly as it was.
    pub fn analyze_tree(
        &self,
        tree: &mut DocumentTree,
        folder: &Path,
        images: &[ImageFile],
        schema: &dyn Schema,
        journal: &mut dyn Journal,
    ) -> Result<RunSummary> {
        let mut working = tree.clone();

        let cleared = match guard::prepare(&mut working, self.config.skip_when_data_exists) {
            GuardDecision::Skip => return Ok(RunSummary::skipped()),
            GuardDecision::Proceed { cleared } => cleared,
        };

        let builder = StructureBuilder::new(&self.classifier, schema, &self.config);
        let output = builder.build(&mut working, folder, images, journal)?;

        let dropped = match output.catch_all {
            Some(catch_all) => {
                reorder::reorder(&mut working, &output.registry, catch_all, schema)?.dropped
            }
            None => Vec::new(),
        };

        *tree = working;

        Ok(RunSummary {
            outcome: Outcome::Changed,
            stats: output.stats,
            structure_nodes: output.registry.len(),
            dropped,
            cleared,
        })
    }

    /// Run the full pipeline for one work directory.
    ///
    /// 1. List the image folder
    /// 2. Read the structure file
    /// 3. Guard, build, reorder
    /// 4. Write the structure file (unless skipped)
    ///
    /// Diagnostics go to `journal` as they happen, so entries recorded before
    /// a failure stay with the caller.
    #[instrument(skip_all, fields(work = %layout.work_dir.display()))]
    pub fn analyze_work(
        &self,
        layout: &WorkLayout,
        schema: &dyn Schema,
        journal: &mut dyn Journal,
        progress: &dyn ProgressReporter,
    ) -> Result<AnalyzeResult> {
        let start = Instant::now();
        let work_id = layout.work_id();

        // --- Phase 1: Images ---
        progress.phase("Listing images");
        let folder = std::fs::canonicalize(&layout.images_dir).map_err(|e| {
            FolioError::input_unavailable(format!("{}: {e}", layout.images_dir.display()))
        })?;
        let images = list_images(&folder)?;

        // --- Phase 2: Document ---
        progress.phase("Reading structure file");
        let mut tree = load_document(&layout.document_file)?;

        // --- Phase 3: Build ---
        progress.phase("Building structure");
        let summary = self.analyze_tree(&mut tree, &folder, &images, schema, journal)?;

        // --- Phase 4: Write ---
        if summary.outcome == Outcome::Changed {
            progress.phase("Writing structure file");
            save_document(&layout.document_file, &tree)?;
        }

        let result = AnalyzeResult {
            work_id,
            summary,
            document_file: layout.document_file.clone(),
            elapsed: start.elapsed(),
        };

        progress.done(&result);

        info!(
            work_id = %result.work_id,
            outcome = ?result.summary.outcome,
            pages = result.summary.stats.pages,
            unmatched = result.summary.stats.unmatched,
            nodes = result.summary.structure_nodes,
            elapsed_ms = result.elapsed.as_millis(),
            "analyze pipeline complete"
        );

        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Image listing
// ---------------------------------------------------------------------------

/// List the regular, non-hidden files of `folder`, sorted by name.
pub fn list_images(folder: &Path) -> Result<Vec<ImageFile>> {
    let entries = std::fs::read_dir(folder)
        .map_err(|e| FolioError::input_unavailable(format!("{}: {e}", folder.display())))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry
            .map_err(|e| FolioError::input_unavailable(format!("{}: {e}", folder.display())))?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if name.starts_with('.') => {}
            Ok(name) => names.push(name),
            Err(raw) => warn!(name = ?raw, "skipping non UTF-8 filename"),
        }
    }

    if names.is_empty() {
        return Err(FolioError::input_unavailable(format!(
            "no images found in {}",
            folder.display()
        )));
    }

    names.sort();
    Ok(ImageFile::sequence(names))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use folioscan_document::{DocumentFile, PermissiveSchema, Ruleset};
    use folioscan_shared::{AppConfig, Severity, StructureRule};

    use crate::journal::{MemoryJournal, NullJournal};

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fs-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn analyzer(grouping: bool, skip: bool) -> Analyzer {
        let mut config = AnalyzerConfig::from(&AppConfig::default());
        config.order_images_by_docstruct = grouping;
        config.skip_when_data_exists = skip;
        config.structure = vec![
            StructureRule {
                filepart: "titlepage".into(),
                docstruct: "TitlePage".into(),
            },
            StructureRule {
                filepart: "VS".into(),
                docstruct: "Endsheet".into(),
            },
        ];
        Analyzer::new(config).unwrap()
    }

    fn make_work(names: &[&str]) -> WorkLayout {
        let dir = temp_dir();
        let layout = WorkLayout::new(&dir, &WorkSection::default());
        std::fs::create_dir_all(&layout.images_dir).unwrap();
        for name in names {
            std::fs::write(layout.images_dir.join(name), b"").unwrap();
        }
        save_document(&layout.document_file, &DocumentTree::new("Monograph", "BoundBook")).unwrap();
        layout
    }

    fn snapshot(tree: &DocumentTree) -> String {
        serde_json::to_string(&DocumentFile::from_tree(tree)).unwrap()
    }

    const NAMES: [&str; 5] = [
        "b_0001.tif",
        "b_VS1r.tif",
        "b_titlepage.tif",
        "b_0002.tif",
        "b_stray.tif",
    ];

    #[test]
    fn analyze_tree_is_idempotent() {
        let a = analyzer(false, false);
        let images = ImageFile::sequence(NAMES);
        let mut tree = DocumentTree::new("Monograph", "BoundBook");

        a.analyze_tree(&mut tree, Path::new("/w"), &images, &PermissiveSchema, &mut NullJournal)
            .unwrap();
        let first = snapshot(&tree);
        let summary = a
            .analyze_tree(&mut tree, Path::new("/w"), &images, &PermissiveSchema, &mut NullJournal)
            .unwrap();
        assert_eq!(snapshot(&tree), first);
        assert_eq!(summary.cleared.pages, 5);
        assert_eq!(summary.cleared.logical_children, 2);
        assert_eq!(tree.physical_numbers(), (1..=5u32).map(Some).collect::<Vec<_>>());
    }

    #[test]
    fn grouped_rerun_is_idempotent() {
        let a = analyzer(true, false);
        let images = ImageFile::sequence(NAMES);
        let mut tree = DocumentTree::new("Monograph", "BoundBook");
        a.analyze_tree(&mut tree, Path::new("/w"), &images, &PermissiveSchema, &mut NullJournal)
            .unwrap();
        let first = snapshot(&tree);
        a.analyze_tree(&mut tree, Path::new("/w"), &images, &PermissiveSchema, &mut NullJournal)
            .unwrap();
        assert_eq!(snapshot(&tree), first);
    }

    #[test]
    fn skip_keeps_existing_tree() {
        let images = ImageFile::sequence(NAMES);
        let mut tree = DocumentTree::new("Monograph", "BoundBook");
        analyzer(false, false)
            .analyze_tree(&mut tree, Path::new("/w"), &images, &PermissiveSchema, &mut NullJournal)
            .unwrap();
        let before = snapshot(&tree);

        let summary = analyzer(false, true)
            .analyze_tree(
                &mut tree,
                Path::new("/w"),
                &ImageFile::sequence(["other_0001.tif"]),
                &PermissiveSchema,
                &mut NullJournal,
            )
            .unwrap();
        assert_eq!(summary.outcome, Outcome::Skipped);
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn failed_build_leaves_tree_untouched() {
        let ruleset = Ruleset::from_toml_str(
            "[[docstruct]]\nname = \"Monograph\"\n[[docstruct]]\nname = \"BoundBook\"\n\
             [[docstruct]]\nname = \"page\"\n[[docstruct]]\nname = \"Endsheet\"\n",
        )
        .unwrap();
        let a = analyzer(false, false);
        let mut tree = DocumentTree::new("Monograph", "BoundBook");
        a.analyze_tree(
            &mut tree,
            Path::new("/w"),
            &ImageFile::sequence(["b_0001.tif", "b_VS.tif"]),
            &ruleset,
            &mut NullJournal,
        )
        .unwrap();
        let before = snapshot(&tree);

        // TitlePage is unknown to the ruleset.
        let err = a
            .analyze_tree(
                &mut tree,
                Path::new("/w"),
                &ImageFile::sequence(NAMES),
                &ruleset,
                &mut NullJournal,
            )
            .unwrap_err();
        assert!(matches!(err, FolioError::SchemaViolation { .. }));
        assert_eq!(snapshot(&tree), before);
    }

    #[test]
    fn analyze_work_end_to_end() {
        let layout = make_work(&NAMES);
        std::fs::write(layout.images_dir.join(".DS_Store"), b"").unwrap();
        std::fs::create_dir_all(layout.images_dir.join("thumbs")).unwrap();

        let mut journal = MemoryJournal::new(layout.work_id());
        let result = analyzer(false, false)
            .analyze_work(&layout, &PermissiveSchema, &mut journal, &SilentProgress)
            .unwrap();
        assert_eq!(result.summary.outcome, Outcome::Changed);
        assert_eq!(result.summary.stats.pages, 5);
        assert_eq!(result.summary.stats.unmatched, 1);
        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].severity, Severity::Error);
        assert_eq!(entries[0].work_id, layout.work_id());

        let stored = load_document(&layout.document_file).unwrap();
        assert_eq!(stored.page_count(), 5);
        let labels: Vec<_> = stored
            .physical_pages()
            .iter()
            .map(|p| stored.page(*p).logical_label.clone())
            .collect();
        // sorted: b_0001, b_0002, b_VS1r, b_stray, b_titlepage
        assert_eq!(labels, vec!["0001", "0002", "uncounted", "uncounted", "uncounted"]);
    }

    #[test]
    fn analyze_work_skip_does_not_rewrite() {
        let layout = make_work(&NAMES);
        analyzer(false, false)
            .analyze_work(&layout, &PermissiveSchema, &mut NullJournal, &SilentProgress)
            .unwrap();
        let before = std::fs::read_to_string(&layout.document_file).unwrap();

        let mut journal = MemoryJournal::new(layout.work_id());
        let result = analyzer(false, true)
            .analyze_work(&layout, &PermissiveSchema, &mut journal, &SilentProgress)
            .unwrap();
        assert_eq!(result.summary.outcome, Outcome::Skipped);
        assert!(journal.entries().is_empty());
        assert_eq!(std::fs::read_to_string(&layout.document_file).unwrap(), before);
    }

    #[test]
    fn diagnostics_survive_failed_run() {
        // Endsheet is known, TitlePage is not.
        let ruleset = Ruleset::from_toml_str(
            "[[docstruct]]\nname = \"Monograph\"\n[[docstruct]]\nname = \"BoundBook\"\n\
             [[docstruct]]\nname = \"page\"\n[[docstruct]]\nname = \"Endsheet\"\n",
        )
        .unwrap();
        let layout = make_work(&NAMES);
        let before = std::fs::read_to_string(&layout.document_file).unwrap();

        // sorted: b_0001, b_0002, b_VS1r, b_stray, b_titlepage
        let mut journal = MemoryJournal::new(layout.work_id());
        let err = analyzer(false, false)
            .analyze_work(&layout, &ruleset, &mut journal, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FolioError::SchemaViolation { .. }));

        let entries = journal.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "no match found for image b_stray.tif");
        assert_eq!(std::fs::read_to_string(&layout.document_file).unwrap(), before);
    }

    #[test]
    fn grouped_build_under_anchor_fills_the_volume() {
        let mut tree = DocumentTree::with_anchor("Periodical", "PeriodicalVolume", "BoundBook");
        let top = tree.top();
        analyzer(true, false)
            .analyze_tree(
                &mut tree,
                Path::new("/w"),
                &ImageFile::sequence(["b_0001.tif", "b_VS.tif", "b_0002.tif"]),
                &PermissiveSchema,
                &mut NullJournal,
            )
            .unwrap();

        let volume = tree.logical_root();
        assert_ne!(volume, top);
        assert_eq!(tree.node(top).children(), &[volume]);
        assert!(tree.node(top).pages().is_empty());
        assert!(tree.node(volume).pages().is_empty());

        let types: Vec<_> = tree
            .node(volume)
            .children()
            .iter()
            .map(|c| tree.node(*c).type_name.clone())
            .collect();
        assert_eq!(types, vec!["Endsheet", "Textblock"]);
        assert_eq!(tree.physical_numbers(), vec![Some(2), Some(1), Some(3)]);
    }

    #[test]
    fn empty_folder_is_input_unavailable() {
        let layout = make_work(&[]);
        let err = analyzer(false, false)
            .analyze_work(&layout, &PermissiveSchema, &mut NullJournal, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FolioError::InputUnavailable { .. }));
    }

    #[test]
    fn missing_document_is_read_failure() {
        let layout = make_work(&["b_0001.tif"]);
        std::fs::remove_file(&layout.document_file).unwrap();
        let err = analyzer(false, false)
            .analyze_work(&layout, &PermissiveSchema, &mut NullJournal, &SilentProgress)
            .unwrap_err();
        assert!(matches!(err, FolioError::DocumentRead { .. }));
    }

    #[test]
    fn list_images_sorts_by_name() {
        let dir = temp_dir();
        for name in ["c.tif", "a.tif", "b.tif"] {
            std::fs::write(dir.join(name), b"").unwrap();
        }
        let images = list_images(&dir).unwrap();
        let names: Vec<_> = images.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["a.tif", "b.tif", "c.tif"]);
        assert_eq!(images[2].index, 2);
    }
}
