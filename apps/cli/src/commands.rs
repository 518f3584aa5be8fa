//! CLI command definitions, routing, and tracing setup.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use folioscan_core::journal::{JOURNAL_SOURCE, MemoryJournal};
use folioscan_core::pipeline::{AnalyzeResult, Analyzer, Outcome, ProgressReporter, WorkLayout};
use folioscan_document::{
    DocumentTree, NodeId, PermissiveSchema, Ruleset, Schema, load_document, save_document,
};
use folioscan_shared::{
    AnalyzerConfig, AppConfig, JournalEntry, Severity, config_file_path, init_config,
    journal_db_path, load_config, load_config_from,
};
use folioscan_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// folioscan: page sequence and logical structure from scan filenames.
#[derive(Parser)]
#[command(
    name = "folioscan",
    version,
    about = "Derive pagination and logical structure of digitized works from image filenames.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.folioscan/folioscan.toml).
    #[arg(long, global = true, env = "FOLIOSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Build pagination and structure for one or more works.
    Analyze {
        /// Work directories.
        #[arg(required = true)]
        works: Vec<PathBuf>,

        /// Leave works that already have pages untouched.
        #[arg(long)]
        skip_existing: bool,

        /// Regroup the logical tree into canonical section order.
        #[arg(long)]
        group: bool,
    },

    /// Write an empty structure file for a work.
    New {
        /// Work directory.
        work: PathBuf,

        /// Structural type of the work (e.g. Monograph).
        #[arg(long)]
        logical_type: String,

        /// Anchor type when the work is one volume of a larger unit.
        #[arg(long)]
        anchor_type: Option<String>,

        /// Structural type of the physical root.
        #[arg(long, default_value = "BoundBook")]
        physical_type: String,

        /// Overwrite an existing structure file.
        #[arg(long)]
        force: bool,
    },

    /// Print the logical tree and the physical page list of a work.
    Show {
        /// Work directory.
        work: PathBuf,
    },

    /// Print the journal entries recorded for a work.
    Journal {
        /// Work directory.
        work: PathBuf,

        /// Delete the work's entries instead of printing them.
        #[arg(long)]
        clear: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "folioscan=info",
        1 => "folioscan=debug",
        _ => "folioscan=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Analyze {
            works,
            skip_existing,
            group,
        } => cmd_analyze(config_path, &works, skip_existing, group).await,
        Command::New {
            work,
            logical_type,
            anchor_type,
            physical_type,
            force,
        } => cmd_new(
            config_path,
            &work,
            &logical_type,
            anchor_type.as_deref(),
            &physical_type,
            force,
        ),
        Command::Show { work } => cmd_show(config_path, &work),
        Command::Journal { work, clear } => cmd_journal(config_path, &work, clear).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

// ---------------------------------------------------------------------------
// Config & schema resolution
// ---------------------------------------------------------------------------

/// Load the explicit config file, or the user config (defaults if absent).
fn resolve_config(explicit: Option<&Path>) -> Result<AppConfig> {
    Ok(match explicit {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

/// The configured ruleset, or a permissive schema when none is set.
/// Relative ruleset paths are resolved against the config file's directory.
fn resolve_schema(config: &AppConfig, explicit: Option<&Path>) -> Result<Box<dyn Schema>> {
    let Some(ruleset) = config.schema.ruleset.as_deref() else {
        info!("no ruleset configured, accepting any structural type");
        return Ok(Box::new(PermissiveSchema));
    };

    let mut path = PathBuf::from(ruleset);
    if path.is_relative() {
        let config_file = match explicit {
            Some(p) => p.to_path_buf(),
            None => config_file_path()?,
        };
        if let Some(dir) = config_file.parent() {
            path = dir.join(path);
        }
    }

    let rules = Ruleset::load(&path)?;
    info!(path = %path.display(), types = rules.len(), "loaded ruleset");
    Ok(Box::new(rules))
}

/// Work directories are canonicalized when possible so the work id is the
/// real directory name even for `.` or trailing slashes.
fn work_layout(work: &Path, config: &AppConfig) -> WorkLayout {
    let dir = std::fs::canonicalize(work).unwrap_or_else(|_| work.to_path_buf());
    WorkLayout::new(dir, &config.work)
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

async fn cmd_analyze(
    config_path: Option<&Path>,
    works: &[PathBuf],
    skip_existing: bool,
    group: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;

    let mut analyzer_config = AnalyzerConfig::from(&config);
    analyzer_config.skip_when_data_exists |= skip_existing;
    analyzer_config.order_images_by_docstruct |= group;

    let analyzer = Analyzer::new(analyzer_config)?;
    let schema = resolve_schema(&config, config_path)?;
    let storage = Storage::open(&journal_db_path(&config)?).await?;

    info!(
        works = works.len(),
        rules = analyzer.classifier().rule_count(),
        grouping = analyzer.config().order_images_by_docstruct,
        "analyzing works"
    );

    let mut failed = 0usize;
    for work in works {
        let layout = work_layout(work, &config);
        let reporter = CliProgress::new(&layout.work_id().to_string());

        let mut journal = MemoryJournal::new(layout.work_id());
        let outcome = analyzer.analyze_work(&layout, schema.as_ref(), &mut journal, &reporter);
        if outcome.is_err() {
            reporter.abandon();
        }
        if !finish_work(&storage, &layout, outcome, journal).await {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {} works failed", works.len()));
    }
    Ok(())
}

/// Persist the work's journal (plus a failure entry when the run failed) and
/// report the outcome. Returns whether the work succeeded; a journal write
/// failure counts against this work only.
async fn finish_work(
    storage: &Storage,
    layout: &WorkLayout,
    outcome: folioscan_shared::Result<AnalyzeResult>,
    journal: MemoryJournal,
) -> bool {
    let work_id = layout.work_id();
    let mut entries = journal.into_entries();
    if let Err(e) = &outcome {
        error!(work = %layout.work_dir.display(), error = %e, "analysis failed");
        entries.push(JournalEntry::new(
            work_id.clone(),
            Severity::Error,
            format!("analysis failed: {e}"),
            JOURNAL_SOURCE,
        ));
    }

    let stored = storage.append_journal_batch(&entries).await;
    if let Err(e) = &stored {
        error!(%work_id, error = %e, "journal entries not saved");
        eprintln!("  {work_id}: journal not saved: {e}");
    }

    match outcome {
        Ok(result) => {
            print_summary(&result);
            stored.is_ok()
        }
        Err(e) => {
            eprintln!("  {work_id}: FAILED: {e}");
            false
        }
    }
}

fn print_summary(result: &AnalyzeResult) {
    let summary = &result.summary;
    println!();
    match summary.outcome {
        Outcome::Skipped => {
            println!("  {}: skipped (pagination exists)", result.work_id);
            return;
        }
        Outcome::Changed => println!("  {}: structure written", result.work_id),
    }
    println!(
        "  Pages:     {} ({} paginated, {} structural, {} unmatched)",
        summary.stats.pages,
        summary.stats.paginated,
        summary.stats.structural,
        summary.stats.unmatched
    );
    println!("  Nodes:     {}", summary.structure_nodes);
    if summary.cleared.pages > 0 {
        println!("  Replaced:  {} earlier pages", summary.cleared.pages);
    }
    if !summary.dropped.is_empty() {
        let keys: Vec<_> = summary.dropped.iter().map(|k| k.as_str()).collect();
        println!("  Dropped:   {}", keys.join(", "));
    }
    println!("  File:      {}", result.document_file.display());
    println!("  Time:      {:.2}s", result.elapsed.as_secs_f64());
}

// ---------------------------------------------------------------------------
// new / show
// ---------------------------------------------------------------------------

fn cmd_new(
    config_path: Option<&Path>,
    work: &Path,
    logical_type: &str,
    anchor_type: Option<&str>,
    physical_type: &str,
    force: bool,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let schema = resolve_schema(&config, config_path)?;

    let logical = schema.resolve_type(logical_type)?;
    schema.resolve_type(physical_type)?;

    let tree = match anchor_type {
        Some(anchor_type) => {
            let anchor = schema.resolve_type(anchor_type)?;
            if !anchor.is_anchor() && config.schema.ruleset.is_some() {
                return Err(eyre!("'{anchor_type}' is not an anchor type"));
            }
            schema.check_child(anchor_type, &logical)?;
            DocumentTree::with_anchor(anchor_type, logical_type, physical_type)
        }
        None => DocumentTree::new(logical_type, physical_type),
    };

    std::fs::create_dir_all(work).map_err(|e| eyre!("cannot create {}: {e}", work.display()))?;
    let layout = work_layout(work, &config);
    if layout.document_file.exists() && !force {
        return Err(eyre!(
            "{} already exists (use --force to overwrite)",
            layout.document_file.display()
        ));
    }

    save_document(&layout.document_file, &tree)?;
    println!("Created {}", layout.document_file.display());
    Ok(())
}

fn cmd_show(config_path: Option<&Path>, work: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let layout = work_layout(work, &config);
    let tree = load_document(&layout.document_file)?;
    print!("{}", render_tree(&tree));
    Ok(())
}

/// Render the logical tree, then the physical sequence.
fn render_tree(tree: &DocumentTree) -> String {
    let mut out = String::new();
    render_node(tree, tree.top(), 0, &mut out);

    let _ = writeln!(
        out,
        "\n{} ({} pages)",
        tree.physical_type(),
        tree.page_count()
    );
    for page_id in tree.physical_pages() {
        let page = tree.page(*page_id);
        let number = page
            .physical_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {number:>4}  {:<10} {}",
            page.logical_label, page.content_file
        );
    }
    out
}

fn render_node(tree: &DocumentTree, id: NodeId, depth: usize, out: &mut String) {
    let node = tree.node(id);
    let _ = write!(out, "{}{}", "  ".repeat(depth), node.type_name);
    if node.anchor {
        out.push_str(" (anchor)");
    }
    if !node.pages().is_empty() {
        let _ = write!(out, " [{} pages]", node.pages().len());
    }
    for meta in &node.metadata {
        let _ = write!(out, " {}={:?}", meta.name, meta.value);
    }
    out.push('\n');

    for child in node.children() {
        render_node(tree, *child, depth + 1, out);
    }
}

// ---------------------------------------------------------------------------
// journal
// ---------------------------------------------------------------------------

async fn cmd_journal(config_path: Option<&Path>, work: &Path, clear: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let layout = work_layout(work, &config);
    let work_id = layout.work_id();

    if clear {
        let storage = Storage::open(&journal_db_path(&config)?).await?;
        let removed = storage.clear_journal(&work_id).await?;
        println!("Removed {removed} journal entries for {work_id}");
        return Ok(());
    }

    let storage = Storage::open_readonly(&journal_db_path(&config)?).await?;
    let entries = storage.journal_for_work(&work_id).await?;

    if entries.is_empty() {
        println!("No journal entries for {work_id}");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(())
}

fn format_entry(entry: &JournalEntry) -> String {
    format!(
        "{}  {:<5}  {}: {}",
        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
        entry.severity.as_str(),
        entry.source,
        entry.message
    )
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new(work: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.set_prefix(work.to_string());
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }

    fn abandon(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _result: &AnalyzeResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use folioscan_core::builder::BuildStats;
    use folioscan_core::journal::Journal;
    use folioscan_core::pipeline::RunSummary;
    use folioscan_document::ClearedStructure;
    use folioscan_shared::{FolioError, WorkId, WorkSection};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fs-cli-test-{}-{name}", uuid::Uuid::now_v7()))
    }

    fn changed_result(layout: &WorkLayout) -> AnalyzeResult {
        AnalyzeResult {
            work_id: layout.work_id(),
            summary: RunSummary {
                outcome: Outcome::Changed,
                stats: BuildStats::default(),
                structure_nodes: 0,
                dropped: Vec::new(),
                cleared: ClearedStructure::default(),
            },
            document_file: layout.document_file.clone(),
            elapsed: std::time::Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn failed_work_keeps_its_diagnostics() {
        let storage = Storage::open(&temp_path("journal.db")).await.unwrap();
        let layout = WorkLayout::new(temp_path("ppn_7"), &WorkSection::default());

        let mut journal = MemoryJournal::new(layout.work_id());
        journal.record(Severity::Error, "no match found for image b_stray.tif".into());
        let outcome = Err(FolioError::schema("unknown docstruct type 'TitlePage'"));

        assert!(!finish_work(&storage, &layout, outcome, journal).await);

        let stored = storage.journal_for_work(&layout.work_id()).await.unwrap();
        let messages: Vec<_> = stored.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], "no match found for image b_stray.tif");
        assert!(messages[1].starts_with("analysis failed: schema violation"));
    }

    #[tokio::test]
    async fn journal_write_failure_fails_only_that_work() {
        let db = temp_path("journal.db");
        drop(Storage::open(&db).await.unwrap());
        let readonly = Storage::open_readonly(&db).await.unwrap();
        let layout = WorkLayout::new(temp_path("ppn_8"), &WorkSection::default());

        let mut journal = MemoryJournal::new(layout.work_id());
        journal.record(Severity::Error, "no match found for image b_x.tif".into());
        let ok = finish_work(&readonly, &layout, Ok(changed_result(&layout)), journal).await;
        assert!(!ok);

        let writable = Storage::open(&db).await.unwrap();
        let next = WorkLayout::new(temp_path("ppn_9"), &WorkSection::default());
        let journal = MemoryJournal::new(next.work_id());
        assert!(finish_work(&writable, &next, Ok(changed_result(&next)), journal).await);
    }

    #[test]
    fn parses_journal_clear() {
        let cli = Cli::try_parse_from(["folioscan", "journal", "w1", "--clear"]).unwrap();
        match cli.command {
            Command::Journal { work, clear } => {
                assert_eq!(work, PathBuf::from("w1"));
                assert!(clear);
            }
            _ => panic!("expected journal"),
        }
    }

    #[test]
    fn parses_analyze_flags() {
        let cli = Cli::try_parse_from([
            "folioscan",
            "analyze",
            "w1",
            "w2",
            "--group",
            "--log-format",
            "json",
        ])
        .unwrap();
        match cli.command {
            Command::Analyze {
                works,
                skip_existing,
                group,
            } => {
                assert_eq!(works, vec![PathBuf::from("w1"), PathBuf::from("w2")]);
                assert!(!skip_existing);
                assert!(group);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn analyze_needs_a_work() {
        assert!(Cli::try_parse_from(["folioscan", "analyze"]).is_err());
    }

    #[test]
    fn render_shows_tree_and_pages() {
        let mut tree = DocumentTree::new("Monograph", "BoundBook");
        let root = tree.logical_root();
        let cover = tree.add_node("CoverFrontOuter");
        tree.add_child(root, cover).unwrap();
        let p = tree.add_page("file:///w/b_VD.tif");
        tree.page_mut(p).physical_number = Some(1);
        tree.page_mut(p).logical_label = "uncounted".to_string();
        tree.add_reference(cover, p);
        tree.add_page("file:///w/b_x.tif");

        let text = render_tree(&tree);
        assert!(text.starts_with("Monograph\n  CoverFrontOuter [1 pages]\n"));
        assert!(text.contains("BoundBook (2 pages)"));
        assert!(text.contains("     1  uncounted  file:///w/b_VD.tif"));
        assert!(text.contains("     -"));
    }

    #[test]
    fn render_marks_anchor() {
        let tree = DocumentTree::with_anchor("Periodical", "PeriodicalVolume", "BoundBook");
        let text = render_tree(&tree);
        assert!(text.starts_with("Periodical (anchor)\n  PeriodicalVolume\n"));
    }

    #[test]
    fn journal_line_format() {
        let entry = JournalEntry::new(
            WorkId::from("ppn_1"),
            Severity::Error,
            "no match found for image a_Q.tif",
            JOURNAL_SOURCE,
        );
        let line = format_entry(&entry);
        assert!(line.contains("error  image analyzer: no match found for image a_Q.tif"));
    }

    #[test]
    fn relative_ruleset_resolves_next_to_config() {
        let dir = std::env::temp_dir().join(format!("fs-cli-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("rules.toml"),
            "[[docstruct]]\nname = \"Monograph\"\nchildren = []\n",
        )
        .unwrap();
        let config_file = dir.join("folioscan.toml");

        let mut config = AppConfig::default();
        config.schema.ruleset = Some("rules.toml".to_string());
        let schema = resolve_schema(&config, Some(&config_file)).unwrap();
        assert!(schema.resolve_type("Monograph").is_ok());
        assert!(schema.resolve_type("Unknown").is_err());
    }
}
