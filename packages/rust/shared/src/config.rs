//! Application configuration for folioscan.
//!
//! User config lives at `~/.folioscan/folioscan.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{FolioError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "folioscan.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".folioscan";

// ---------------------------------------------------------------------------
// Config structs (matching folioscan.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Classification and grouping settings.
    #[serde(default)]
    pub analyzer: AnalyzerSection,

    /// Filepart → docstruct rules. Order is significant: the first matching
    /// filepart wins.
    #[serde(default)]
    pub structure: Vec<StructureRule>,

    /// Work directory layout.
    #[serde(default)]
    pub work: WorkSection,

    /// Structural type ruleset.
    #[serde(default)]
    pub schema: SchemaSection,
}

/// `[analyzer]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerSection {
    /// Pattern with one capturing group holding the pagination label.
    #[serde(default = "default_pagination_regex")]
    pub pagination_regex: String,

    /// Leave works that already have pages untouched.
    #[serde(default)]
    pub skip_when_data_exists: bool,

    /// Regroup the logical tree into the canonical section order.
    #[serde(default)]
    pub order_images_by_docstruct: bool,

    /// Structural type of the node collecting paginated and unmatched pages
    /// in grouping mode.
    #[serde(default = "default_catch_all_type")]
    pub catch_all_type: String,

    /// Structural type used for physical pages.
    #[serde(default = "default_page_type")]
    pub page_type: String,
}

impl Default for AnalyzerSection {
    fn default() -> Self {
        Self {
            pagination_regex: default_pagination_regex(),
            skip_when_data_exists: false,
            order_images_by_docstruct: false,
            catch_all_type: default_catch_all_type(),
            page_type: default_page_type(),
        }
    }
}

fn default_pagination_regex() -> String {
    r".*_(\d+)\.\w+".into()
}
fn default_catch_all_type() -> String {
    "Textblock".into()
}
fn default_page_type() -> String {
    "page".into()
}

/// One `[[structure]]` filepart rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureRule {
    /// Filename fragment following the last `_`, e.g. `VS` or `titlepage`.
    pub filepart: String,
    /// Structural type created for matching images.
    pub docstruct: String,
}

/// `[work]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSection {
    /// Image folder, relative to the work directory.
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Document structure file, relative to the work directory.
    #[serde(default = "default_document_file")]
    pub document_file: String,

    /// Journal database path. Relative paths resolve against the config dir.
    #[serde(default = "default_journal_db")]
    pub journal_db: String,
}

impl Default for WorkSection {
    fn default() -> Self {
        Self {
            images_dir: default_images_dir(),
            document_file: default_document_file(),
            journal_db: default_journal_db(),
        }
    }
}

fn default_images_dir() -> String {
    "images".into()
}
fn default_document_file() -> String {
    "structure.json".into()
}
fn default_journal_db() -> String {
    "journal.db".into()
}

/// `[schema]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaSection {
    /// Path to a ruleset TOML. Without one every type name is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<String>,
}

// ---------------------------------------------------------------------------
// Analyzer config (runtime snapshot, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime analyzer configuration. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Primary pagination pattern.
    pub pagination_regex: String,
    /// Return without changes when the document already has pages.
    pub skip_when_data_exists: bool,
    /// Grouping mode.
    pub order_images_by_docstruct: bool,
    /// Ordered filepart rules.
    pub structure: Vec<StructureRule>,
    /// Catch-all node type.
    pub catch_all_type: String,
    /// Physical page type.
    pub page_type: String,
}

impl From<&AppConfig> for AnalyzerConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pagination_regex: config.analyzer.pagination_regex.clone(),
            skip_when_data_exists: config.analyzer.skip_when_data_exists,
            order_images_by_docstruct: config.analyzer.order_images_by_docstruct,
            structure: config.structure.clone(),
            catch_all_type: config.analyzer.catch_all_type.clone(),
            page_type: config.analyzer.page_type.clone(),
        }
    }
}

impl AnalyzerConfig {
    /// Check that the pagination pattern compiles and captures a label, and
    /// that every rule names a filepart and a docstruct.
    pub fn validate(&self) -> Result<()> {
        let re = Regex::new(&self.pagination_regex).map_err(|e| {
            FolioError::config(format!(
                "invalid pagination_regex '{}': {e}",
                self.pagination_regex
            ))
        })?;
        if re.captures_len() < 2 {
            return Err(FolioError::config(format!(
                "pagination_regex '{}' needs a capturing group for the page label",
                self.pagination_regex
            )));
        }

        for (i, rule) in self.structure.iter().enumerate() {
            if rule.filepart.is_empty() || rule.docstruct.is_empty() {
                return Err(FolioError::config(format!(
                    "structure rule #{} needs both filepart and docstruct",
                    i + 1
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.folioscan/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| FolioError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.folioscan/folioscan.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FolioError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FolioError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FolioError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| FolioError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FolioError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the journal database path: absolute paths are kept, relative ones
/// land in the config directory.
pub fn journal_db_path(config: &AppConfig) -> Result<PathBuf> {
    let configured = PathBuf::from(&config.work.journal_db);
    if configured.is_absolute() {
        return Ok(configured);
    }
    Ok(config_dir()?.join(configured))
}
