//! Structural type schema.
//!
//! The builder never hard-codes which type names exist. It asks a [`Schema`]
//! to resolve names and to approve parent/child pairs. [`Ruleset`] is the
//! TOML-backed implementation; [`PermissiveSchema`] accepts everything.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use folioscan_shared::{FolioError, Result};

/// A structural type name the schema has vouched for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeHandle {
    name: String,
    anchor: bool,
}

impl TypeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_anchor(&self) -> bool {
        self.anchor
    }
}

/// Capability for resolving and validating structural types.
pub trait Schema {
    /// Resolve a type name, failing with a schema violation if unknown.
    fn resolve_type(&self, name: &str) -> Result<TypeHandle>;

    /// Check that a node of type `child` may be placed under `parent`.
    fn check_child(&self, parent: &str, child: &TypeHandle) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Permissive schema
// ---------------------------------------------------------------------------

/// Accepts every non-empty type name and every nesting.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveSchema;

impl Schema for PermissiveSchema {
    fn resolve_type(&self, name: &str) -> Result<TypeHandle> {
        if name.is_empty() {
            return Err(FolioError::schema("empty structural type name"));
        }
        Ok(TypeHandle {
            name: name.to_string(),
            anchor: false,
        })
    }

    fn check_child(&self, _parent: &str, _child: &TypeHandle) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Ruleset
// ---------------------------------------------------------------------------

/// One `[[docstruct]]` entry of a ruleset file.
#[derive(Debug, Clone, Deserialize)]
pub struct DocStructDef {
    pub name: String,
    #[serde(default)]
    pub anchor: bool,
    /// Allowed child types. Empty means unrestricted.
    #[serde(default)]
    pub children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RulesetFile {
    #[serde(default)]
    docstruct: Vec<DocStructDef>,
}

/// Schema loaded from a ruleset TOML file.
#[derive(Debug, Clone)]
pub struct Ruleset {
    types: HashMap<String, DocStructDef>,
}

impl Ruleset {
    /// Parse a ruleset from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RulesetFile = toml::from_str(content)
            .map_err(|e| FolioError::config(format!("invalid ruleset: {e}")))?;

        let mut types = HashMap::with_capacity(file.docstruct.len());
        for def in file.docstruct {
            if types.contains_key(&def.name) {
                return Err(FolioError::config(format!(
                    "ruleset defines docstruct '{}' twice",
                    def.name
                )));
            }
            types.insert(def.name.clone(), def);
        }
        Ok(Self { types })
    }

    /// Load a ruleset from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FolioError::io(path, e))?;
        let ruleset = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), types = ruleset.types.len(), "loaded ruleset");
        Ok(ruleset)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Schema for Ruleset {
    fn resolve_type(&self, name: &str) -> Result<TypeHandle> {
        self.types
            .get(name)
            .map(|def| TypeHandle {
                name: def.name.clone(),
                anchor: def.anchor,
            })
            .ok_or_else(|| FolioError::schema(format!("unknown docstruct type '{name}'")))
    }

    fn check_child(&self, parent: &str, child: &TypeHandle) -> Result<()> {
        let def = self
            .types
            .get(parent)
            .ok_or_else(|| FolioError::schema(format!("unknown docstruct type '{parent}'")))?;
        if def.children.is_empty() || def.children.iter().any(|c| c == child.name()) {
            return Ok(());
        }
        Err(FolioError::schema(format!(
            "type '{}' is not allowed as a child of '{parent}'",
            child.name()
        )))
    }
}
