//! Plugin data model.
//!
//! Defines the descriptor stored per discovered plugin and the command and
//! parameter schemas parsed out of a plugin's `--describe` document.
//!
//! # Example `--describe` document
//!
//! ```json
//! {
//!   "plugin": { "name": "devops", "version": "1.0.0" },
//!   "commands": [
//!     {
//!       "name": "deploy",
//!       "description": "Deploy an application",
//!       "parameters": [
//!         { "name": "app-name", "type": "string", "required": true },
//!         { "name": "environment", "type": "string", "default": "production" }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

/// One discovered plugin: a directory name, the executable entry point, and
/// (once schema discovery has run) the commands it exposes.
///
/// Descriptors are created during the startup directory scan and treated as
/// immutable once their command list has been filled in.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    /// Unique plugin name, taken from the subdirectory name.
    pub name: String,

    /// Path to the plugin's entry-point file (`cli` or `cli.py`).
    pub entry_point: PathBuf,

    /// Commands the plugin exposes. Empty until schema discovery runs;
    /// fallback-tier commands carry no parameter specs.
    pub commands: Vec<CommandSchema>,
}

impl PluginDescriptor {
    pub fn new(name: impl Into<String>, entry_point: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            entry_point: entry_point.into(),
            commands: Vec::new(),
        }
    }

    /// Base command invoking the plugin's entry point.
    ///
    /// Native entry points are executed directly; `.py` entry points are run
    /// through `python3` so legacy Python plugins keep working without an
    /// executable bit or shebang.
    pub fn base_command(&self) -> Command {
        if self.entry_point.extension().and_then(|e| e.to_str()) == Some("py") {
            let mut cmd = Command::new("python3");
            cmd.arg(&self.entry_point);
            cmd
        } else {
            Command::new(&self.entry_point)
        }
    }
}

/// One invocable command of a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSchema {
    /// Command name, unique within the plugin. Commands declared without a
    /// name are rejected during discovery.
    pub name: String,

    /// Human-readable description. A synthesized phrase is substituted at
    /// tool-synthesis time when absent or empty.
    #[serde(default)]
    pub description: Option<String>,

    /// Declared parameters, in declaration order. Empty for commands
    /// recovered via help-text scraping.
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl CommandSchema {
    /// A schema-less command, as produced by the help-scraping fallback.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Vec::new(),
        }
    }
}

/// One argument a command accepts, in CLI-flag style (`app-name`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,

    /// Declared type. Unrecognized values degrade to `string`.
    #[serde(default, rename = "type")]
    pub param_type: ParamType,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    /// Optional default value, passed through into the tool schema.
    #[serde(default)]
    pub default: Option<Value>,
}

/// Parameter types plugins may declare.
///
/// Deserialization is deliberately lenient: anything outside the known set
/// maps to `String`, so a plugin with a typo'd type still registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// The corresponding JSON Schema type keyword.
    pub fn as_json_type(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

impl Serialize for ParamType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_json_type())
    }
}

impl<'de> Deserialize<'de> for ParamType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.to_ascii_lowercase().as_str() {
            "number" => ParamType::Number,
            "integer" => ParamType::Integer,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::String,
        })
    }
}

/// Entry-point file names accepted in a plugin directory, in preference
/// order: a native executable first, then a legacy Python CLI.
pub const ENTRY_POINT_CANDIDATES: &[&str] = &["cli", "cli.py"];

/// Find the entry point within a plugin directory, if any.
pub fn find_entry_point(plugin_dir: &Path) -> Option<PathBuf> {
    ENTRY_POINT_CANDIDATES
        .iter()
        .map(|candidate| plugin_dir.join(candidate))
        .find(|path| path.is_file())
}
