//! Plugin registry.
//!
//! The registry is the descriptor store: it is populated once at startup
//! (scan, then per-plugin schema discovery) and read-only afterwards, so the
//! call path never needs a lock. Re-discovery means building a fresh
//! registry and swapping the `Arc`.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{GatewayError, Result};
use crate::metrics::Metrics;

use super::discovery::{
    describe_plugin, parse_commands_from_help, plugin_help, scan_plugins, DescribeOutcome,
};
use super::types::{CommandSchema, PluginDescriptor};

/// Commands dropped during registration. Every other command auto-connects,
/// which makes explicit lifecycle commands redundant noise in the tool list.
const SUPPRESSED_COMMANDS: &[&str] = &["connect", "disconnect"];

/// A parsed tool name: `<plugin>__<command>`, with the legacy
/// `<plugin>.<command>` form accepted on lookup only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolName<'a> {
    pub plugin: &'a str,
    pub command: &'a str,
}

impl<'a> ToolName<'a> {
    /// Split a tool name into plugin and command.
    ///
    /// The double-underscore delimiter is tried first; a single dot is
    /// accepted for backward compatibility. Anything else is a format
    /// error, reported before any subprocess is spawned.
    pub fn parse(raw: &'a str) -> Result<Self> {
        if let Some((plugin, command)) = raw.split_once("__") {
            return Ok(Self { plugin, command });
        }
        if let Some((plugin, command)) = raw.split_once('.') {
            return Ok(Self { plugin, command });
        }
        Err(GatewayError::Tool(format!(
            "Invalid tool name format: {}. Expected 'plugin__command' or 'plugin.command'",
            raw
        )))
    }
}

/// Mapping from plugin name to descriptor, with command schemas resolved.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `root` and resolve command schemas for every plugin found.
    ///
    /// Discovery never fails: a missing root, a broken describe document or
    /// an unresponsive plugin all degrade to fewer registered commands.
    pub async fn discover(root: &Path, metrics: &Metrics) -> Self {
        let mut plugins = scan_plugins(root, metrics);

        for descriptor in plugins.values_mut() {
            descriptor.commands = resolve_commands(descriptor).await;
        }

        Self { plugins }
    }

    /// Register a descriptor directly. Used by tests and by callers that
    /// manage discovery themselves.
    pub fn insert(&mut self, descriptor: PluginDescriptor) {
        self.plugins.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.get(name)
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Plugin names, sorted for deterministic advertisement and health output.
    pub fn plugin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(|n| n.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors in name order.
    pub fn plugins(&self) -> Vec<&PluginDescriptor> {
        let mut all: Vec<&PluginDescriptor> = self.plugins.values().collect();
        all.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Run the two discovery tiers for one plugin and filter the result.
async fn resolve_commands(descriptor: &PluginDescriptor) -> Vec<CommandSchema> {
    match describe_plugin(descriptor).await {
        DescribeOutcome::Structured(commands) => {
            info!(plugin = %descriptor.name, "Using --describe for command discovery");
            commands
                .into_iter()
                .filter(|command| keep_command(descriptor, &command.name))
                .collect()
        }
        DescribeOutcome::Unsupported => {
            info!(plugin = %descriptor.name, "Using help scraping fallback (--describe not supported)");
            let Some(help_text) = plugin_help(descriptor).await else {
                warn!(plugin = %descriptor.name, "No commands discovered");
                return Vec::new();
            };
            let names = parse_commands_from_help(&help_text);
            if names.is_empty() {
                warn!(plugin = %descriptor.name, "No commands discovered via help scraping");
            }
            names
                .into_iter()
                .filter(|name| keep_command(descriptor, name))
                .map(CommandSchema::bare)
                .collect()
        }
    }
}

fn keep_command(descriptor: &PluginDescriptor, command_name: &str) -> bool {
    if SUPPRESSED_COMMANDS.contains(&command_name) {
        info!(
            plugin = %descriptor.name,
            command = %command_name,
            "Skipping redundant lifecycle command"
        );
        return false;
    }
    true
}
