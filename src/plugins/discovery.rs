//! Plugin discovery.
//!
//! Two responsibilities live here: scanning the plugin root for plugin
//! directories, and working out what commands each plugin exposes.
//!
//! Command discovery is two-tier. The structured tier runs the plugin with
//! `--describe` and expects a JSON document with a `commands` array; any
//! deviation (non-zero exit, bad JSON, missing field, timeout) resolves to
//! [`DescribeOutcome::Unsupported`] rather than an error, which triggers the
//! legacy tier: running `--help` and scraping command names out of the
//! "Available commands:" section. Plugins predating the describe convention
//! keep working, they just register without parameter schemas.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::metrics::Metrics;

use super::types::{find_entry_point, CommandSchema, PluginDescriptor};

/// Deadline for `--describe` and `--help` calls. Short: discovery runs at
/// startup and a hung plugin must not stall boot.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of the structured discovery tier.
#[derive(Debug, Clone, PartialEq)]
pub enum DescribeOutcome {
    /// The plugin produced a well-formed describe document.
    Structured(Vec<CommandSchema>),
    /// `--describe` is not supported (or produced garbage); use the fallback.
    Unsupported,
}

/// Scan the plugin root for plugin directories.
///
/// Every immediate subdirectory containing an entry-point file (`cli` or
/// `cli.py`) becomes one descriptor keyed by the subdirectory name.
/// Subdirectories without an entry point are silently skipped. A missing
/// root is a warning, not an error: the gateway starts with zero plugins.
///
/// Updates the plugins-discovered metric with the resulting count.
pub fn scan_plugins(root: &Path, metrics: &Metrics) -> HashMap<String, PluginDescriptor> {
    let mut plugins = HashMap::new();

    if !root.is_dir() {
        warn!(root = %root.display(), "Plugins directory not found");
        metrics.set_plugins_discovered(0);
        return plugins;
    }

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(root = %root.display(), error = %e, "Failed to read plugins directory");
            metrics.set_plugins_discovered(0);
            return plugins;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(entry_point) = find_entry_point(&path) else {
            continue;
        };
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        info!(plugin = %name, entry_point = %entry_point.display(), "Discovered plugin");
        plugins.insert(name.to_string(), PluginDescriptor::new(name, entry_point));
    }

    metrics.set_plugins_discovered(plugins.len() as u64);
    info!(count = plugins.len(), "Plugin discovery scan complete");

    plugins
}

/// Run a plugin's `--describe` and parse the result.
///
/// Never fails: every violation of the describe contract maps to
/// [`DescribeOutcome::Unsupported`].
pub async fn describe_plugin(descriptor: &PluginDescriptor) -> DescribeOutcome {
    let output = run_discovery_command(descriptor, "--describe").await;

    match output {
        Some(output) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let outcome = parse_describe_output(descriptor, &stdout);
            if outcome == DescribeOutcome::Unsupported {
                warn!(plugin = %descriptor.name, "--describe returned an invalid document");
            }
            outcome
        }
        Some(_) => {
            // Non-zero exit: --describe simply not supported.
            debug!(plugin = %descriptor.name, "--describe not supported, will use fallback");
            DescribeOutcome::Unsupported
        }
        None => DescribeOutcome::Unsupported,
    }
}

/// Parse the stdout of a `--describe` call.
///
/// The document must be valid JSON with a `commands` array. Individual
/// commands that are malformed or lack a name are skipped with a warning;
/// the rest of the document still counts.
pub fn parse_describe_output(descriptor: &PluginDescriptor, raw: &str) -> DescribeOutcome {
    let document: serde_json::Value = match serde_json::from_str(raw.trim()) {
        Ok(value) => value,
        Err(_) => return DescribeOutcome::Unsupported,
    };

    let Some(entries) = document.get("commands").and_then(|c| c.as_array()) else {
        return DescribeOutcome::Unsupported;
    };

    let mut commands = Vec::new();
    for entry in entries {
        match serde_json::from_value::<CommandSchema>(entry.clone()) {
            Ok(command) if command.name.is_empty() => {
                warn!(plugin = %descriptor.name, "Skipping command with empty name");
            }
            Ok(command) => commands.push(command),
            Err(e) => {
                warn!(plugin = %descriptor.name, error = %e, "Skipping malformed command entry");
            }
        }
    }

    DescribeOutcome::Structured(commands)
}

/// Fetch a plugin's `--help` output for the scraping fallback.
pub async fn plugin_help(descriptor: &PluginDescriptor) -> Option<String> {
    let output = run_discovery_command(descriptor, "--help").await?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        warn!(
            plugin = %descriptor.name,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "Plugin --help failed"
        );
        None
    }
}

/// Run the entry point with one directive flag under the discovery deadline.
async fn run_discovery_command(
    descriptor: &PluginDescriptor,
    directive: &str,
) -> Option<std::process::Output> {
    let mut command = descriptor.base_command();
    command.arg(directive).stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(DISCOVERY_TIMEOUT, command.output()).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            debug!(plugin = %descriptor.name, directive, error = %e, "Discovery call failed to spawn");
            None
        }
        Err(_) => {
            warn!(plugin = %descriptor.name, directive, "Discovery call timed out");
            None
        }
    }
}

/// Tokens that can never be command names even when they appear indented
/// inside the commands section.
const RESERVED_HELP_TOKENS: &[&str] = &["usage:", "options:", "Available", "Examples:"];

/// Scrape command names out of free-text help output.
///
/// Collects the first whitespace-delimited token of each indented line after
/// an "Available commands:" header, stopping at a blank line or an
/// "Examples" header.
pub fn parse_commands_from_help(help_text: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut in_commands_section = false;

    for line in help_text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("Available commands:") {
            in_commands_section = true;
            continue;
        }
        if in_commands_section {
            if trimmed.is_empty() || trimmed.starts_with("Examples") {
                in_commands_section = false;
                continue;
            }
            if line.starts_with("  ") {
                if let Some(token) = trimmed.split_whitespace().next() {
                    if !RESERVED_HELP_TOKENS.contains(&token) {
                        commands.push(token.to_string());
                    }
                }
            }
        }
    }

    commands
}
