//! Plugin system for the toolgate gateway.
//!
//! A plugin is an external executable directory: any immediate subdirectory
//! of the plugin root containing an entry-point file (`cli`, or `cli.py`
//! for legacy Python plugins) is registered under the directory's name.
//! Plugins stay out-of-process; the gateway only ever shells out to them,
//! so a crashing plugin cannot take the gateway down.
//!
//! # Architecture
//!
//! - **types**: `PluginDescriptor`, `CommandSchema`, `ParameterSpec`
//! - **discovery**: directory scan plus the two-tier command discovery
//!   (`--describe` JSON, then `--help` scraping)
//! - **registry**: the read-only descriptor store and tool-name parsing
//!
//! # Plugin directory structure
//!
//! ```text
//! ~/.toolgate/plugins/
//! ├── devops/
//! │   └── cli
//! ├── botfather/
//! │   └── cli.py
//! └── not-a-plugin/        (no entry point, silently skipped)
//!     └── notes.txt
//! ```

pub mod discovery;
pub mod registry;
pub mod types;

pub use discovery::{parse_commands_from_help, scan_plugins, DescribeOutcome, DISCOVERY_TIMEOUT};
pub use registry::{PluginRegistry, ToolName};
pub use types::{CommandSchema, ParamType, ParameterSpec, PluginDescriptor};
