//! Gateway configuration.
//!
//! Configuration is assembled from three layers, lowest precedence first:
//! built-in defaults, `TOOLGATE_*` environment variables (a `.env` file is
//! honored via dotenvy in `main`), and command-line flags.
//!
//! The bind address defaults to loopback. Binding more broadly requires the
//! explicit `allow_external` opt-in, which switches the host to `0.0.0.0`.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::{GatewayError, Result};

/// Environment variable naming the plugin root directory.
pub const ENV_PLUGINS_DIR: &str = "TOOLGATE_PLUGINS_DIR";
/// Environment variable naming the bind host.
pub const ENV_HOST: &str = "TOOLGATE_HOST";
/// Environment variable naming the bind port.
pub const ENV_PORT: &str = "TOOLGATE_PORT";

/// Runtime configuration for the gateway process.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory whose immediate subdirectories are scanned for plugins.
    pub plugins_dir: PathBuf,

    /// Host to bind the SSE transport to. Ignored when `allow_external` is set.
    pub host: String,

    /// Port for the SSE transport.
    pub port: u16,

    /// Bind to all interfaces instead of `host`. Off by default.
    pub allow_external: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            host: "127.0.0.1".to_string(),
            port: 8000,
            allow_external: false,
        }
    }
}

impl GatewayConfig {
    /// Build a configuration from defaults overlaid with `TOOLGATE_*`
    /// environment variables. Unparseable values are ignored with their
    /// defaults kept; a bad port is not worth refusing to start over.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_PLUGINS_DIR) {
            if !dir.trim().is_empty() {
                config.plugins_dir = PathBuf::from(dir);
            }
        }
        if let Ok(host) = std::env::var(ENV_HOST) {
            if !host.trim().is_empty() {
                config.host = host;
            }
        }
        if let Ok(port) = std::env::var(ENV_PORT) {
            if let Ok(port) = port.trim().parse::<u16>() {
                config.port = port;
            }
        }

        config
    }

    /// The host actually bound, accounting for the external opt-in.
    pub fn bind_host(&self) -> &str {
        if self.allow_external {
            "0.0.0.0"
        } else {
            &self.host
        }
    }

    /// Resolve the socket address for the SSE transport.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_host(), self.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid bind address: {}", e)))
    }
}

/// Default plugin root: `~/.toolgate/plugins`, falling back to `./plugins`
/// when no home directory can be resolved.
fn default_plugins_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".toolgate").join("plugins"))
        .unwrap_or_else(|| PathBuf::from("plugins"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
        assert!(!config.allow_external);
        assert!(config.plugins_dir.ends_with("plugins"));
    }

    #[test]
    fn test_bind_host_loopback_by_default() {
        let config = GatewayConfig::default();
        assert_eq!(config.bind_host(), "127.0.0.1");
    }

    #[test]
    fn test_bind_host_allow_external() {
        let config = GatewayConfig {
            allow_external: true,
            ..Default::default()
        };
        assert_eq!(config.bind_host(), "0.0.0.0");
    }

    #[test]
    fn test_bind_addr() {
        let config = GatewayConfig {
            port: 9000,
            ..Default::default()
        };
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 9000);
        assert!(addr.ip().is_loopback());
    }

    #[test]
    fn test_bind_addr_invalid_host() {
        let config = GatewayConfig {
            host: "not a host".to_string(),
            ..Default::default()
        };
        assert!(config.bind_addr().is_err());
    }

    // Env vars are process-wide, so all from_env assertions live in a single
    // test to avoid races with parallel test threads.
    #[test]
    fn test_from_env_overrides() {
        std::env::set_var(ENV_PLUGINS_DIR, "/tmp/tg-plugins");
        std::env::set_var(ENV_HOST, "0.0.0.0");
        std::env::set_var(ENV_PORT, "9100");

        let config = GatewayConfig::from_env();
        assert_eq!(config.plugins_dir, PathBuf::from("/tmp/tg-plugins"));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9100);

        // A non-numeric port must not panic or override the default.
        std::env::set_var(ENV_PORT, "not-a-port");
        std::env::remove_var(ENV_PLUGINS_DIR);
        std::env::remove_var(ENV_HOST);
        let config = GatewayConfig::from_env();
        assert_eq!(config.port, 8000);

        std::env::remove_var(ENV_PORT);
    }
}
