//! Protocol surface of the gateway.
//!
//! [`Gateway`] holds the discovered registry and the synthesized tool list
//! and implements the MCP server handler: `list_tools` advertises the
//! registry, `call_tool` dispatches to the execution engine. The tool list
//! is built once at startup and never mutated; plugins added to the
//! directory afterwards require a restart.

use std::sync::Arc;

use rmcp::{
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::executor::{Executor, ToolOutput};
use crate::metrics::Metrics;
use crate::plugins::registry::PluginRegistry;
use crate::schema::{is_valid_tool_name, synthesize_tool, ToolDescriptor};

/// Built-in tool reporting gateway status and metrics. The name carries no
/// `__` delimiter, so it can never collide with a plugin tool.
pub const HEALTH_TOOL: &str = "health_check";

/// The gateway service handed to each transport connection.
///
/// Cloning is cheap: the registry, metrics and tool list are shared, and the
/// registry is read-only after construction so no locks sit on the call path.
#[derive(Clone)]
pub struct Gateway {
    registry: Arc<PluginRegistry>,
    metrics: Arc<Metrics>,
    executor: Executor,
    tools: Arc<Vec<Tool>>,
}

impl Gateway {
    /// Synthesize the advertised tool list from a discovered registry.
    ///
    /// Commands whose synthesized name fails protocol validation are skipped
    /// with a warning rather than poisoning the whole list.
    pub fn new(registry: Arc<PluginRegistry>, metrics: Arc<Metrics>) -> Self {
        let mut tools = Vec::new();

        for descriptor in registry.plugins() {
            for command in &descriptor.commands {
                let tool = synthesize_tool(&descriptor.name, command);
                if !is_valid_tool_name(&tool.name) {
                    warn!(tool = %tool.name, "Skipping tool with protocol-invalid name");
                    continue;
                }
                info!(tool = %tool.name, "Registered tool");
                metrics.record_tool_registered();
                tools.push(to_protocol_tool(tool));
            }
        }

        tools.push(health_tool());

        Self {
            registry,
            metrics,
            executor: Executor::new(),
            tools: Arc::new(tools),
        }
    }

    /// Names of all advertised tools, in advertisement order.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_ref()).collect()
    }

    /// Dispatch one tool call. Every failure comes back as a
    /// [`ToolOutput::Error`]; the protocol layer never sees a fault.
    pub async fn run_tool(&self, name: &str, arguments: &Map<String, Value>) -> ToolOutput {
        self.metrics.record_call();

        if name == HEALTH_TOOL {
            return ToolOutput::Success(self.health_payload().to_string());
        }

        self.executor
            .execute(&self.registry, &self.metrics, name, arguments)
            .await
    }

    fn health_payload(&self) -> Value {
        json!({
            "status": "healthy",
            "plugins": self.registry.plugin_count(),
            "plugin_names": self.registry.plugin_names(),
            "metrics": self.metrics.snapshot(),
        })
    }
}

impl ServerHandler for Gateway {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Gateway exposing CLI plugins as tools. Tool names follow \
                 'plugin__command'; call 'health_check' for status and metrics."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tools.as_ref().clone(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();

        match self.run_tool(&request.name, &arguments).await {
            ToolOutput::Success(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
            ToolOutput::Error(message) => Ok(CallToolResult::error(vec![Content::text(message)])),
        }
    }
}

/// Convert a synthesized descriptor into the protocol tool type.
fn to_protocol_tool(descriptor: ToolDescriptor) -> Tool {
    let schema = match descriptor.input_schema {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Tool::new(descriptor.name, descriptor.description, Arc::new(schema))
}

fn health_tool() -> Tool {
    let schema = match json!({
        "type": "object",
        "properties": {},
        "additionalProperties": false,
    }) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Tool::new(
        HEALTH_TOOL,
        "Gateway health: plugin inventory and call metrics",
        Arc::new(schema),
    )
}
