//! Tool-descriptor synthesis.
//!
//! Converts a discovered command into the protocol-agnostic tool descriptor
//! advertised to clients. The double-underscore tool name exists to satisfy
//! client-side name validation (`^[A-Za-z0-9_-]{1,64}$`) while staying
//! visually distinct from ordinary single underscores.

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::plugins::types::{CommandSchema, ParamType, ParameterSpec};

/// The externally advertised unit of invocation. Synthesized once at
/// startup and exposed read-only to the protocol layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON Schema object for the tool's arguments.
    pub input_schema: Value,
}

/// Build the tool descriptor for one plugin command.
pub fn synthesize_tool(plugin_name: &str, command: &CommandSchema) -> ToolDescriptor {
    let name = format!("{}__{}", plugin_name, command.name);

    let description = match command.description.as_deref() {
        Some(d) if !d.trim().is_empty() => d.to_string(),
        _ => format!("Execute {} {} command", plugin_name, command.name),
    };

    ToolDescriptor {
        name,
        description,
        input_schema: parameters_to_schema(&command.parameters),
    }
}

/// Build a JSON Schema object from parameter specs.
///
/// An empty spec list yields the empty-object schema (no properties,
/// nothing required), which is also what fallback-tier commands get:
/// callers may then invoke with no arguments only.
pub fn parameters_to_schema(parameters: &[ParameterSpec]) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<Value> = Vec::new();

    for param in parameters {
        let mut property = Map::new();
        property.insert("type".into(), json!(param.param_type.as_json_type()));

        if let Some(desc) = param.description.as_deref() {
            if !desc.is_empty() {
                property.insert("description".into(), json!(desc));
            }
        }
        if let Some(default) = &param.default {
            if !default.is_null() {
                property.insert("default".into(), default.clone());
            }
        }
        // No nested element-type introspection: arrays are arrays of strings.
        if param.param_type == ParamType::Array {
            property.insert("items".into(), json!({ "type": "string" }));
        }

        properties.insert(param.name.clone(), Value::Object(property));

        if param.required {
            required.push(json!(param.name));
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Check a synthesized tool name against the client name constraint.
///
/// Names that fail are dropped at registration with a warning rather than
/// advertised and rejected client-side.
pub fn is_valid_tool_name(name: &str) -> bool {
    let re = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
    re.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn param(name: &str, param_type: ParamType, required: bool) -> ParameterSpec {
        ParameterSpec {
            name: name.to_string(),
            param_type,
            description: None,
            required,
            default: None,
        }
    }

    #[test]
    fn test_tool_name_is_double_underscore() {
        let tool = synthesize_tool("p", &CommandSchema::bare("c"));
        assert_eq!(tool.name, "p__c");
    }

    #[test]
    fn test_default_description() {
        let tool = synthesize_tool("devops", &CommandSchema::bare("deploy"));
        assert_eq!(tool.description, "Execute devops deploy command");
    }

    #[test]
    fn test_empty_description_substituted() {
        let command = CommandSchema {
            name: "deploy".to_string(),
            description: Some(String::new()),
            parameters: Vec::new(),
        };
        let tool = synthesize_tool("devops", &command);
        assert_eq!(tool.description, "Execute devops deploy command");
    }

    #[test]
    fn test_declared_description_kept() {
        let command = CommandSchema {
            name: "deploy".to_string(),
            description: Some("Deploy an application".to_string()),
            parameters: Vec::new(),
        };
        let tool = synthesize_tool("devops", &command);
        assert_eq!(tool.description, "Deploy an application");
    }

    #[test]
    fn test_empty_parameters_empty_object_schema() {
        let schema = parameters_to_schema(&[]);
        assert_eq!(
            schema,
            json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            })
        );
    }

    #[test]
    fn test_schema_properties_and_required() {
        let schema = parameters_to_schema(&[
            param("app-name", ParamType::String, true),
            param("replicas", ParamType::Integer, false),
        ]);

        assert_eq!(schema["properties"]["app-name"]["type"], "string");
        assert_eq!(schema["properties"]["replicas"]["type"], "integer");
        assert_eq!(schema["required"], json!(["app-name"]));
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_schema_array_items_are_strings() {
        let schema = parameters_to_schema(&[param("tags", ParamType::Array, false)]);
        assert_eq!(schema["properties"]["tags"]["items"], json!({"type": "string"}));
    }

    #[test]
    fn test_schema_default_and_description_carried() {
        let spec = ParameterSpec {
            name: "environment".to_string(),
            param_type: ParamType::String,
            description: Some("Deployment environment".to_string()),
            required: false,
            default: Some(json!("production")),
        };
        let schema = parameters_to_schema(&[spec]);
        let prop = &schema["properties"]["environment"];
        assert_eq!(prop["description"], "Deployment environment");
        assert_eq!(prop["default"], "production");
    }

    #[test]
    fn test_schema_null_default_omitted() {
        let spec = ParameterSpec {
            name: "version".to_string(),
            param_type: ParamType::String,
            description: None,
            required: false,
            default: Some(Value::Null),
        };
        let schema = parameters_to_schema(&[spec]);
        assert!(schema["properties"]["version"].get("default").is_none());
    }

    #[test]
    fn test_is_valid_tool_name() {
        assert!(is_valid_tool_name("devops__deploy"));
        assert!(is_valid_tool_name("a"));
        assert!(is_valid_tool_name(&"x".repeat(64)));

        assert!(!is_valid_tool_name(""));
        assert!(!is_valid_tool_name(&"x".repeat(65)));
        assert!(!is_valid_tool_name("devops.deploy"));
        assert!(!is_valid_tool_name("has space"));
    }
}
