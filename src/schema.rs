//! Structural validation of embedded plugin descriptors.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::{ConnectionConfig, PluginSchema};

/// Validate an untyped descriptor. Checks run in order and stop at the first failure;
/// no partially validated schema is ever returned.
pub fn validate(raw: &Value) -> Result<PluginSchema, SchemaError> {
    let obj = raw.as_object().ok_or(SchemaError::NotAnObject)?;

    let identifier = required_str(obj, "identifier")?;
    let name = required_str(obj, "name")?;
    let author = required_str(obj, "author")?;
    let description = required_str(obj, "description")?;
    let version = required_str(obj, "version")?;

    let homepage = match obj.get("homepage") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(SchemaError::InvalidField("homepage")),
    };

    let config = obj
        .get("config")
        .and_then(Value::as_object)
        .ok_or(SchemaError::MissingField("config"))?;

    let config = match config.get("type").and_then(Value::as_str) {
        Some("stdio") => validate_stdio(config)?,
        Some("http") => validate_http(config)?,
        Some(other) => return Err(SchemaError::UnsupportedConfigType(other.to_string())),
        None => return Err(SchemaError::MissingField("config.type")),
    };

    Ok(PluginSchema {
        identifier,
        name,
        author,
        description,
        version,
        homepage,
        config,
    })
}

fn validate_stdio(config: &Map<String, Value>) -> Result<ConnectionConfig, SchemaError> {
    let command = required_str(config, "command")?;

    let args = match config.get("args") {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .map(|item| item.as_str().map(String::from))
                .collect::<Option<Vec<_>>>()
                .ok_or(SchemaError::InvalidField("args"))?,
        ),
        Some(_) => return Err(SchemaError::InvalidField("args")),
    };

    let env = string_map(config, "env")?;

    Ok(ConnectionConfig::Stdio { command, args, env })
}

fn validate_http(config: &Map<String, Value>) -> Result<ConnectionConfig, SchemaError> {
    let url = config
        .get("url")
        .and_then(Value::as_str)
        .ok_or(SchemaError::MissingField("url"))?;

    // Url::parse without a base only accepts absolute URLs.
    url::Url::parse(url).map_err(|e| SchemaError::InvalidUrl(format!("{url}: {e}")))?;

    let headers = string_map(config, "headers")?;

    Ok(ConnectionConfig::Http {
        url: url.to_string(),
        headers,
    })
}

fn required_str(obj: &Map<String, Value>, key: &'static str) -> Result<String, SchemaError> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(SchemaError::EmptyField(key)),
        Some(_) => Err(SchemaError::InvalidField(key)),
        None => Err(SchemaError::MissingField(key)),
    }
}

fn string_map(
    obj: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<BTreeMap<String, String>>, SchemaError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(entries)) => entries
            .iter()
            .map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect::<Option<BTreeMap<_, _>>>()
            .map(Some)
            .ok_or(SchemaError::InvalidField(key)),
        Some(_) => Err(SchemaError::InvalidField(key)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema is not a JSON object")]
    NotAnObject,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Field must not be empty: {0}")]
    EmptyField(&'static str),
    #[error("Field has the wrong type: {0}")]
    InvalidField(&'static str),
    #[error("Unsupported connection type: {0}")]
    UnsupportedConfigType(String),
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stdio_schema() -> Value {
        json!({
            "identifier": "edgeone-mcp",
            "name": "EdgeOne MCP",
            "author": "Higress Team",
            "description": "EdgeOne API integration",
            "version": "1.0.0",
            "homepage": "https://github.com/higress/edgeone-mcp",
            "config": {
                "type": "stdio",
                "command": "npx",
                "args": ["-y", "@higress/edgeone-mcp"],
                "env": { "NODE_ENV": "production" }
            }
        })
    }

    #[test]
    fn test_validate_stdio_schema() {
        let schema = validate(&stdio_schema()).unwrap();
        assert_eq!(schema.identifier, "edgeone-mcp");
        assert_eq!(schema.homepage.as_deref(), Some("https://github.com/higress/edgeone-mcp"));
        match schema.config {
            ConnectionConfig::Stdio { command, args, env } => {
                assert_eq!(command, "npx");
                assert_eq!(args.unwrap(), vec!["-y", "@higress/edgeone-mcp"]);
                assert_eq!(env.unwrap()["NODE_ENV"], "production");
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn test_validate_http_schema() {
        let raw = json!({
            "identifier": "awesome-api",
            "name": "Awesome API",
            "author": "Smithery",
            "description": "Awesome API integration",
            "version": "2.0.0",
            "config": {
                "type": "http",
                "url": "https://api.smithery.ai/v1/mcp",
                "headers": { "Authorization": "Bearer token123" }
            }
        });
        let schema = validate(&raw).unwrap();
        assert_eq!(schema.config.type_name(), "http");
        assert_eq!(schema.homepage, None);
    }

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(validate(&json!([1, 2])), Err(SchemaError::NotAnObject));
        assert_eq!(validate(&json!("schema")), Err(SchemaError::NotAnObject));
    }

    #[test]
    fn test_rejects_missing_fields_in_order() {
        assert_eq!(
            validate(&json!({ "identifier": "test" })),
            Err(SchemaError::MissingField("name"))
        );

        let mut raw = stdio_schema();
        raw["author"] = json!("");
        assert_eq!(validate(&raw), Err(SchemaError::EmptyField("author")));

        let mut raw = stdio_schema();
        raw["version"] = json!(1);
        assert_eq!(validate(&raw), Err(SchemaError::InvalidField("version")));
    }

    #[test]
    fn test_rejects_unknown_config_type() {
        let mut raw = stdio_schema();
        raw["config"] = json!({ "type": "sse", "url": "https://example.com" });
        assert_eq!(
            validate(&raw),
            Err(SchemaError::UnsupportedConfigType("sse".to_string()))
        );
    }

    #[test]
    fn test_rejects_bad_stdio_fields() {
        let mut raw = stdio_schema();
        raw["config"]["command"] = json!("");
        assert_eq!(validate(&raw), Err(SchemaError::EmptyField("command")));

        let mut raw = stdio_schema();
        raw["config"]["args"] = json!(["ok", 3]);
        assert_eq!(validate(&raw), Err(SchemaError::InvalidField("args")));

        let mut raw = stdio_schema();
        raw["config"]["env"] = json!({ "PORT": 8080 });
        assert_eq!(validate(&raw), Err(SchemaError::InvalidField("env")));
    }

    #[test]
    fn test_rejects_relative_http_url() {
        let mut raw = stdio_schema();
        raw["config"] = json!({ "type": "http", "url": "not-a-valid-url" });
        assert!(matches!(validate(&raw), Err(SchemaError::InvalidUrl(_))));
    }
}
