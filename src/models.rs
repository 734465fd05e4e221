//! Data structures carried by install links.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::Channel;

/// Descriptor of the plugin to install, embedded in `schema=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSchema {
    pub identifier: String,
    pub name: String,
    pub author: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    pub config: ConnectionConfig,
}

/// How the host talks to the installed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    Stdio {
        command: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        args: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env: Option<BTreeMap<String, String>>,
    },
    Http {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },
}

impl ConnectionConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConnectionConfig::Stdio { .. } => "stdio",
            ConnectionConfig::Http { .. } => "http",
        }
    }
}

/// Declared origin of an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolSource {
    Official,
    Community,
    ThirdParty,
    GithubOfficial,
    Developer,
}

impl ProtocolSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolSource::Official => "official",
            ProtocolSource::Community => "community",
            ProtocolSource::ThirdParty => "third_party",
            ProtocolSource::GithubOfficial => "github_official",
            ProtocolSource::Developer => "developer",
        }
    }
}

impl FromStr for ProtocolSource {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "official" => Ok(ProtocolSource::Official),
            "community" => Ok(ProtocolSource::Community),
            "third_party" => Ok(ProtocolSource::ThirdParty),
            "github_official" => Ok(ProtocolSource::GithubOfficial),
            "developer" => Ok(ProtocolSource::Developer),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

impl fmt::Display for ProtocolSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugin kind named by the `type` parameter. Only MCP servers today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginKind {
    Mcp,
}

impl PluginKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginKind::Mcp => "mcp",
        }
    }
}

impl FromStr for PluginKind {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcp" => Ok(PluginKind::Mcp),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolAction {
    Install,
    Configure,
    Update,
}

impl ProtocolAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolAction::Install => "install",
            ProtocolAction::Configure => "configure",
            ProtocolAction::Update => "update",
        }
    }
}

impl FromStr for ProtocolAction {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" => Ok(ProtocolAction::Install),
            "configure" => Ok(ProtocolAction::Configure),
            "update" => Ok(ProtocolAction::Update),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// First route segment. Current links use `plugin`, legacy ones name the plugin type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteCategory {
    Plugin,
    Mcp,
}

impl RouteCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            RouteCategory::Plugin => "plugin",
            RouteCategory::Mcp => "mcp",
        }
    }
}

impl FromStr for RouteCategory {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plugin" => Ok(RouteCategory::Plugin),
            "mcp" => Ok(RouteCategory::Mcp),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown tag: {0}")]
pub struct UnknownTag(pub String);

/// Optional install hints accepted by both link grammars.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub auto_config: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset_config: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_platform: Option<SourcePlatform>,
}

/// Site or tool that produced the link, kept for statistics and verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePlatform {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl InstallOptions {
    pub fn is_empty(&self) -> bool {
        *self == InstallOptions::default()
    }
}

/// Input for generating a current-format install link.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallRequest {
    pub id: String,
    pub schema: PluginSchema,
    pub market_id: Option<String>,
    pub meta_params: BTreeMap<String, String>,
    pub source: Option<ProtocolSource>,
    pub options: InstallOptions,
}

impl InstallRequest {
    pub fn new(schema: PluginSchema) -> Self {
        Self {
            id: schema.identifier.clone(),
            schema,
            market_id: None,
            meta_params: BTreeMap::new(),
            source: None,
            options: InstallOptions::default(),
        }
    }
}

/// Payload of a link carrying an embedded schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaPayload {
    pub id: String,
    pub schema: PluginSchema,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_params: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ProtocolSource>,
    #[serde(flatten)]
    pub options: InstallOptions,
}

/// Payload of a legacy identifier-only link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyInstallParams {
    pub identifier: String,
    pub source: ProtocolSource,
    #[serde(flatten)]
    pub options: InstallOptions,
}

impl LegacyInstallParams {
    pub fn new(identifier: impl Into<String>, source: ProtocolSource) -> Self {
        Self {
            identifier: identifier.into(),
            source,
            options: InstallOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum InstallPayload {
    Schema(SchemaPayload),
    Legacy(LegacyInstallParams),
}

/// A decoded install link.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProtocolUrl {
    pub channel: Channel,
    pub category: RouteCategory,
    #[serde(rename = "type")]
    pub kind: PluginKind,
    pub action: ProtocolAction,
    pub payload: InstallPayload,
}

impl ParsedProtocolUrl {
    pub fn plugin_id(&self) -> &str {
        match &self.payload {
            InstallPayload::Schema(p) => &p.id,
            InstallPayload::Legacy(p) => &p.identifier,
        }
    }

    pub fn schema(&self) -> Option<&PluginSchema> {
        match &self.payload {
            InstallPayload::Schema(p) => Some(&p.schema),
            InstallPayload::Legacy(_) => None,
        }
    }

    pub fn market_id(&self) -> Option<&str> {
        match &self.payload {
            InstallPayload::Schema(p) => p.market_id.as_deref(),
            InstallPayload::Legacy(_) => None,
        }
    }

    pub fn meta_params(&self) -> Option<&BTreeMap<String, String>> {
        match &self.payload {
            InstallPayload::Schema(p) => Some(&p.meta_params),
            InstallPayload::Legacy(_) => None,
        }
    }

    pub fn options(&self) -> &InstallOptions {
        match &self.payload {
            InstallPayload::Schema(p) => &p.options,
            InstallPayload::Legacy(p) => &p.options,
        }
    }

    /// Effective source. Schema links that declare none are treated as third party.
    pub fn source(&self) -> ProtocolSource {
        match &self.payload {
            InstallPayload::Schema(p) => p.source.unwrap_or(ProtocolSource::ThirdParty),
            InstallPayload::Legacy(p) => p.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tags_round_trip_through_from_str() {
        for source in [
            ProtocolSource::Official,
            ProtocolSource::Community,
            ProtocolSource::ThirdParty,
            ProtocolSource::GithubOfficial,
            ProtocolSource::Developer,
        ] {
            assert_eq!(source.as_str().parse::<ProtocolSource>(), Ok(source));
        }
        assert!("OFFICIAL".parse::<ProtocolSource>().is_err());
    }

    #[test]
    fn test_connection_config_serializes_with_type_tag() {
        let config = ConnectionConfig::Http {
            url: "https://api.example.com/mcp".to_string(),
            headers: None,
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["type"], "http");
        assert_eq!(json["url"], "https://api.example.com/mcp");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn test_install_options_skip_defaults() {
        let json = serde_json::to_value(InstallOptions::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
        assert!(InstallOptions::default().is_empty());
    }
}
