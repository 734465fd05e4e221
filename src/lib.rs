//! mcplink - MCP plugin install links
//!
//! Parses, validates, generates and routes the deep links that ask a host
//! application to install an MCP plugin.

pub mod channel;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod models;
pub mod schema;
pub mod trust;
pub mod workflow;

pub use channel::Channel;
pub use codec::{generate_legacy_url, generate_protocol_url, parse_protocol_url, GenerateError, LegacyFormat};
pub use config::{Config, ConfigError};
pub use dispatch::{
    DeliveryError, DispatchOutcome, Dispatcher, InstallRequestEvent, InstallWorkflow, ProtocolUrlHandled,
    RejectReason, Route,
};
pub use models::{
    ConnectionConfig, InstallOptions, InstallPayload, InstallRequest, LegacyInstallParams, ParsedProtocolUrl,
    PluginSchema, ProtocolSource, SourcePlatform,
};
pub use schema::{validate, SchemaError};
pub use trust::is_source_trusted;
pub use workflow::{ChannelWorkflow, ConfirmationWorkflow, OverlapPolicy, WorkflowError, WorkflowState};
