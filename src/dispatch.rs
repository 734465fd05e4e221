//! Routing of raw deep links to the installation workflow.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::codec::parse_protocol_url;
use crate::models::{
    InstallOptions, ParsedProtocolUrl, PluginKind, PluginSchema, ProtocolAction, ProtocolSource,
};

/// Message shown for every link that cannot be routed. Parse details stay in the logs.
pub const INVALID_LINK_MESSAGE: &str = "invalid install link";

/// Event handed to the installation workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallRequestEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub data: InstallRequestData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallRequestData {
    pub plugin_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PluginSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_id: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub meta_params: BTreeMap<String, String>,
    pub source: ProtocolSource,
    pub requires_confirmation: bool,
    /// Original link, kept for audit.
    pub source_url: String,
    #[serde(flatten)]
    pub options: InstallOptions,
}

impl InstallRequestEvent {
    pub const TYPE: &'static str = "install-request";

    pub fn from_parsed(parsed: &ParsedProtocolUrl, source_url: &str) -> Self {
        let source = parsed.source();
        Self {
            event_type: Self::TYPE,
            data: InstallRequestData {
                plugin_id: parsed.plugin_id().to_string(),
                schema: parsed.schema().cloned(),
                market_id: parsed.market_id().map(String::from),
                meta_params: parsed.meta_params().cloned().unwrap_or_default(),
                source,
                requires_confirmation: source.requires_confirmation(),
                source_url: source_url.to_string(),
                options: parsed.options().clone(),
            },
        }
    }

    pub fn display_name(&self) -> &str {
        self.data
            .schema
            .as_ref()
            .map(|schema| schema.name.as_str())
            .unwrap_or(&self.data.plugin_id)
    }
}

/// Acknowledgement sent back to the transport once a link has been handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolUrlHandled {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub url: String,
}

impl ProtocolUrlHandled {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            url: url.into(),
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            url: url.into(),
        }
    }
}

/// Receiver of validated install requests. Accepting the hand-off is all that is
/// awaited; confirmation and installation happen later inside the workflow.
#[async_trait]
pub trait InstallWorkflow: Send + Sync {
    async fn deliver(&self, event: InstallRequestEvent) -> Result<(), DeliveryError>;
}

#[async_trait]
impl<W: InstallWorkflow + ?Sized> InstallWorkflow for std::sync::Arc<W> {
    async fn deliver(&self, event: InstallRequestEvent) -> Result<(), DeliveryError> {
        (**self).deliver(event).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("Workflow is not accepting requests")]
    Closed,
    #[error("Too many pending install requests (limit {0})")]
    QueueFull(usize),
    #[error("Workflow declined the request: {0}")]
    Declined(String),
}

/// The plugin type and action a dispatcher handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub kind: PluginKind,
    pub action: ProtocolAction,
}

impl Route {
    pub fn install() -> Self {
        Self {
            kind: PluginKind::Mcp,
            action: ProtocolAction::Install,
        }
    }

    fn matches(&self, parsed: &ParsedProtocolUrl) -> bool {
        parsed.kind == self.kind && parsed.action == self.action
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind.as_str(), self.action.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Routing,
    Delivered,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Unparseable,
    RouteMismatch { kind: PluginKind, action: ProtocolAction },
    Workflow(DeliveryError),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Unparseable => write!(f, "unparseable link"),
            RejectReason::RouteMismatch { kind, action } => {
                write!(f, "unhandled route {}/{}", kind.as_str(), action.as_str())
            }
            RejectReason::Workflow(e) => write!(f, "{e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered(InstallRequestEvent),
    Rejected(RejectReason),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered(_))
    }

    /// Acknowledgement for a rejected link. Delivered links are acknowledged by the
    /// workflow once the user has answered.
    pub fn report(&self, url: &str) -> Option<ProtocolUrlHandled> {
        match self {
            DispatchOutcome::Delivered(_) => None,
            DispatchOutcome::Rejected(RejectReason::Workflow(e)) => {
                Some(ProtocolUrlHandled::failed(url, e.to_string()))
            }
            DispatchOutcome::Rejected(_) => Some(ProtocolUrlHandled::failed(url, INVALID_LINK_MESSAGE)),
        }
    }
}

/// Stateless router; every call runs its own `idle -> routing -> delivered|rejected`
/// machine, so one dispatcher can serve concurrent links.
#[derive(Debug, Clone)]
pub struct Dispatcher<W> {
    route: Route,
    workflow: W,
}

impl<W: InstallWorkflow> Dispatcher<W> {
    pub fn new(route: Route, workflow: W) -> Self {
        Self { route, workflow }
    }

    pub fn install(workflow: W) -> Self {
        Self::new(Route::install(), workflow)
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn workflow(&self) -> &W {
        &self.workflow
    }

    pub async fn dispatch(&self, url: &str) -> DispatchOutcome {
        let mut run = DispatchRun::new(self.route);
        run.advance(DispatchState::Routing);

        let Some(parsed) = parse_protocol_url(url) else {
            return run.reject(RejectReason::Unparseable);
        };

        if !self.route.matches(&parsed) {
            return run.reject(RejectReason::RouteMismatch {
                kind: parsed.kind,
                action: parsed.action,
            });
        }

        let event = InstallRequestEvent::from_parsed(&parsed, url);
        match self.workflow.deliver(event.clone()).await {
            Ok(()) => {
                tracing::debug!(
                    plugin_id = %event.data.plugin_id,
                    source = %event.data.source,
                    requires_confirmation = event.data.requires_confirmation,
                    "install request delivered"
                );
                run.advance(DispatchState::Delivered);
                DispatchOutcome::Delivered(event)
            }
            Err(e) => run.reject(RejectReason::Workflow(e)),
        }
    }
}

struct DispatchRun {
    route: Route,
    state: DispatchState,
}

impl DispatchRun {
    fn new(route: Route) -> Self {
        Self {
            route,
            state: DispatchState::Idle,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        tracing::trace!(route = %self.route, from = ?self.state, to = ?next, "dispatch transition");
        self.state = next;
    }

    fn reject(&mut self, reason: RejectReason) -> DispatchOutcome {
        self.advance(DispatchState::Rejected);
        tracing::warn!(route = %self.route, %reason, "install link rejected");
        DispatchOutcome::Rejected(reason)
    }
}
