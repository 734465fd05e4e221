//! Installation workflows that receive dispatched install requests.
//!
//! [`ConfirmationWorkflow`] keeps at most one confirmation open at a time and decides
//! what happens to requests that arrive meanwhile. [`ChannelWorkflow`] forwards
//! requests to an async consumer.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::dispatch::{DeliveryError, InstallRequestEvent, InstallWorkflow, ProtocolUrlHandled};

pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

/// What to do with a request that arrives while another one is pending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    /// Keep requests in arrival order.
    #[default]
    Queue,
    /// The newest request wins; the one it displaces is reported as superseded.
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowState {
    Idle,
    Confirming(InstallRequestEvent),
    Installing(InstallRequestEvent),
}

impl WorkflowState {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Confirming(_) => "confirming",
            WorkflowState::Installing(_) => "installing",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: WorkflowState,
    queue: VecDeque<InstallRequestEvent>,
    reports: Vec<ProtocolUrlHandled>,
}

#[derive(Debug)]
pub struct ConfirmationWorkflow {
    policy: OverlapPolicy,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for ConfirmationWorkflow {
    fn default() -> Self {
        Self::new(OverlapPolicy::default())
    }
}

impl ConfirmationWorkflow {
    pub fn new(policy: OverlapPolicy) -> Self {
        Self::with_capacity(policy, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(policy: OverlapPolicy, capacity: usize) -> Self {
        Self {
            policy,
            capacity,
            inner: Mutex::new(Inner {
                state: WorkflowState::Idle,
                queue: VecDeque::new(),
                reports: Vec::new(),
            }),
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state.clone()
    }

    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Request currently waiting for the user's answer.
    pub fn pending(&self) -> Option<InstallRequestEvent> {
        match &self.inner.lock().state {
            WorkflowState::Confirming(event) => Some(event.clone()),
            _ => None,
        }
    }

    /// User accepted the pending request. Returns it for installation.
    pub fn confirm(&self) -> Result<InstallRequestEvent, WorkflowError> {
        let mut inner = self.inner.lock();
        let WorkflowState::Confirming(event) = &inner.state else {
            return Err(WorkflowError::InvalidTransition {
                from: inner.state.name(),
                to: "installing",
            });
        };
        let event = event.clone();
        inner.state = WorkflowState::Installing(event.clone());
        tracing::debug!(plugin_id = %event.data.plugin_id, "install confirmed");
        Ok(event)
    }

    /// User dismissed the pending request.
    pub fn dismiss(&self) -> Result<ProtocolUrlHandled, WorkflowError> {
        let mut inner = self.inner.lock();
        let WorkflowState::Confirming(event) = &inner.state else {
            return Err(WorkflowError::InvalidTransition {
                from: inner.state.name(),
                to: "idle",
            });
        };
        let report = ProtocolUrlHandled::failed(&event.data.source_url, "dismissed by user");
        tracing::debug!(plugin_id = %event.data.plugin_id, "install dismissed");
        advance(&mut inner);
        Ok(report)
    }

    /// Installer finished the confirmed request.
    pub fn complete(&self, result: Result<(), String>) -> Result<ProtocolUrlHandled, WorkflowError> {
        let mut inner = self.inner.lock();
        let WorkflowState::Installing(event) = &inner.state else {
            return Err(WorkflowError::InvalidTransition {
                from: inner.state.name(),
                to: "idle",
            });
        };
        let url = event.data.source_url.clone();
        let report = match result {
            Ok(()) => ProtocolUrlHandled::ok(url),
            Err(error) => ProtocolUrlHandled::failed(url, error),
        };
        advance(&mut inner);
        Ok(report)
    }

    /// Drain acknowledgements for requests that were superseded before the user
    /// answered. Reports for dismissed and completed requests are returned by
    /// [`dismiss`](Self::dismiss) and [`complete`](Self::complete) instead.
    pub fn take_reports(&self) -> Vec<ProtocolUrlHandled> {
        std::mem::take(&mut self.inner.lock().reports)
    }
}

/// Open the next queued request, if any.
fn advance(inner: &mut Inner) {
    inner.state = match inner.queue.pop_front() {
        Some(next) => WorkflowState::Confirming(next),
        None => WorkflowState::Idle,
    };
}

#[async_trait]
impl InstallWorkflow for ConfirmationWorkflow {
    async fn deliver(&self, event: InstallRequestEvent) -> Result<(), DeliveryError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if matches!(inner.state, WorkflowState::Idle) {
            inner.state = WorkflowState::Confirming(event);
            return Ok(());
        }

        match self.policy {
            OverlapPolicy::Queue => {
                if inner.queue.len() >= self.capacity {
                    return Err(DeliveryError::QueueFull(self.capacity));
                }
                inner.queue.push_back(event);
            }
            OverlapPolicy::Replace => {
                let superseded = match &mut inner.state {
                    WorkflowState::Confirming(pending) => Some(std::mem::replace(pending, event)),
                    _ => {
                        let previous = inner.queue.pop_back();
                        inner.queue.clear();
                        inner.queue.push_back(event);
                        previous
                    }
                };
                if let Some(old) = superseded {
                    tracing::debug!(plugin_id = %old.data.plugin_id, "install request superseded");
                    inner.reports.push(ProtocolUrlHandled::failed(
                        old.data.source_url,
                        "superseded by a newer install request",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Cannot move from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Forwards install requests into a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelWorkflow {
    tx: mpsc::Sender<InstallRequestEvent>,
}

impl ChannelWorkflow {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InstallRequestEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl InstallWorkflow for ChannelWorkflow {
    async fn deliver(&self, event: InstallRequestEvent) -> Result<(), DeliveryError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull(self.tx.max_capacity()),
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}
