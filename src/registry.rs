//! Interaction registry.
//!
//! Holds the interactions registered for one test run together with the
//! requests the mock actually received. Registering an interaction with the
//! same method, normalized path and query pattern as an existing one replaces
//! it (last write wins), so a scenario can override an earlier, more general
//! expectation.

use crate::error::{ContractError, Result};
use crate::interaction::Interaction;
use crate::path::PathTemplate;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

/// Opaque reference to a registered interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct InteractionHandle(u64);

/// A request received by the mock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordedRequest {
    pub method: String,
    /// Normalized path
    pub path: String,
    pub query: Option<String>,
    pub body: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Mock service lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing registered yet
    Idle,
    /// Interactions registered, requests being handled
    Serving,
    /// Registry closed; nothing more can be registered
    TornDown,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Serving => "serving",
            LifecycleState::TornDown => "torn down",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) handle: InteractionHandle,
    pub(crate) interaction: Interaction,
    pub(crate) template: PathTemplate,
    key: String,
    received: Vec<RecordedRequest>,
}

/// Interactions registered for a single test run.
#[derive(Debug)]
pub struct InteractionRegistry {
    /// Oldest first
    entries: Vec<Entry>,
    unexpected: Vec<RecordedRequest>,
    /// Never reset, so stale handles cannot alias new entries
    next_handle: u64,
    state: LifecycleState,
}

impl Default for InteractionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            unexpected: Vec::new(),
            next_handle: 0,
            state: LifecycleState::Idle,
        }
    }

    /// Validate and register an interaction, replacing any entry with the
    /// same key.
    pub fn register(&mut self, mut interaction: Interaction) -> Result<InteractionHandle> {
        if self.state == LifecycleState::TornDown {
            return Err(ContractError::Lifecycle {
                operation: "register",
                state: self.state.to_string(),
            });
        }

        let template = interaction.validate()?;
        interaction.request.method = interaction.request.method.to_uppercase();
        let key = interaction.request.key(&template);

        if let Some(pos) = self.entries.iter().position(|e| e.key == key) {
            let replaced = self.entries.remove(pos);
            info!(
                key = %key,
                replaced = %replaced.interaction.description,
                "Replacing previously registered interaction"
            );
        }

        let handle = InteractionHandle(self.next_handle);
        self.next_handle += 1;

        info!(
            description = %interaction.description,
            key = %key,
            "Registered interaction"
        );

        self.entries.push(Entry {
            handle,
            interaction,
            template,
            key,
            received: Vec::new(),
        });
        self.state = LifecycleState::Serving;

        Ok(handle)
    }

    /// Registered interactions, oldest first.
    pub fn all(&self) -> Vec<&Interaction> {
        self.entries.iter().map(|e| &e.interaction).collect()
    }

    /// Look up an interaction by handle. Replaced interactions are gone.
    pub fn get(&self, handle: InteractionHandle) -> Option<&Interaction> {
        self.entry(handle).map(|e| &e.interaction)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Requests matched to the interaction.
    pub fn received(&self, handle: InteractionHandle) -> Option<&[RecordedRequest]> {
        self.entry(handle).map(|e| e.received.as_slice())
    }

    /// How many requests matched the interaction (0 if unknown).
    pub fn times_received(&self, handle: InteractionHandle) -> usize {
        self.received(handle).map_or(0, <[RecordedRequest]>::len)
    }

    /// Requests that matched no interaction.
    pub fn unexpected(&self) -> &[RecordedRequest] {
        &self.unexpected
    }

    /// Check that every interaction was received exactly once and nothing
    /// unexpected arrived.
    pub fn invocation_report(&self) -> InvocationReport {
        let mut report = InvocationReport {
            unexpected: self.unexpected.clone(),
            ..InvocationReport::default()
        };

        for entry in &self.entries {
            match entry.received.len() {
                0 => report.missing.push(entry.interaction.description.clone()),
                1 => {}
                times => report.repeated.push(InvocationCount {
                    description: entry.interaction.description.clone(),
                    times,
                }),
            }
        }

        report
    }

    /// Forget all interactions and recordings. Does not reopen a torn-down
    /// registry.
    pub fn clear(&mut self) {
        debug!(interactions = self.entries.len(), "Clearing interaction registry");
        self.entries.clear();
        self.unexpected.clear();
        if self.state == LifecycleState::Serving {
            self.state = LifecycleState::Idle;
        }
    }

    /// Close the registry for good.
    pub fn tear_down(&mut self) {
        if self.state != LifecycleState::TornDown {
            info!(interactions = self.entries.len(), "Tearing down interaction registry");
        }
        self.entries.clear();
        self.unexpected.clear();
        self.state = LifecycleState::TornDown;
    }

    /// Entries, most recently registered first.
    pub(crate) fn newest_first(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().rev()
    }

    pub(crate) fn record(&mut self, handle: InteractionHandle, request: RecordedRequest) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.handle == handle) {
            entry.received.push(request);
        }
    }

    pub(crate) fn record_unexpected(&mut self, request: RecordedRequest) {
        self.unexpected.push(request);
    }

    fn entry(&self, handle: InteractionHandle) -> Option<&Entry> {
        self.entries.iter().find(|e| e.handle == handle)
    }
}

/// Interaction received more than once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationCount {
    pub description: String,
    pub times: usize,
}

/// Outcome of checking how the mock was exercised.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InvocationReport {
    /// Interactions never received
    pub missing: Vec<String>,
    /// Interactions received more than once
    pub repeated: Vec<InvocationCount>,
    /// Requests that matched nothing
    pub unexpected: Vec<RecordedRequest>,
}

impl InvocationReport {
    /// Every interaction received exactly once, nothing unexpected.
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty() && self.repeated.is_empty() && self.unexpected.is_empty()
    }
}

impl fmt::Display for InvocationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_satisfied() {
            return f.write_str("all interactions received exactly once");
        }
        for description in &self.missing {
            writeln!(f, "missing: {}", description)?;
        }
        for count in &self.repeated {
            writeln!(f, "received {} times: {}", count.times, count.description)?;
        }
        for request in &self.unexpected {
            let query = request.query.as_deref().map(|q| format!("?{}", q)).unwrap_or_default();
            writeln!(f, "unexpected: {} {}{}", request.method, request.path, query)?;
        }
        Ok(())
    }
}
