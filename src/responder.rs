//! Mock responder.
//!
//! Answers incoming requests from the interactions in an
//! [`InteractionRegistry`]. Unmatched requests get a loud 500 response
//! describing the request and everything that was registered.

use crate::config::ServiceSettings;
use crate::interaction::{Interaction, ResponsePattern};
use crate::matcher;
use crate::path::{normalize_path, parse_query_string, split_path};
use crate::registry::{Entry, InteractionRegistry, LifecycleState, RecordedRequest};
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Content type for string bodies.
pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
/// Content type for structured bodies and diagnostics.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An incoming request, as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    pub method: String,
    /// Raw (possibly percent-encoded) path
    pub path: String,
    /// Raw query string, without `?`
    pub query: Option<String>,
    pub body: Option<String>,
}

impl MockRequest {
    /// A GET request for `path_and_query`, e.g. `/butter/bread?salted=yes`.
    pub fn get(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (path_and_query, None),
        };
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            query,
            body: None,
        }
    }
}

/// Response produced by the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: JSON_CONTENT_TYPE,
            body: body.to_string(),
        }
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Serves registered interactions.
#[derive(Debug, Clone)]
pub struct MockResponder {
    log_matches: bool,
    log_unmatched: bool,
}

impl Default for MockResponder {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
        }
    }
}

impl MockResponder {
    /// Create a responder using the logging flags from `settings`.
    pub fn new(settings: &ServiceSettings) -> Self {
        Self {
            log_matches: settings.log_matches,
            log_unmatched: settings.log_unmatched,
        }
    }

    /// Answer `request` from the registry, recording what was received.
    pub fn handle(
        &self,
        registry: &mut InteractionRegistry,
        request: &MockRequest,
    ) -> MockResponse {
        if registry.state() == LifecycleState::TornDown {
            warn!(method = %request.method, path = %request.path, "Request after teardown");
            return MockResponse::json(
                503,
                &json!({
                    "error": "mock service torn down",
                    "state": registry.state(),
                }),
            );
        }

        let method = request.method.to_uppercase();
        let segments = split_path(&request.path);
        let query = parse_query_string(request.query.as_deref().unwrap_or(""));

        let recorded = RecordedRequest {
            method: method.clone(),
            path: normalize_path(&request.path),
            query: request.query.clone(),
            body: request.body.clone(),
            received_at: Utc::now(),
        };

        let matched = registry
            .newest_first()
            .find(|entry| request_matches(entry, &method, &segments, &query))
            .map(|entry| {
                (
                    entry.handle,
                    entry.interaction.description.clone(),
                    entry.interaction.response.clone(),
                )
            });

        match matched {
            Some((handle, description, response)) => {
                if self.log_matches {
                    info!(
                        interaction = %description,
                        method = %method,
                        path = %recorded.path,
                        "Request matched interaction"
                    );
                }
                registry.record(handle, recorded);
                render_response(&response)
            }
            None => {
                if self.log_unmatched {
                    warn!(
                        method = %method,
                        path = %recorded.path,
                        query = ?request.query,
                        "No matching interaction found"
                    );
                }
                let diagnostic = unmatched_diagnostic(&recorded, &registry.all());
                registry.record_unexpected(recorded);
                MockResponse::json(500, &diagnostic)
            }
        }
    }
}

fn request_matches(
    entry: &Entry,
    method: &str,
    segments: &[String],
    query: &BTreeMap<String, String>,
) -> bool {
    let pattern = &entry.interaction.request;

    if !pattern.method.eq_ignore_ascii_case(method) {
        return false;
    }

    if let Some(mismatch) = entry.template.explain(segments, &pattern.path_params) {
        debug!(interaction = %entry.interaction.description, %mismatch, "Path mismatch");
        return false;
    }

    for (name, expected) in pattern.query.iter().flatten() {
        let Some(actual) = query.get(name) else {
            return false;
        };
        if !matcher::matches(expected, &Value::String(actual.clone())) {
            return false;
        }
    }

    true
}

/// Canned response: string examples as text, everything else as JSON.
pub fn render_response(response: &ResponsePattern) -> MockResponse {
    match response.body.as_ref().map(|p| p.example()) {
        None => MockResponse {
            status: response.status,
            content_type: TEXT_CONTENT_TYPE,
            body: String::new(),
        },
        Some(Value::String(text)) => MockResponse {
            status: response.status,
            content_type: TEXT_CONTENT_TYPE,
            body: text,
        },
        Some(value) => MockResponse::json(response.status, &value),
    }
}

fn unmatched_diagnostic(request: &RecordedRequest, registered: &[&Interaction]) -> Value {
    let registered: Vec<Value> = registered
        .iter()
        .map(|i| {
            json!({
                "description": i.description,
                "method": i.request.method.to_uppercase(),
                "path": i.request.path,
                "query": i.request.query,
            })
        })
        .collect();

    json!({
        "error": "no interaction matched the request",
        "request": {
            "method": request.method,
            "path": request.path,
            "query": request.query,
        },
        "registered": registered,
    })
}
