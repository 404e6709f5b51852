//! Provider verification.
//!
//! Replays each interaction's request against a live provider and checks the
//! real response against the expected status and body pattern. Every
//! mismatch is collected; nothing is retried.

use crate::error::{ContractError, Result};
use crate::interaction::{Interaction, RequestPattern, ResponsePattern};
use crate::matcher::{self, Mismatch};
use crate::path::{render_query, PathTemplate};
use crate::pattern::Pattern;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;
use tracing::{debug, info, warn};

/// Concrete request sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub method: String,
    /// Percent-encoded path plus optional `?query`
    pub path_and_query: String,
}

/// What the provider answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub body: String,
}

/// Issues a concrete request against a live provider.
#[async_trait]
pub trait ProviderCall: Send + Sync {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse>;
}

/// [`ProviderCall`] backed by a closure, see [`provider_fn`].
pub struct ProviderFn<F> {
    f: F,
}

/// Wrap an async closure as a [`ProviderCall`].
pub fn provider_fn<F, Fut>(f: F) -> ProviderFn<F>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse>> + Send + 'static,
{
    ProviderFn { f }
}

#[async_trait]
impl<F, Fut> ProviderCall for ProviderFn<F>
where
    F: Fn(ProviderRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Result<ProviderResponse>> + Send + 'static,
{
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        (self.f)(request.clone()).await
    }
}

/// [`ProviderCall`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProvider {
    /// Provider reachable at `base_url`, e.g. `http://localhost:8080`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }
}

#[async_trait]
impl ProviderCall for HttpProvider {
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| ContractError::Network(format!("invalid method: {}", e)))?;
        let url = format!("{}{}", self.base_url, request.path_and_query);

        debug!(method = %method, url = %url, "Calling provider");
        let response = self.client.request(method, url.as_str()).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(ProviderResponse { status, body })
    }
}

/// Outcome of verifying one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "mismatches", rename_all = "snake_case")]
pub enum VerificationResult {
    Verified,
    Failed(Vec<Mismatch>),
}

impl VerificationResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, VerificationResult::Verified)
    }

    /// Mismatches, empty when verified.
    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            VerificationResult::Verified => &[],
            VerificationResult::Failed(mismatches) => mismatches,
        }
    }

    fn from_mismatches(mismatches: Vec<Mismatch>) -> Self {
        if mismatches.is_empty() {
            VerificationResult::Verified
        } else {
            VerificationResult::Failed(mismatches)
        }
    }
}

/// Render a request pattern with example values for every placeholder.
pub fn render_request(request: &RequestPattern) -> Result<ProviderRequest> {
    let template = PathTemplate::parse(&request.path)
        .map_err(|reason| ContractError::validation(&request.path, reason))?;

    let mut path_and_query = template.render(&request.path_params);
    if let Some(query) = request.query.as_ref().filter(|q| !q.is_empty()) {
        path_and_query.push('?');
        path_and_query.push_str(&render_query(query));
    }

    Ok(ProviderRequest {
        method: request.method.to_uppercase(),
        path_and_query,
    })
}

/// Compare a provider response with the expected response pattern.
pub fn check_response(expected: &ResponsePattern, actual: &ProviderResponse) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if actual.status != expected.status {
        mismatches.push(Mismatch::new(
            "$.status",
            format!("status {}", expected.status),
            json!(actual.status),
        ));
    }

    if let Some(body) = &expected.body {
        let actual_body = body_value(body, &actual.body);
        mismatches.extend(matcher::mismatches_at(body, &actual_body, "$.body"));
    }

    mismatches
}

/// Text bodies are compared as strings, anything else is parsed as JSON
/// first (falling back to the raw text).
fn body_value(expected: &Pattern, body: &str) -> Value {
    if expected.example().is_string() {
        return Value::String(body.to_string());
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// Verify one interaction against `provider`.
pub async fn verify<P>(interaction: &Interaction, provider: &P) -> VerificationResult
where
    P: ProviderCall + ?Sized,
{
    let request = match render_request(&interaction.request) {
        Ok(request) => request,
        Err(e) => {
            return VerificationResult::Failed(vec![Mismatch::new(
                "$.request",
                "a renderable request",
                Value::String(e.to_string()),
            )])
        }
    };

    match provider.call(&request).await {
        Ok(response) => {
            VerificationResult::from_mismatches(check_response(&interaction.response, &response))
        }
        Err(e) => {
            warn!(interaction = %interaction.description, error = %e, "Provider call failed");
            VerificationResult::Failed(vec![Mismatch::new(
                "$transport",
                "a response from the provider",
                Value::String(e.to_string()),
            )])
        }
    }
}

type StateSetup = Box<dyn Fn(&str) -> std::result::Result<(), String> + Send + Sync>;

/// Verifies interactions against one provider.
pub struct Verifier<P> {
    provider: P,
    state_setup: Option<StateSetup>,
}

impl<P: ProviderCall> Verifier<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            state_setup: None,
        }
    }

    /// Run `setup` with the provider state before each interaction that has
    /// one. An error fails that interaction without calling the provider.
    pub fn with_state_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&str) -> std::result::Result<(), String> + Send + Sync + 'static,
    {
        self.state_setup = Some(Box::new(setup));
        self
    }

    /// Verify a single interaction.
    pub async fn verify(&self, interaction: &Interaction) -> VerificationResult {
        if let (Some(setup), Some(state)) = (&self.state_setup, &interaction.provider_state) {
            if let Err(e) = setup(state) {
                return VerificationResult::Failed(vec![Mismatch::new(
                    "$.provider_state",
                    format!("provider state '{}' set up", state),
                    Value::String(e),
                )]);
            }
        }
        verify(interaction, &self.provider).await
    }

    /// Verify every interaction, in order.
    pub async fn verify_all<'a, I>(&self, interactions: I) -> VerificationReport
    where
        I: IntoIterator<Item = &'a Interaction>,
    {
        let mut report = VerificationReport::default();
        for interaction in interactions {
            let result = self.verify(interaction).await;
            info!(
                interaction = %interaction.description,
                verified = result.is_verified(),
                mismatches = result.mismatches().len(),
                "Verified interaction"
            );
            report.results.push(InteractionVerification {
                description: interaction.description.clone(),
                provider_state: interaction.provider_state.clone(),
                result,
            });
        }
        report
    }
}

/// Result for one interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionVerification {
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<String>,
    pub result: VerificationResult,
}

/// Results for a set of interactions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub results: Vec<InteractionVerification>,
}

impl VerificationReport {
    /// True if every interaction verified.
    pub fn is_verified(&self) -> bool {
        self.results.iter().all(|r| r.result.is_verified())
    }

    pub fn failures(&self) -> impl Iterator<Item = &InteractionVerification> {
        self.results.iter().filter(|r| !r.result.is_verified())
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.results {
            match &entry.result {
                VerificationResult::Verified => writeln!(f, "verified: {}", entry.description)?,
                VerificationResult::Failed(mismatches) => {
                    writeln!(f, "FAILED: {}", entry.description)?;
                    for mismatch in mismatches {
                        writeln!(f, "  {}", mismatch)?;
                    }
                }
            }
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} interactions, {} verified, {} failed",
            self.results.len(),
            self.results.len() - failed,
            failed
        )
    }
}
