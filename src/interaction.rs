//! Interaction definitions.
//!
//! An [`Interaction`] pairs the request a consumer is expected to send with
//! the response the provider is expected to return.

use crate::error::{ContractError, Result};
use crate::path::PathTemplate;
use crate::pattern::Pattern;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// A single expected request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interaction {
    /// What the consumer is doing, e.g. "a request to butter bread"
    pub description: String,

    /// Precondition assumed on the provider side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_state: Option<String>,

    /// Expected request
    pub request: RequestPattern,

    /// Response to serve and to verify
    pub response: ResponsePattern,
}

/// Expected request shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestPattern {
    /// HTTP method, uppercased on load and registration
    #[serde(default = "default_method", deserialize_with = "deserialize_method")]
    pub method: String,

    /// Literal or templated path, e.g. `/butter/{substrate}`
    pub path: String,

    /// Patterns for placeholders; unlisted placeholders match any string
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path_params: BTreeMap<String, Pattern>,

    /// Query parameters, matched key by key when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<BTreeMap<String, Pattern>>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn deserialize_method<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|method| method.to_uppercase())
}

/// Expected response shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponsePattern {
    /// HTTP status code
    #[serde(default = "default_status")]
    pub status: u16,

    /// Body pattern. `None` serves an empty body and is not verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Pattern>,
}

fn default_status() -> u16 {
    200
}

impl Interaction {
    /// Start building an interaction.
    pub fn builder() -> InteractionBuilder {
        InteractionBuilder::default()
    }

    /// Validate the interaction and return its parsed path template.
    pub fn validate(&self) -> Result<PathTemplate> {
        let fail = |reason: String| ContractError::validation(&self.description, reason);

        if self.description.trim().is_empty() {
            return Err(fail("description cannot be empty".to_string()));
        }
        if self.request.method.trim().is_empty() {
            return Err(fail("request method cannot be empty".to_string()));
        }
        if !(100..=599).contains(&self.response.status) {
            return Err(fail(format!("invalid status code: {}", self.response.status)));
        }

        let template = PathTemplate::parse(&self.request.path).map_err(fail)?;
        for name in self.request.path_params.keys() {
            if !template.params().any(|p| p == name) {
                return Err(fail(format!(
                    "path_params names '{}' which is not a placeholder in {}",
                    name, template
                )));
            }
        }

        // Path segments and query values always arrive as strings.
        let params = self.request.path_params.iter().map(|p| ("path", p));
        let query = self.request.query.iter().flatten().map(|p| ("query", p));
        for (kind, (name, pattern)) in params.chain(query) {
            if !pattern.is_string_pattern() {
                return Err(fail(format!(
                    "{} parameter '{}' must be a string pattern, got {}",
                    kind,
                    name,
                    pattern.describe()
                )));
            }
            pattern
                .validate()
                .map_err(|e| fail(format!("{} parameter '{}': {}", kind, name, e)))?;
        }
        if let Some(body) = &self.response.body {
            body.validate()
                .map_err(|e| fail(format!("response body: {}", e)))?;
        }

        Ok(template)
    }
}

impl RequestPattern {
    /// Registry key: method, normalized path template and query pattern.
    ///
    /// Placeholders are keyed by position and pattern, not by name.
    pub(crate) fn key(&self, template: &PathTemplate) -> String {
        let mut key = format!(
            "{} {}",
            self.method.to_uppercase(),
            template.key(&self.path_params)
        );
        if let Some(query) = &self.query {
            // Patterns serialize deterministically (BTreeMap ordering).
            let query = serde_json::to_string(query).unwrap_or_default();
            key.push('?');
            key.push_str(&query);
        }
        key
    }
}

/// Fluent construction of an [`Interaction`].
///
/// ```
/// use contract_mock_server::{Interaction, Pattern};
///
/// let interaction = Interaction::builder()
///     .given("We want to butter bread")
///     .upon_receiving("a request to butter bread")
///     .with_request("get", "/butter/bread")
///     .will_respond_with(200, Some(Pattern::literal("bread and butter")));
///
/// assert_eq!(interaction.request.method, "GET");
/// ```
#[derive(Debug, Clone, Default)]
pub struct InteractionBuilder {
    provider_state: Option<String>,
    description: String,
    method: Option<String>,
    path: String,
    path_params: BTreeMap<String, Pattern>,
    query: Option<BTreeMap<String, Pattern>>,
}

impl InteractionBuilder {
    /// Provider state assumed by the interaction.
    pub fn given(mut self, state: impl Into<String>) -> Self {
        self.provider_state = Some(state.into());
        self
    }

    /// Description of the interaction.
    pub fn upon_receiving(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Expected method and path.
    pub fn with_request(mut self, method: &str, path: impl Into<String>) -> Self {
        self.method = Some(method.to_uppercase());
        self.path = path.into();
        self
    }

    /// Pattern for a `{name}` path placeholder.
    pub fn with_path_param(mut self, name: impl Into<String>, pattern: Pattern) -> Self {
        self.path_params.insert(name.into(), pattern);
        self
    }

    /// Expected query parameter.
    pub fn with_query(mut self, name: impl Into<String>, pattern: impl Into<Pattern>) -> Self {
        self.query
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), pattern.into());
        self
    }

    /// Finish with the response the provider should return.
    pub fn will_respond_with(self, status: u16, body: Option<Pattern>) -> Interaction {
        Interaction {
            description: self.description,
            provider_state: self.provider_state,
            request: RequestPattern {
                method: self.method.unwrap_or_else(default_method),
                path: self.path,
                path_params: self.path_params,
                query: self.query,
            },
            response: ResponsePattern {
                status,
                body,
            },
        }
    }
}
