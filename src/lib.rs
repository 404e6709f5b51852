//! Contract Mock Server
//!
//! The matching and verification core of consumer-driven contract testing:
//! a consumer registers the interactions it expects, runs its tests against
//! a mock provider that serves those interactions, and the same interactions
//! are later replayed against the real provider to verify it keeps its side
//! of the contract.
//!
//! # Features
//!
//! - **Patterns**: literal, type-matched, regex-matched and nested values
//! - **Mock Provider**: serves registered interactions on a local port and
//!   answers unmatched requests with a loud diagnostic
//! - **Last Write Wins**: re-registering a method and path replaces the
//!   earlier interaction
//! - **Invocation Checks**: every interaction received exactly once
//! - **Provider Verification**: collects every mismatch in one pass
//!
//! # Example Configuration
//!
//! ```yaml
//! consumer: sandwich-maker
//! provider: Butterer
//! interactions:
//!   - description: a request to butter bread
//!     provider_state: We want to butter bread
//!     request:
//!       method: GET
//!       path: /butter/bread
//!     response:
//!       status: 200
//!       body:
//!         match: literal
//!         value: bread and butter
//! ```

pub mod config;
pub mod error;
pub mod interaction;
pub mod matcher;
pub mod path;
pub mod pattern;
pub mod registry;
pub mod responder;
pub mod server;
pub mod verifier;

pub use config::{MockServiceConfig, ServiceSettings};
pub use error::ContractError;
pub use interaction::{Interaction, RequestPattern, ResponsePattern};
pub use matcher::{matches, Mismatch};
pub use pattern::{Composite, Pattern};
pub use registry::{InteractionHandle, InteractionRegistry};
pub use responder::MockResponder;
pub use server::MockServer;
pub use verifier::{HttpProvider, VerificationReport, VerificationResult, Verifier};
