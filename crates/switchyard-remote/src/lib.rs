//! switchyard-remote — the outside world as seen by the cutover engine.
//!
//! Two capabilities are consumed by the engine through traits:
//!
//! - **[`WorkflowClient`]** — read/set a workflow's enabled state and count
//!   its recent runs.
//! - **[`Notifier`]** — deliver a short text alert to a fixed destination.
//!
//! The HTTP implementations ([`HttpWorkflowClient`], [`SmsWebhookNotifier`])
//! are thin adapters. Credentials for the workflow API are cached by
//! [`TokenCache`] until shortly before they expire.

pub mod error;
pub mod notify;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod token;
pub mod workflow;

pub use error::{RemoteError, RemoteResult};
pub use notify::{Notifier, SmsWebhookNotifier};
pub use token::TokenCache;
pub use workflow::{HttpWorkflowClient, RunCounts, WorkflowClient, WorkflowState};
