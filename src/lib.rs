//! Polling for eventually-consistent search results.
//!
//! Conformance tests that write an object and then search for it have to cope
//! with a search index that catches up asynchronously. This crate provides a
//! [`Poller`] that re-runs a visibility check until it passes or a deadline
//! elapses, optionally forcing an index commit first when a development index
//! is reachable, plus the typed [`SuiteConfig`] the deadline and index address
//! come from.

pub mod commit;
pub mod error;
pub mod http;
pub mod poller;
pub mod suite;

// Re-export commonly used types
pub use commit::{CommitStrategy, HttpCommit};
pub use error::{Result, SearchPollError};
pub use http::{HttpClient, HttpRequest, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use poller::{PollConfig, PollOutcome, PollSettings, Poller, await_visible};
pub use suite::{Backend, Endpoint, Requestor, Requestors, SuiteConfig, Superuser};
