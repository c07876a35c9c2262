//! Filtering proxy and host matching.

pub mod filter;
pub mod http;

pub use filter::{AskCallback, HostDecision, HostFilter};
pub use http::{FilterHandle, HttpProxy};
