//! A Crossplane composition function querying Azure Resource Graph.
//!
//! Each invocation runs a Kusto query against Azure Resource Graph and writes
//! the result into either the status of the composite resource or the
//! pipeline context. Queries can be throttled by an interval or skipped once
//! their target holds data. Multiple service principals can be rotated
//! round-robin to spread the API quota.
//!
//! The entry point is [`Function::run_function`], served over HTTP by
//! [`server::FunctionServer`].
pub mod cli;
pub mod composite;
pub mod credentials;
pub mod function;
pub mod input;
pub mod proto;
pub mod query;
pub mod reference;
pub mod response;
pub mod server;
pub mod signal;
pub mod throttle;

pub use function::Function;
