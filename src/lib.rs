//! Two-tier streaming fan-out platform: a per-group Stream Dispatcher that
//! fans bus messages out to SSE subscribers, and a Routing Controller that
//! materializes group-scoped topics and worker services and resolves asset
//! identifiers to worker URLs.

pub mod api;
pub mod bus;
pub mod controller;
pub mod core;
pub mod deploy;
pub mod dispatcher;
pub mod grouping;
pub mod registry;
pub mod snapshot;
pub mod worker;
