//! HTTP surface for the docgen generation engine.
//!
//! One request becomes one SSE stream: the dispatcher resolves provider
//! keys, consults the artifact cache, runs the workflow graph, and
//! forwards its progress events until exactly one terminal event closes
//! the stream.

pub mod dispatch;
pub mod handlers;
pub mod keys;
pub mod routes;
pub mod schemas;
pub mod state;

pub use routes::api_routes;
pub use state::AppState;
