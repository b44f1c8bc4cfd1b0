//! WAMP Router
//!
//! The routing core of a WAMP v1 server:
//! - Tracks open connections ([`Connection`])
//! - Keeps per-topic subscriber sets ([`TopicRegistry`])
//! - Correlates RPC calls with their result or error ([`CallTracker`])
//! - Routes inbound messages and fans out events ([`Dispatcher`])
//!
//! Applications plug in through two independent capabilities:
//! [`RpcHandler`] executes calls, [`PubSubHandler`] observes pub/sub activity.
//!
//! # Example
//!
//! ```no_run
//! use wamp_router::{Router, RouterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::new(RouterConfig::default());
//!     router.serve_websocket("0.0.0.0:8080").await?;
//!     Ok(())
//! }
//! ```

pub mod calls;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod router;
pub mod topic;

pub use calls::{CallTracker, PendingCall};
pub use connection::Connection;
pub use dispatch::Dispatcher;
pub use error::{Result, RouterError};
pub use handler::{
    CallFailure, CallRequest, CallResponder, ProcedureRegistry, PubSubHandler, RpcHandler,
};
pub use router::{Router, RouterConfig};
pub use topic::{PublishFilter, TopicRegistry};
pub use wamp_core::{CallId, SessionId};
