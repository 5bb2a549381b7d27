//! # Lifesync Server
//!
//! Realtime life counter server. Clients open a WebSocket to
//! `/room/{room}/player/{player}`, send `change` and `set-name` commands,
//! and receive the full player table of their room after every change.
//!
//! The binary is a thin wrapper around [`handlers::run_server`]; the
//! library exists so the server can be started in-process by tests.

pub mod actor;
pub mod config;
pub mod handlers;
pub mod metrics;

pub use actor::{ActorState, ConnectionActor};
pub use config::Config;
pub use handlers::{build_app, run_server, serve, AppState};
