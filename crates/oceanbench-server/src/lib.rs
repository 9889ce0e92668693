//! The Ocean Bench service: HTTP surface and process wiring for the
//! broadcast orchestrator.
//!
//! Two deployment modes share one binary:
//!
//! - **cloud**: configs live in the Redis-compatible datastore and ticks
//!   arrive as `GET /checkbroadcasts` requests from the remote cron
//!   service, authenticated by an HMAC-SHA-256 JWT whose claims name the
//!   cron service account (`iss`) and the site to tick (`skey`).
//! - **standalone**: configs live in a local file store, no auth, and an
//!   internal minute loop drives the ticks.
//!
//! # Modules
//!
//! - [`auth`] -- cron JWT verification
//! - [`config`] -- YAML service configuration with env overrides
//! - [`error`] -- API error enum with its HTTP mapping
//! - [`handlers`] -- `/checkbroadcasts` and `/healthz`
//! - [`router`] -- route assembly
//! - [`server`] -- bind/serve lifecycle
//! - [`standalone`] -- the internal tick loop

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod standalone;
pub mod state;

pub use auth::CronAuth;
pub use config::ServiceConfig;
pub use error::ApiError;
pub use router::build_router;
pub use server::{start_server, ServeError};
pub use state::AppState;
