//! 📡 The engine seam — everything that touches the search cluster over HTTP.
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The cluster is yellow. The cluster is always yellow. An engineer stares at
//! a retry counter ticking upward and wonders, not for the first time,
//! whether a 503 is a status code or a lifestyle.
//!
//! 🦆 (mandatory duck, no context provided, none shall be requested)
//!
//! Three layers, strictly stacked:
//! - [`client`] — sends one HTTP request and keeps sending it until it lands
//!   or the retry budget runs out. Knows nothing about indices.
//! - [`api`] — the cluster's actual endpoints (create, settings, refresh,
//!   aliases, delete, bulk) plus reply interpretation. Knows nothing about
//!   retries.
//! - [`settings`] — the JSON bodies for index creation and speed tuning.
//!   Knows nothing at all, beautifully. It is pure data.
//!
//! Errors come out typed ([`error::EngineError`]) so callers can tell
//! "the network gave up" from "the cluster said no" from "the cluster said
//! *something* and we have no idea what".

pub mod error;

pub(crate) mod api;
pub(crate) mod client;
pub(crate) mod settings;

pub use error::EngineError;
pub(crate) use api::EngineApi;
