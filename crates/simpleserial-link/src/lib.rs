//! Message dispatch for simple serial links.
//!
//! Two ways to consume messages:
//! - [`SerialLink`] runs a background receive thread that fills a queue
//!   (and optionally calls a handler for each message).
//! - [`Poller`] has no thread; the caller invokes [`Poller::poll`] from its
//!   own loop.
//!
//! Fatal failures are returned as [`LinkError`] and also reported to the
//! registered error handler as a [`LinkFailure`].

pub mod config;
pub mod connector;
pub mod error;
pub mod handler;
pub mod link;
pub mod poller;

pub use config::LinkConfig;
pub use connector::{connect, connect_with_config, open_serial};
pub use error::{LinkError, LinkFailure, Result};
pub use handler::{ErrorHandler, MessageHandler};
pub use link::SerialLink;
pub use poller::Poller;
