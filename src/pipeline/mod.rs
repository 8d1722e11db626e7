//! Relay pipeline.
//!
//! Every fetched email flows through:
//! 1. `extractor::extract()`: body → message, tracking link, position
//! 2. `dispatcher::RelayDispatcher::dispatch()`: card → messaging gateway
//!
//! Fetching and dedup live in `mailbox`; ordering is owned by the scheduler.

pub mod dispatcher;
pub mod extractor;
pub mod types;

pub use dispatcher::RelayDispatcher;
pub use extractor::extract;
pub use types::{Coordinates, ParsedNotification, RawEmail, TrackingLink};
