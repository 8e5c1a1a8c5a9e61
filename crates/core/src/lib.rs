//! Incremental, multi-lane record feed engine.
//!
//! Several independent server-paginated streams ("lanes") are loaded lazily
//! per tab, reset by server-side filters and extended page by page on
//! scroll, with never more than one request in flight per lane.
//!
//! ```text
//!   UI action ─▶ FeedController ─▶ Lane ─▶ FetchCoordinator ─▶ RecordSource
//!                     ▲                          │
//!                     └──── FeedEvent ◀── merge ◀┘
//! ```

pub mod activation;
pub mod config;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod model;
pub mod observer;
pub mod scroll;
pub mod source;

pub use activation::{Activation, LazyTabActivator};
pub use config::{ConfigError, FeedConfig};
pub use controller::FeedController;
pub use error::{FeedError, SourceError, ValidationError};
pub use fetch::{DiscardReason, FetchCoordinator, FetchOutcome, FetchTicket, SkipReason};
pub use model::{Lane, LanePhase, LaneState};
pub use observer::{FeedEvent, SubscriptionId};
pub use scroll::{ScrollTrigger, Viewport};
pub use source::{FilterTarget, MemorySource, RecordSource};

pub use ledger_feed_protocol as protocol;
