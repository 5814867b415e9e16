//! Relay - RabbitMQ to HTTP bridge.
//!
//! Each queued message describes a deferred HTTP POST. The worker makes one
//! attempt per delivery and settles the message from the result; retries are
//! left to RabbitMQ through a dead-letter wait queue.
//!
//! ## Architecture
//!
//! ```text
//! main queue → parse → Dispatcher → outcome stream → ack / reject
//!     ▲                                                   │
//!     └──────────── wait queue (retry delay) ◄────────────┘
//! ```

pub mod ack;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod queue;
pub mod util;

// Re-export commonly used types
pub use ack::{decide, AckAction};
pub use config::Config;
pub use dispatch::{outcome_channel, Dispatcher, OutcomeSink, OutcomeStream};
pub use error::{DispatchError, ParseError};
pub use message::{parse, Disposition, Envelope, Outcome, RequestDescriptor};
pub use queue::{declare_topology, RequestPayload};
