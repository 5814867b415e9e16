//! Queue module for RabbitMQ operations.
//!
//! This module provides:
//! - The wire format of queued HTTP requests
//! - Declaration of the main / wait queue pair used for retries
//!
//! ## Architecture
//!
//! ```text
//! Producer → main queue → Worker ──reject──► wait queue ──TTL──► main queue
//! ```

pub mod topology;
pub mod types;

pub use topology::{declare_topology, main_queue_args, wait_queue_args};
pub use types::{
    RequestPayload, DEATH_HEADER, DEFAULT_QUEUE, EXPIRATION_HEADER, MESSAGE_ID_HEADER,
    WAIT_QUEUE_SUFFIX,
};
