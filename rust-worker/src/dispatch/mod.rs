//! Outbound HTTP dispatch.
//!
//! Each parsed message gets exactly one POST attempt. The completed
//! descriptor, carrying its disposition, goes to the outcome stream where the
//! acknowledgement loop settles the original delivery.

pub mod dispatcher;
pub mod sink;

pub use dispatcher::{classify, Dispatcher};
pub use sink::{outcome_channel, OutcomeSink, OutcomeStream};
