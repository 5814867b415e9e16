//! Queued HTTP request messages.
//!
//! ## Processing Flow
//!
//! ```text
//! Delivery → Envelope → parse() → RequestDescriptor → Dispatcher
//! ```

pub mod attributes;
pub mod descriptor;
pub mod envelope;
pub mod parser;

pub use attributes::{Attribute, RetryInfo};
pub use descriptor::{Disposition, Outcome, RequestDescriptor};
pub use envelope::Envelope;
pub use parser::{parse, parse_at};
