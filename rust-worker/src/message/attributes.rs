//! Decoding of the untyped AMQP header table.
//!
//! Headers are producer- or broker-controlled and may be absent, mistyped or
//! malformed. Each lookup here returns an explicit [`Attribute`] instead of
//! trusting the value's type.

use lapin::types::{AMQPValue, FieldTable, ShortString};

use crate::queue::{DEATH_HEADER, EXPIRATION_HEADER, MESSAGE_ID_HEADER};

/// Result of decoding one header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute<T> {
    /// The header is not present
    Missing,
    /// The header is present but unusable; the reason is for logs
    Invalid(&'static str),
    Valid(T),
}

/// Retry metadata derived from the dead-letter history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryInfo {
    pub retry_count: u32,
    pub first_rejected_at: i64,
}

fn lookup<'a>(table: Option<&'a FieldTable>, key: &str) -> Option<&'a AMQPValue> {
    table?.inner().get(&ShortString::from(key))
}

/// Any AMQP integer type, widened to `i64`.
fn as_integer(value: &AMQPValue) -> Option<i64> {
    match value {
        AMQPValue::ShortShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortInt(v) => Some(i64::from(*v)),
        AMQPValue::ShortUInt(v) => Some(i64::from(*v)),
        AMQPValue::LongInt(v) => Some(i64::from(*v)),
        AMQPValue::LongUInt(v) => Some(i64::from(*v)),
        AMQPValue::LongLongInt(v) => Some(*v),
        _ => None,
    }
}

fn as_string(value: &AMQPValue) -> Option<String> {
    match value {
        AMQPValue::ShortString(s) => Some(s.as_str().to_string()),
        AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes()).ok().map(str::to_string),
        _ => None,
    }
}

/// `expiration` header: an absolute unix time that must not be in the past.
pub fn expiration(table: Option<&FieldTable>, now: i64) -> Attribute<i64> {
    let Some(value) = lookup(table, EXPIRATION_HEADER) else {
        return Attribute::Missing;
    };

    match as_integer(value) {
        None => Attribute::Invalid("not an integer"),
        Some(expires_at) if expires_at < now => Attribute::Invalid("already past"),
        Some(expires_at) => Attribute::Valid(expires_at),
    }
}

/// `message_id` header: a non-empty string.
pub fn message_id(table: Option<&FieldTable>) -> Attribute<String> {
    let Some(value) = lookup(table, MESSAGE_ID_HEADER) else {
        return Attribute::Missing;
    };

    match as_string(value) {
        None => Attribute::Invalid("not a string"),
        Some(id) if id.is_empty() => Attribute::Invalid("empty"),
        Some(id) => Attribute::Valid(id),
    }
}

/// `x-death` header, as written by RabbitMQ for a main queue / wait queue pair.
///
/// The history holds one entry per queue the message was dead-lettered from.
/// With exactly two entries, the second one belongs to the main queue and its
/// `count` is the number of previous attempts. Any other shape is reported as
/// invalid and callers fall back to zero.
pub fn redelivery(table: Option<&FieldTable>) -> Attribute<RetryInfo> {
    let Some(value) = lookup(table, DEATH_HEADER) else {
        return Attribute::Missing;
    };

    let AMQPValue::FieldArray(history) = value else {
        return Attribute::Invalid("not an array");
    };

    let entries = history.as_slice();
    if entries.len() != 2 {
        return Attribute::Invalid("history does not have exactly two entries");
    }

    let AMQPValue::FieldTable(main_queue) = &entries[1] else {
        return Attribute::Invalid("history entry is not a table");
    };

    let retry_count = match lookup(Some(main_queue), "count").map(as_integer) {
        Some(Some(count)) => match u32::try_from(count) {
            Ok(count) => count,
            Err(_) => return Attribute::Invalid("count out of range"),
        },
        Some(None) => return Attribute::Invalid("count is not an integer"),
        None => return Attribute::Invalid("count missing"),
    };

    let first_rejected_at = match lookup(Some(main_queue), "time") {
        None | Some(AMQPValue::Void) => 0,
        Some(AMQPValue::Timestamp(time)) => match i64::try_from(*time) {
            Ok(time) => time,
            Err(_) => return Attribute::Invalid("time out of range"),
        },
        Some(_) => return Attribute::Invalid("time is not a timestamp"),
    };

    Attribute::Valid(RetryInfo {
        retry_count,
        first_rejected_at,
    })
}
