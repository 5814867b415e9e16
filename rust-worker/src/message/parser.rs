//! Envelope parsing.
//!
//! Turns a raw [`Envelope`] into a [`RequestDescriptor`]:
//! 1. Decodes the JSON body and requires a non-empty `url`
//! 2. Flattens the ordered header list (later entries win)
//! 3. Reads creation time, expiration and message id
//! 4. Derives retry metadata from the dead-letter history

use std::collections::{BTreeMap, HashMap};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::attributes::{self, Attribute, RetryInfo};
use super::descriptor::RequestDescriptor;
use super::envelope::Envelope;
use crate::error::{ParseError, ParseResult};
use crate::queue::RequestPayload;
use crate::util::unix_now;

/// Parse an envelope against the current time.
pub fn parse(envelope: &Envelope) -> ParseResult<RequestDescriptor> {
    parse_at(envelope, unix_now())
}

/// Parse an envelope, judging the `expiration` header against `now`.
pub fn parse_at(envelope: &Envelope, now: i64) -> ParseResult<RequestDescriptor> {
    let payload: RequestPayload = serde_json::from_slice(&envelope.body)?;

    let url = payload
        .url
        .filter(|url| !url.is_empty())
        .ok_or(ParseError::Validation("url missing or empty"))?;

    let created_at = envelope
        .timestamp
        .filter(|ts| *ts != 0)
        .and_then(|ts| i64::try_from(ts).ok())
        .unwrap_or(0);

    let table = envelope.attributes.as_ref();

    let expires_at = match attributes::expiration(table, now) {
        Attribute::Valid(expires_at) => expires_at,
        Attribute::Missing => 0,
        Attribute::Invalid(reason) => {
            warn!(
                reason = reason,
                "message_expiration_ignored_default_ttl_applies"
            );
            0
        }
    };

    let message_id = match attributes::message_id(table) {
        Attribute::Valid(id) => id,
        Attribute::Missing => fallback_message_id(&envelope.body, created_at),
        Attribute::Invalid(reason) => {
            warn!(reason = reason, "message_id_ignored_using_body_digest");
            fallback_message_id(&envelope.body, created_at)
        }
    };

    let retry = match attributes::redelivery(table) {
        Attribute::Valid(retry) => retry,
        Attribute::Missing => RetryInfo::default(),
        Attribute::Invalid(reason) => {
            debug!(
                message_id = %message_id,
                reason = reason,
                "message_death_history_ignored"
            );
            RetryInfo::default()
        }
    };

    let mut descriptor = RequestDescriptor::new(message_id, url);
    descriptor.delivery_tag = envelope.delivery_tag;
    descriptor.headers = flatten_headers(payload.headers.unwrap_or_default());
    descriptor.body = payload.body.unwrap_or_default();
    descriptor.created_at = created_at;
    descriptor.expires_at = expires_at;
    descriptor.retry_count = retry.retry_count;
    descriptor.first_rejected_at = retry.first_rejected_at;

    debug!(
        message_id = %descriptor.message_id,
        url = %descriptor.url,
        header_names = ?descriptor.headers.keys().collect::<Vec<_>>(),
        body_length = descriptor.body.len(),
        created_at = descriptor.created_at,
        expires_at = descriptor.expires_at,
        "message_parsed"
    );
    debug!(
        message_id = %descriptor.message_id,
        retry_count = descriptor.retry_count,
        first_rejected_at = descriptor.first_rejected_at,
        "message_retry_info"
    );

    Ok(descriptor)
}

/// Merge the ordered header list into one map; later duplicates overwrite
/// earlier ones.
fn flatten_headers(entries: Vec<BTreeMap<String, String>>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for entry in entries {
        headers.extend(entry);
    }
    headers
}

/// Hex SHA-256 of the raw body, suffixed with the creation time when known so
/// that identical bodies sent at different times get distinct ids.
fn fallback_message_id(body: &[u8], created_at: i64) -> String {
    let digest = hex::encode(Sha256::digest(body));
    if created_at > 0 {
        format!("{}-{}", digest, created_at)
    } else {
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use lapin::types::{AMQPValue, FieldArray, FieldTable, LongString, ShortString};

    use crate::queue::{DEATH_HEADER, EXPIRATION_HEADER, MESSAGE_ID_HEADER};

    const NOW: i64 = 1_700_000_000;

    fn attrs(entries: Vec<(&str, AMQPValue)>) -> FieldTable {
        let mut table = FieldTable::default();
        for (key, value) in entries {
            table.insert(ShortString::from(key), value);
        }
        table
    }

    fn death_history(entries: usize, count: i64, time: u64) -> FieldTable {
        let entry = AMQPValue::FieldTable(attrs(vec![
            ("count", AMQPValue::LongLongInt(count)),
            ("time", AMQPValue::Timestamp(time)),
        ]));
        let history: Vec<AMQPValue> = (0..entries).map(|_| entry.clone()).collect();
        attrs(vec![(
            DEATH_HEADER,
            AMQPValue::FieldArray(FieldArray::from(history)),
        )])
    }

    fn sha256_hex(body: &str) -> String {
        hex::encode(Sha256::digest(body.as_bytes()))
    }

    fn envelope_for(payload: &RequestPayload) -> Envelope {
        Envelope::new(serde_json::to_vec(payload).unwrap())
    }

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` and return its result with every warning it logged.
    fn with_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .without_time()
            .finish();

        let result = tracing::subscriber::with_default(subscriber, f);
        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        (result, output)
    }

    #[test]
    fn test_parse_end_to_end_without_attributes() {
        let raw = r#"{"url":"http://x/y","headers":[{"A":"1"},{"B":"2"}],"body":"payload"}"#;

        let descriptor = parse_at(&Envelope::new(raw), NOW).unwrap();

        assert_eq!(descriptor.url, "http://x/y");
        assert_eq!(descriptor.headers.len(), 2);
        assert_eq!(descriptor.headers["A"], "1");
        assert_eq!(descriptor.headers["B"], "2");
        assert_eq!(descriptor.body, "payload");
        assert_eq!(descriptor.created_at, 0);
        assert_eq!(descriptor.expires_at, 0);
        assert_eq!(descriptor.retry_count, 0);
        assert_eq!(descriptor.first_rejected_at, 0);
        assert_eq!(descriptor.message_id, sha256_hex(raw));
        assert!(descriptor.outcome().is_none());
    }

    #[test]
    fn test_parse_headers_last_wins() {
        let payload = RequestPayload::new("http://x/y", "")
            .with_header("A", "1")
            .with_header("B", "x")
            .with_header("A", "2");

        let descriptor = parse_at(&envelope_for(&payload), NOW).unwrap();

        assert_eq!(descriptor.headers.len(), 2);
        assert_eq!(descriptor.headers["A"], "2");
        assert_eq!(descriptor.headers["B"], "x");
        assert_eq!(descriptor.body, "");
    }

    #[test]
    fn test_payload_built_envelope_matches_raw_digest() {
        let payload = RequestPayload::new("http://x/y", "payload")
            .with_header("A", "1")
            .with_header("B", "2");
        let envelope = envelope_for(&payload);
        let raw = r#"{"url":"http://x/y","headers":[{"A":"1"},{"B":"2"}],"body":"payload"}"#;

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(envelope.body, raw.as_bytes());
        assert_eq!(descriptor.message_id, sha256_hex(raw));
    }

    #[test]
    fn test_past_expiration_logs_warning() {
        let envelope = envelope_for(&RequestPayload::new("http://x/y", "")).with_attributes(
            attrs(vec![(EXPIRATION_HEADER, AMQPValue::LongLongInt(NOW - 1))]),
        );

        let (descriptor, logs) = with_warnings(|| parse_at(&envelope, NOW).unwrap());

        assert_eq!(descriptor.expires_at, 0);
        assert!(logs.contains("WARN"), "{}", logs);
        assert!(
            logs.contains("message_expiration_ignored_default_ttl_applies"),
            "{}",
            logs
        );
        assert!(logs.contains("already past"), "{}", logs);
    }

    #[test]
    fn test_invalid_message_id_logs_warning() {
        for value in [
            AMQPValue::LongString(LongString::from("")),
            AMQPValue::LongLongInt(42),
        ] {
            let envelope = envelope_for(&RequestPayload::new("http://x/y", ""))
                .with_attributes(attrs(vec![(MESSAGE_ID_HEADER, value)]));

            let (_, logs) = with_warnings(|| parse_at(&envelope, NOW).unwrap());

            assert!(logs.contains("WARN"), "{}", logs);
            assert!(logs.contains("message_id_ignored_using_body_digest"), "{}", logs);
        }
    }

    #[test]
    fn test_missing_attributes_log_no_warning() {
        let envelope = envelope_for(&RequestPayload::new("http://x/y", "payload"))
            .with_attributes(FieldTable::default());

        let (_, logs) = with_warnings(|| parse_at(&envelope, NOW).unwrap());

        assert!(logs.is_empty(), "{}", logs);
    }

    #[test]
    fn test_parse_missing_url_is_validation_error() {
        for raw in [
            r#"{"body":"payload"}"#,
            r#"{"url":"","body":"payload"}"#,
            r#"{"url":null}"#,
        ] {
            let result = parse_at(&Envelope::new(raw), NOW);
            assert!(
                matches!(result, Err(ParseError::Validation(_))),
                "expected validation error for {}",
                raw
            );
        }
    }

    #[test]
    fn test_parse_malformed_body_is_decode_error() {
        for raw in ["not json", r#"{"url": 5}"#, r#"{"url":"http://x","headers":{"A":"1"}}"#] {
            let result = parse_at(&Envelope::new(raw), NOW);
            assert!(
                matches!(result, Err(ParseError::Decode(_))),
                "expected decode error for {}",
                raw
            );
        }
    }

    #[test]
    fn test_message_id_is_deterministic_and_time_suffixed() {
        let raw = r#"{"url":"http://x/y","body":"same"}"#;

        let first = parse_at(&Envelope::new(raw).with_timestamp(1_600_000_000), NOW).unwrap();
        let second = parse_at(&Envelope::new(raw).with_timestamp(1_600_000_000), NOW).unwrap();
        let later = parse_at(&Envelope::new(raw).with_timestamp(1_600_000_060), NOW).unwrap();

        assert_eq!(first.message_id, second.message_id);
        assert_eq!(first.message_id, format!("{}-1600000000", sha256_hex(raw)));
        assert_ne!(first.message_id, later.message_id);
        assert_eq!(first.created_at, 1_600_000_000);
    }

    #[test]
    fn test_zero_timestamp_is_unknown() {
        let raw = r#"{"url":"http://x/y"}"#;

        let descriptor = parse_at(&Envelope::new(raw).with_timestamp(0), NOW).unwrap();

        assert_eq!(descriptor.created_at, 0);
        assert_eq!(descriptor.message_id, sha256_hex(raw));
    }

    #[test]
    fn test_message_id_header_used_when_valid() {
        let raw = r#"{"url":"http://x/y"}"#;
        let envelope = Envelope::new(raw).with_attributes(attrs(vec![(
            MESSAGE_ID_HEADER,
            AMQPValue::LongString(LongString::from("order-42")),
        )]));

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.message_id, "order-42");
    }

    #[test]
    fn test_invalid_message_id_header_falls_back_to_digest() {
        let raw = r#"{"url":"http://x/y"}"#;
        let envelope = Envelope::new(raw).with_attributes(attrs(vec![(
            MESSAGE_ID_HEADER,
            AMQPValue::LongString(LongString::from("")),
        )]));

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.message_id, sha256_hex(raw));
    }

    #[test]
    fn test_expiration_in_future_is_kept() {
        let envelope = Envelope::new(r#"{"url":"http://x/y"}"#).with_attributes(attrs(vec![(
            EXPIRATION_HEADER,
            AMQPValue::LongLongInt(NOW + 3600),
        )]));

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.expires_at, NOW + 3600);
    }

    #[test]
    fn test_expiration_in_past_is_ignored() {
        let envelope = Envelope::new(r#"{"url":"http://x/y"}"#).with_attributes(attrs(vec![(
            EXPIRATION_HEADER,
            AMQPValue::LongLongInt(NOW - 1),
        )]));

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.expires_at, 0);
    }

    #[test]
    fn test_retry_info_from_two_entry_history() {
        let envelope = Envelope::new(r#"{"url":"http://x/y"}"#)
            .with_attributes(death_history(2, 3, 1_699_999_000));

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.retry_count, 3);
        assert_eq!(descriptor.first_rejected_at, 1_699_999_000);
    }

    #[test]
    fn test_retry_info_defaults_for_other_shapes() {
        for entries in [0, 1, 3] {
            let envelope = Envelope::new(r#"{"url":"http://x/y"}"#)
                .with_attributes(death_history(entries, 3, 1_699_999_000));

            let descriptor = parse_at(&envelope, NOW).unwrap();

            assert_eq!(descriptor.retry_count, 0, "entries {}", entries);
            assert_eq!(descriptor.first_rejected_at, 0, "entries {}", entries);
        }
    }

    #[test]
    fn test_delivery_tag_is_carried() {
        let mut envelope = Envelope::new(r#"{"url":"http://x/y"}"#);
        envelope.delivery_tag = 17;

        let descriptor = parse_at(&envelope, NOW).unwrap();

        assert_eq!(descriptor.delivery_tag, 17);
    }
}
