//! Raw queue envelope, before any validation.

use lapin::{message::Delivery, types::FieldTable};

/// One unit of work as it arrived from the broker.
#[derive(Debug, Clone, Default)]
pub struct Envelope {
    /// Raw message body
    pub body: Vec<u8>,
    /// AMQP `timestamp` property (unix seconds), if the producer set one
    pub timestamp: Option<u64>,
    /// AMQP headers; untyped, producer-controlled
    pub attributes: Option<FieldTable>,
    /// Delivery tag used to settle the message; 0 outside a live delivery
    pub delivery_tag: u64,
}

impl Envelope {
    /// Create an envelope carrying only a body.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// Capture everything the parser needs from a lapin delivery.
    pub fn from_delivery(delivery: &Delivery) -> Self {
        Self {
            body: delivery.data.clone(),
            timestamp: *delivery.properties.timestamp(),
            attributes: delivery.properties.headers().clone(),
            delivery_tag: delivery.delivery_tag,
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_attributes(mut self, attributes: FieldTable) -> Self {
        self.attributes = Some(attributes);
        self
    }
}
