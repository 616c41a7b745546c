use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use einvoice_core::EventId;

use crate::event::Event;

/// Envelope for an event, containing stream metadata.
///
/// This is the unit appended to a journal. `sequence_number` is 1-based and
/// monotonically increasing per stream, so it equals the aggregate version
/// reached after the payload is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: EventId,

    stream_id: String,
    stream_type: String,

    sequence_number: u64,
    event_type: String,
    recorded_at: DateTime<Utc>,

    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap `payload` as the `sequence_number`-th event of `stream_id`.
    pub fn new(
        stream_id: impl Into<String>,
        stream_type: impl Into<String>,
        sequence_number: u64,
        payload: E,
    ) -> Self {
        Self {
            event_id: EventId::new(),
            stream_id: stream_id.into(),
            stream_type: stream_type.into(),
            sequence_number,
            event_type: payload.event_type().to_string(),
            recorded_at: Utc::now(),
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> EventId {
        self.event_id
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn stream_type(&self) -> &str {
        &self.stream_type
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }
}
