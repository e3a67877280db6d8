use bytes::Bytes;

/// A published message: an opaque payload addressed to a topic.
///
/// The broker never inspects `payload`; collaborators choose the framing
/// (JSON balance updates, plain-text heartbeats, ...).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}
