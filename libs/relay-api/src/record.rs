use std::borrow::Cow;

/// Broker-delivered unit. Transient: dropped once the handler is done and
/// the offset is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub value: Vec<u8>,
}

impl RawRecord {
    /// Payload decoded as UTF-8; invalid sequences become U+FFFD.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

/// Broker acknowledgement of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: i32,
    pub offset: i64,
}

/// Consumer-group interest in a topic.
///
/// `from_beginning` only applies when the group has no committed offset
/// for the topic; otherwise consumption resumes from the committed offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub topic: String,
    pub group_id: String,
    pub from_beginning: bool,
}

impl SubscribeOptions {
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            from_beginning: true,
        }
    }

    pub fn from_beginning(mut self, from_beginning: bool) -> Self {
        self.from_beginning = from_beginning;
        self
    }
}
