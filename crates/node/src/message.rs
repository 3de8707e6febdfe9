//! The inbound network message envelope.

use serde::{Deserialize, Serialize};

/// Classification of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    /// A signed transaction submitted by a client.
    #[serde(rename = "message")]
    FromClient,
    /// A signed ballot from a peer validator.
    #[serde(rename = "ballot")]
    Ballot,
    /// A validator identity announcement.
    #[serde(rename = "connect")]
    Connect,
}

impl MessageKind {
    pub fn name(self) -> &'static str {
        match self {
            MessageKind::FromClient => "message",
            MessageKind::Ballot => "ballot",
            MessageKind::Connect => "connect",
        }
    }
}

/// An inbound message as handed from the network layer to the dispatch task.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub data: Vec<u8>,
}

impl InboundMessage {
    pub fn new(kind: MessageKind, data: Vec<u8>) -> Self {
        InboundMessage { kind, data }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// A bounded prefix of the payload for log lines.
    pub fn head(&self, n: usize) -> String {
        let end = self.data.len().min(n);
        String::from_utf8_lossy(&self.data[..end]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_bounded() {
        let msg = InboundMessage::new(MessageKind::FromClient, b"0123456789".to_vec());
        assert_eq!(msg.head(4), "0123");
        assert_eq!(msg.head(100), "0123456789");
        assert!(!msg.is_empty());
        assert!(InboundMessage::new(MessageKind::Ballot, vec![]).is_empty());
    }
}
