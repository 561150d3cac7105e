fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use parley_protocol::{ChatMessage, FileRef, InboundFrame};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture file verbatim, as it arrives on the socket.
    fn load_frame(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    /// Parses a fixture through the inbound classifier and expects a message.
    fn inbound_message(name: &str) -> ChatMessage {
        match InboundFrame::parse(&load_frame(name)) {
            Ok(InboundFrame::Message(msg)) => *msg,
            other => panic!("expected a chat message from {name}, got {other:?}"),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values
    /// (order-independent).
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture: serde_json::Value = serde_json::from_str(&load_frame(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"));
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  client: {reserialized}"
        );
    }

    #[test]
    fn server_talk_attachments_decode() {
        let mut msg = inbound_message("server_talk.json");
        assert!(!msg.is_server_addressed());
        assert_eq!(msg.room_id.as_deref(), Some("r-8812"));
        assert_eq!(msg.user_name.as_deref(), Some("visitor-8812"));

        msg.decode_files().unwrap();
        assert_eq!(
            msg.files,
            vec![
                FileRef {
                    url: "https://cdn.example.com/a.png".into(),
                    name: "a.png".into(),
                },
                FileRef {
                    url: "https://cdn.example.com/invoice.pdf".into(),
                    name: "invoice.pdf".into(),
                },
            ]
        );
        assert_eq!(msg.str_files, None);
    }

    #[test]
    fn server_talk_without_attachments() {
        let mut msg = inbound_message("server_talk_no_files.json");
        msg.decode_files().unwrap();
        assert!(msg.files.is_empty());
    }

    #[test]
    fn server_notify_counts() {
        let msg = inbound_message("server_notify.json");
        assert!(msg.is_server_addressed());
        assert_eq!(msg.room_id, None);

        let counts = msg.message.expect("notify frame carries counters");
        assert_eq!(counts.total_unread, 3);
        assert!(counts.new_message);
        assert_eq!(counts.message_counts.get("r-8812"), Some(&2));
        assert_eq!(counts.message_counts.get("r-9001"), Some(&1));
    }

    #[test]
    fn client_talk_roundtrip() {
        roundtrip_test::<ChatMessage>("client_talk.json");
    }

    #[test]
    fn client_talk_is_single_line() {
        let msg: ChatMessage = serde_json::from_str(&load_frame("client_talk.json")).unwrap();
        let frame = serde_json::to_string(&msg).unwrap();
        assert!(!frame.contains('\n'));
        assert!(!frame.contains("to_server"));
        assert!(!frame.contains("str_files"));
    }

    #[test]
    fn join_replies_are_not_messages() {
        for reply in ["joined", "!!! room not found"] {
            assert_eq!(
                InboundFrame::parse(reply).unwrap(),
                InboundFrame::Reply(reply.to_string())
            );
        }
    }
}
