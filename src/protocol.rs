//! Wire format.
//!
//! Newline-delimited JSON over a stream socket.
//!
//! Request: `{"op": "dig_out", "time": 5.0, "value": 255}\n`
//! Reply: `{"ok": true, "payload": {"kind": "empty"}}\n`

use crate::command::{Command, Reply};
use crate::error::Result;

pub fn decode_command(line: &str) -> Result<Command> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn encode_command(command: &Command) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(command)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn decode_reply(line: &str) -> Result<Reply> {
    Ok(serde_json::from_str(line.trim())?)
}

pub fn encode_reply(reply: &Reply) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(reply)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{DigInPayload, ReplyPayload};
    use crate::error::Error;

    #[test]
    fn unit_commands_are_bare_ops() {
        let bytes = encode_command(&Command::DigIn).unwrap();
        assert_eq!(bytes, b"{\"op\":\"dig_in\"}\n");
        assert_eq!(decode_command(" {\"op\":\"list\"} \n").unwrap(), Command::List);
    }

    #[test]
    fn garbage_is_a_json_error() {
        let err = decode_command("digout 5 255").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn dig_in_reply_uses_original_field_names() {
        let reply = Reply::ok(ReplyPayload::Events(DigInPayload {
            kind: vec![1],
            line: vec![4],
            when: vec![0.5],
            dropped: 0,
        }));
        let text = String::from_utf8(encode_reply(&reply).unwrap()).unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(value["payload"]["kind"], "events");
        assert_eq!(value["payload"]["type"][0], 1);
        assert_eq!(value["payload"]["line"][0], 4);
        assert_eq!(value["payload"]["when"][0], 0.5);
        assert_eq!(decode_reply(&text).unwrap(), reply);
    }

    #[test]
    fn reply_without_payload_decodes_as_empty() {
        let reply = decode_reply(r#"{"ok":true}"#).unwrap();
        assert_eq!(reply.payload, ReplyPayload::Empty);
    }
}
