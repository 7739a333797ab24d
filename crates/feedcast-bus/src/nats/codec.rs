//! Framing for the NATS text protocol.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::errors::BusError;

/// Longest control line accepted before the frame is rejected.
const MAX_CONTROL_LINE: usize = 4096;

/// Largest `MSG` payload accepted before the server announced its own limit.
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024 * 1024;

const CRLF: &[u8] = b"\r\n";

/// Subset of the `INFO` document sent by the server on connect.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    /// Server ID.
    #[serde(default)]
    pub server_id: String,
    /// Server version string.
    #[serde(default)]
    pub version: String,
    /// Largest payload the server accepts, in bytes.
    #[serde(default)]
    pub max_payload: usize,
    /// Whether the server requires credentials.
    #[serde(default)]
    pub auth_required: bool,
}

/// Frames sent by the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerOp {
    /// Server information, first frame of every connection.
    Info(ServerInfo),
    /// A message delivered to one of our subscriptions.
    Msg {
        /// Subject it was published on.
        subject: String,
        /// Subscription ID it matched.
        sid: u64,
        /// Reply subject, if any.
        reply_to: Option<String>,
        /// Raw payload.
        payload: Bytes,
    },
    /// Keepalive ping; must be answered with `PONG`.
    Ping,
    /// Answer to our `PING`.
    Pong,
    /// Acknowledgement in verbose mode.
    Ok,
    /// Server-side error; most are followed by the server closing the socket.
    Err(String),
}

/// `CONNECT` options sent after `INFO`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectInfo {
    /// Ask for `+OK` after every frame.
    pub verbose: bool,
    /// Strict subject checking.
    pub pedantic: bool,
    /// Client name shown in server monitoring.
    pub name: String,
    /// Client implementation language.
    pub lang: String,
    /// Client version.
    pub version: String,
    /// Protocol level (1 = dynamic reconfiguration aware).
    pub protocol: u8,
    /// Receive our own publishes on matching subscriptions.
    pub echo: bool,
    /// Username, when the address carries credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Password, when the address carries credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass: Option<String>,
}

impl ConnectInfo {
    /// Defaults for a client with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            verbose: false,
            pedantic: false,
            name: name.into(),
            lang: "rust".into(),
            version: feedcast_core::constants::VERSION.into(),
            protocol: 1,
            echo: true,
            user: None,
            pass: None,
        }
    }
}

/// Frames sent by the client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientOp {
    /// Handshake options.
    Connect(ConnectInfo),
    /// Publish `payload` on `subject`.
    Pub {
        /// Target subject.
        subject: String,
        /// Raw payload.
        payload: Bytes,
    },
    /// Subscribe `sid` to `subject`.
    Sub {
        /// Subject to match.
        subject: String,
        /// Client-chosen subscription ID.
        sid: u64,
    },
    /// Drop subscription `sid`.
    Unsub {
        /// Subscription ID.
        sid: u64,
    },
    /// Keepalive ping.
    Ping,
    /// Answer to a server `PING`.
    Pong,
}

/// Codec for [`ServerOp`] in and [`ClientOp`] out.
///
/// `MSG` frames announcing a payload above `max_payload` are rejected before
/// any buffer space is reserved for them.
#[derive(Clone, Copy, Debug)]
pub struct NatsCodec {
    max_payload: usize,
}

impl NatsCodec {
    /// Create a codec capped at [`DEFAULT_MAX_PAYLOAD`].
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Create a codec capped at the server's announced `max_payload`.
    ///
    /// Zero (no limit announced) and values above [`DEFAULT_MAX_PAYLOAD`]
    /// fall back to the default cap.
    pub fn with_max_payload(max_payload: usize) -> Self {
        let max_payload = if max_payload == 0 {
            DEFAULT_MAX_PAYLOAD
        } else {
            max_payload.min(DEFAULT_MAX_PAYLOAD)
        };
        Self { max_payload }
    }

    /// Largest payload this codec will decode.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for NatsCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

fn protocol(msg: impl Into<String>) -> BusError {
    BusError::Protocol(msg.into())
}

/// Parsed `MSG` control line, before the payload is available.
struct MsgHeader {
    subject: String,
    sid: u64,
    reply_to: Option<String>,
    len: usize,
}

fn parse_msg_args(args: &str) -> Result<MsgHeader, BusError> {
    let parts: Vec<&str> = args.split_ascii_whitespace().collect();
    let (subject, sid, reply_to, len) = match parts.as_slice() {
        [subject, sid, len] => (*subject, *sid, None, *len),
        [subject, sid, reply, len] => (*subject, *sid, Some((*reply).to_owned()), *len),
        _ => return Err(protocol(format!("malformed MSG arguments: {args:?}"))),
    };
    Ok(MsgHeader {
        subject: subject.to_owned(),
        sid: sid
            .parse()
            .map_err(|_| protocol(format!("invalid MSG sid: {sid:?}")))?,
        reply_to,
        len: len
            .parse()
            .map_err(|_| protocol(format!("invalid MSG length: {len:?}")))?,
    })
}

impl Decoder for NatsCodec {
    type Item = ServerOp;
    type Error = BusError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ServerOp>, BusError> {
        let Some(line_end) = find_crlf(src) else {
            if src.len() > MAX_CONTROL_LINE {
                return Err(protocol("control line too long"));
            }
            return Ok(None);
        };

        let line = std::str::from_utf8(&src[..line_end])
            .map_err(|_| protocol("control line is not UTF-8"))?;
        let (op, args) = match line.split_once([' ', '\t']) {
            Some((op, args)) => (op, args.trim()),
            None => (line, ""),
        };

        if op.eq_ignore_ascii_case("MSG") {
            let header = parse_msg_args(args)?;
            if header.len > self.max_payload {
                return Err(protocol(format!(
                    "MSG payload of {} bytes exceeds limit {}",
                    header.len, self.max_payload
                )));
            }
            let frame_len = (line_end + 2 * CRLF.len())
                .checked_add(header.len)
                .ok_or_else(|| protocol("MSG length overflows"))?;
            if src.len() < frame_len {
                src.reserve(frame_len - src.len());
                return Ok(None);
            }
            src.advance(line_end + CRLF.len());
            let payload = src.split_to(header.len).freeze();
            if &src[..CRLF.len()] != CRLF {
                return Err(protocol("MSG payload not terminated by CRLF"));
            }
            src.advance(CRLF.len());
            return Ok(Some(ServerOp::Msg {
                subject: header.subject,
                sid: header.sid,
                reply_to: header.reply_to,
                payload,
            }));
        }

        let frame = if op.eq_ignore_ascii_case("PING") {
            ServerOp::Ping
        } else if op.eq_ignore_ascii_case("PONG") {
            ServerOp::Pong
        } else if op.eq_ignore_ascii_case("+OK") {
            ServerOp::Ok
        } else if op.eq_ignore_ascii_case("-ERR") {
            ServerOp::Err(args.trim_matches('\'').to_owned())
        } else if op.eq_ignore_ascii_case("INFO") {
            ServerOp::Info(serde_json::from_str(args)?)
        } else {
            return Err(protocol(format!("unknown operation {op:?}")));
        };
        src.advance(line_end + CRLF.len());
        Ok(Some(frame))
    }
}

impl Encoder<ClientOp> for NatsCodec {
    type Error = BusError;

    fn encode(&mut self, item: ClientOp, dst: &mut BytesMut) -> Result<(), BusError> {
        match item {
            ClientOp::Connect(info) => {
                let json = serde_json::to_vec(&info)?;
                dst.reserve(json.len() + 10);
                dst.put_slice(b"CONNECT ");
                dst.put_slice(&json);
                dst.put_slice(CRLF);
            }
            ClientOp::Pub { subject, payload } => {
                let line = format!("PUB {subject} {}\r\n", payload.len());
                dst.reserve(line.len() + payload.len() + CRLF.len());
                dst.put_slice(line.as_bytes());
                dst.put_slice(&payload);
                dst.put_slice(CRLF);
            }
            ClientOp::Sub { subject, sid } => {
                dst.put_slice(format!("SUB {subject} {sid}\r\n").as_bytes());
            }
            ClientOp::Unsub { sid } => {
                dst.put_slice(format!("UNSUB {sid}\r\n").as_bytes());
            }
            ClientOp::Ping => dst.put_slice(b"PING\r\n"),
            ClientOp::Pong => dst.put_slice(b"PONG\r\n"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn decode_all(input: &[u8]) -> Vec<ServerOp> {
        let mut codec = NatsCodec::new();
        let mut buf = BytesMut::from(input);
        let mut out = Vec::new();
        while let Some(op) = codec.decode(&mut buf).unwrap() {
            out.push(op);
        }
        assert!(buf.is_empty(), "undecoded bytes left: {buf:?}");
        out
    }

    fn encode(op: ClientOp) -> String {
        let mut buf = BytesMut::new();
        NatsCodec::new().encode(op, &mut buf).unwrap();
        String::from_utf8(buf.to_vec()).unwrap()
    }

    #[test]
    fn decode_info() {
        let ops = decode_all(
            b"INFO {\"server_id\":\"abc\",\"version\":\"2.10.0\",\"max_payload\":1048576}\r\n",
        );
        assert_eq!(
            ops,
            vec![ServerOp::Info(ServerInfo {
                server_id: "abc".into(),
                version: "2.10.0".into(),
                max_payload: 1_048_576,
                auth_required: false,
            })]
        );
    }

    #[test]
    fn decode_control_frames_case_insensitive() {
        let ops = decode_all(b"PING\r\npong\r\n+OK\r\n-ERR 'Unknown Protocol Operation'\r\n");
        assert_eq!(
            ops,
            vec![
                ServerOp::Ping,
                ServerOp::Pong,
                ServerOp::Ok,
                ServerOp::Err("Unknown Protocol Operation".into()),
            ]
        );
    }

    #[test]
    fn decode_msg_with_and_without_reply() {
        let ops = decode_all(b"MSG created_feed 1 5\r\nhello\r\nMSG a.b 22 inbox.1 0\r\n\r\n");
        assert_eq!(
            ops,
            vec![
                ServerOp::Msg {
                    subject: "created_feed".into(),
                    sid: 1,
                    reply_to: None,
                    payload: Bytes::from_static(b"hello"),
                },
                ServerOp::Msg {
                    subject: "a.b".into(),
                    sid: 22,
                    reply_to: Some("inbox.1".into()),
                    payload: Bytes::new(),
                },
            ]
        );
    }

    #[test]
    fn payload_may_contain_crlf() {
        let ops = decode_all(b"MSG t 3 6\r\na\r\nb\r\n\r\n");
        assert_matches!(&ops[..], [ServerOp::Msg { payload, .. }] if &payload[..] == b"a\r\nb\r\n");
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let mut codec = NatsCodec::new();
        let mut buf = BytesMut::from(&b"MSG t 1 10\r\nhal"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"f-a-msg\r\nPI");
        assert_matches!(codec.decode(&mut buf).unwrap(), Some(ServerOp::Msg { payload, .. }) if &payload[..] == b"half-a-msg");
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"NG\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(ServerOp::Ping));
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        let mut codec = NatsCodec::new();
        for input in [
            &b"BOGUS\r\n"[..],
            b"MSG only-subject\r\n",
            b"MSG t notanumber 1\r\nx\r\n",
            b"MSG t 1 2\r\nabcd\r\n",
        ] {
            let mut buf = BytesMut::from(input);
            assert_matches!(codec.decode(&mut buf), Err(BusError::Protocol(_)), "input {input:?}");
        }
    }

    #[test]
    fn huge_msg_length_rejected_without_allocating() {
        for input in [&b"MSG t 1 18446744073709551615\r\n"[..], b"MSG t 1 1099511627776\r\n"] {
            let mut buf = BytesMut::from(input);
            assert_matches!(NatsCodec::new().decode(&mut buf), Err(BusError::Protocol(_)), "input {input:?}");
            assert!(buf.capacity() < 1024);
        }
    }

    #[test]
    fn server_max_payload_caps_msg() {
        let mut codec = NatsCodec::with_max_payload(4);
        let mut buf = BytesMut::from(&b"MSG t 1 4\r\nabcd\r\nMSG t 1 5\r\nabcde\r\n"[..]);
        assert_matches!(codec.decode(&mut buf), Ok(Some(ServerOp::Msg { .. })));
        assert_matches!(codec.decode(&mut buf), Err(BusError::Protocol(_)));
    }

    #[test]
    fn announced_max_payload_is_bounded() {
        assert_eq!(NatsCodec::with_max_payload(0).max_payload(), DEFAULT_MAX_PAYLOAD);
        assert_eq!(NatsCodec::with_max_payload(usize::MAX).max_payload(), DEFAULT_MAX_PAYLOAD);
        assert_eq!(NatsCodec::with_max_payload(1_048_576).max_payload(), 1_048_576);
    }

    #[test]
    fn overlong_control_line_rejected() {
        let mut buf = BytesMut::from(vec![b'x'; MAX_CONTROL_LINE + 1].as_slice());
        assert_matches!(NatsCodec::new().decode(&mut buf), Err(BusError::Protocol(_)));
    }

    #[test]
    fn encode_client_ops() {
        assert_eq!(
            encode(ClientOp::Pub {
                subject: "created_feed".into(),
                payload: Bytes::from_static(b"{}"),
            }),
            "PUB created_feed 2\r\n{}\r\n"
        );
        assert_eq!(
            encode(ClientOp::Sub {
                subject: "created_feed".into(),
                sid: 3,
            }),
            "SUB created_feed 3\r\n"
        );
        assert_eq!(encode(ClientOp::Unsub { sid: 3 }), "UNSUB 3\r\n");
        assert_eq!(encode(ClientOp::Ping), "PING\r\n");
        assert_eq!(encode(ClientOp::Pong), "PONG\r\n");
    }

    #[test]
    fn encode_connect_omits_missing_credentials() {
        let line = encode(ClientOp::Connect(ConnectInfo::new("feedcast")));
        assert!(line.starts_with("CONNECT {"));
        assert!(line.ends_with("}\r\n"));
        let json: serde_json::Value = serde_json::from_str(&line[8..line.len() - 2]).unwrap();
        assert_eq!(json["name"], "feedcast");
        assert_eq!(json["verbose"], false);
        assert!(json.get("user").is_none());
    }
}
