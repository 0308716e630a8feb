//! STOMP 1.2 frame codec.
//!
//! A frame is a command line, zero or more `key:value` header lines, an
//! empty line, and a body terminated by NUL. Lone newlines between frames
//! are heart-beats and are skipped. Header values are escaped on the wire
//! (`\n` `\r` `\c` `\\`) for every frame except CONNECT/CONNECTED.

use std::io;

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames larger than this are rejected as a protocol error.
const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// One STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    /// Frame command (CONNECT, CONNECTED, SUBSCRIBE, MESSAGE, ERROR, ...).
    pub command: String,
    /// Header lines in order of appearance.
    pub headers: Vec<(String, String)>,
    /// Frame body, without the NUL terminator.
    pub body: Vec<u8>,
}

impl StompFrame {
    /// Create a frame with no headers and no body.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame for the HMC notification service.
    pub fn connect(host: &str, login: &str, passcode: &str) -> Self {
        Self::new("CONNECT")
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("login", login)
            .with_header("passcode", passcode)
            .with_header("heart-beat", "0,0")
    }

    /// SUBSCRIBE frame for a topic destination.
    pub fn subscribe(id: usize, topic: &str) -> Self {
        Self::new("SUBSCRIBE")
            .with_header("id", id.to_string())
            .with_header("destination", format!("/topic/{topic}"))
            .with_header("ack", "auto")
    }

    /// DISCONNECT frame.
    pub fn disconnect() -> Self {
        Self::new("DISCONNECT")
    }

    /// Whether header values of this frame are escaped on the wire.
    /// CONNECT and CONNECTED frames are transmitted unescaped.
    fn escapes_headers(&self) -> bool {
        self.command != "CONNECT" && self.command != "CONNECTED"
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, io::Error> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid STOMP header escape: \\{other:?}"),
                ));
            }
        }
    }
    Ok(out)
}

/// tokio-util codec for STOMP frames.
#[derive(Debug, Default)]
pub struct StompCodec;

impl Decoder for StompCodec {
    type Item = StompFrame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<StompFrame>, io::Error> {
        // Heart-beats: lone EOLs between frames.
        while !src.is_empty() && (src[0] == b'\n' || src[0] == b'\r') {
            src.advance(1);
        }
        if src.is_empty() {
            return Ok(None);
        }

        let Some(head_end) = find_header_end(src) else {
            if src.len() > MAX_FRAME_SIZE {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "STOMP frame exceeds maximum size",
                ));
            }
            return Ok(None);
        };

        // Parse the head without consuming, so incomplete bodies can wait
        // for more data.
        let head = std::str::from_utf8(&src[..head_end])
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut lines = head.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l));
        let command = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty STOMP command"))?
            .to_string();
        let escaped = command != "CONNECT" && command != "CONNECTED";
        let mut headers = Vec::new();
        let mut content_length = None;
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line.split_once(':').ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("malformed STOMP header line: {line:?}"),
                )
            })?;
            let (name, value) = if escaped {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            if name == "content-length" && content_length.is_none() {
                content_length = value.parse::<usize>().ok();
            }
            headers.push((name, value));
        }

        let body_start = head_end + body_separator_len(src, head_end);
        let (body, consumed) = match content_length {
            Some(len) => {
                // Body is exactly len bytes, then NUL.
                if src.len() < body_start + len + 1 {
                    return Ok(None);
                }
                if src[body_start + len] != b'\0' {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "STOMP frame body not NUL-terminated at content-length",
                    ));
                }
                (
                    src[body_start..body_start + len].to_vec(),
                    body_start + len + 1,
                )
            }
            None => {
                let Some(nul) = src[body_start..].iter().position(|&b| b == b'\0') else {
                    if src.len() > MAX_FRAME_SIZE {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "STOMP frame exceeds maximum size",
                        ));
                    }
                    return Ok(None);
                };
                (
                    src[body_start..body_start + nul].to_vec(),
                    body_start + nul + 1,
                )
            }
        };

        src.advance(consumed);
        Ok(Some(StompFrame {
            command,
            headers,
            body,
        }))
    }
}

impl Encoder<StompFrame> for StompCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: StompFrame, dst: &mut BytesMut) -> Result<(), io::Error> {
        let escaped = frame.escapes_headers();
        dst.put_slice(frame.command.as_bytes());
        dst.put_u8(b'\n');
        for (name, value) in &frame.headers {
            if escaped {
                dst.put_slice(escape(name).as_bytes());
                dst.put_u8(b':');
                dst.put_slice(escape(value).as_bytes());
            } else {
                dst.put_slice(name.as_bytes());
                dst.put_u8(b':');
                dst.put_slice(value.as_bytes());
            }
            dst.put_u8(b'\n');
        }
        if !frame.body.is_empty() {
            dst.put_slice(format!("content-length:{}\n", frame.body.len()).as_bytes());
        }
        dst.put_u8(b'\n');
        dst.put_slice(&frame.body);
        dst.put_u8(b'\0');
        Ok(())
    }
}

/// Byte offset of the blank line ending the header section, i.e. the
/// position just after the last header's EOL.
fn find_header_end(src: &BytesMut) -> Option<usize> {
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\n' {
            match src.get(i + 1) {
                Some(b'\n') => return Some(i + 1),
                Some(b'\r') if src.get(i + 2) == Some(&b'\n') => return Some(i + 1),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Length of the blank line at `head_end` (1 for `\n`, 2 for `\r\n`).
fn body_separator_len(src: &BytesMut, head_end: usize) -> usize {
    if src.get(head_end) == Some(&b'\r') { 2 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn decode_all(input: &[u8]) -> Vec<StompFrame> {
        let mut codec = StompCodec;
        let mut buf = BytesMut::from(input);
        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn roundtrip_message_frame() {
        let frame = StompFrame::new("MESSAGE")
            .with_header("destination", "/topic/t1")
            .with_header("notification-type", "property-change")
            .with_body(br#"{"change-reports":[]}"#.to_vec());
        let mut buf = BytesMut::new();
        StompCodec.encode(frame.clone(), &mut buf).unwrap();
        let mut decoded = decode_all(&buf);
        assert_eq!(decoded.len(), 1);
        let got = decoded.pop().unwrap();
        assert_eq!(got.command, "MESSAGE");
        assert_eq!(got.header("destination"), Some("/topic/t1"));
        assert_eq!(got.header("content-length"), Some("21"));
        assert_eq!(got.body, frame.body);
    }

    #[test]
    fn heartbeats_between_frames_are_skipped() {
        let input = b"\n\nCONNECTED\nversion:1.2\n\n\0\n\nMESSAGE\ndestination:/topic/t\n\nhi\0";
        let frames = decode_all(input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, "CONNECTED");
        assert_eq!(frames[1].body, b"hi");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let input = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = decode_all(input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body, b"a\0b");
    }

    #[test]
    fn partial_frame_waits_for_more_data() {
        let mut codec = StompCodec;
        let mut buf = BytesMut::from(&b"MESSAGE\ndestination:/topic/t\n\npartial body"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.put_u8(b'\0');
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn header_values_are_escaped_on_the_wire() {
        let frame = StompFrame::new("SEND").with_header("key", "a:b\nc\\d");
        let mut buf = BytesMut::new();
        StompCodec.encode(frame, &mut buf).unwrap();
        let wire = String::from_utf8(buf.to_vec()).unwrap();
        assert!(wire.contains("key:a\\cb\\nc\\\\d"));
        let decoded = decode_all(wire.as_bytes());
        assert_eq!(decoded[0].header("key"), Some("a:b\nc\\d"));
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = StompFrame::connect("hmc1", "user", "pw");
        let mut buf = BytesMut::new();
        StompCodec.encode(frame, &mut buf).unwrap();
        let wire = String::from_utf8(buf.to_vec()).unwrap();
        assert!(wire.contains("heart-beat:0,0"));
        assert!(!wire.contains("\\c"));
    }

    #[test]
    fn malformed_header_line_is_an_error() {
        let mut codec = StompCodec;
        let mut buf = BytesMut::from(&b"MESSAGE\nno-colon-here\n\nx\0"[..]);
        assert!(codec.decode(&mut buf).is_err());
    }
}
