//! Lookup message parsing and construction.
//!
//! Every message is `<marker>#<text>` sent as raw bytes with no length
//! prefix. One transport read is one message, so a message must fit in
//! [`MAX_MESSAGE_SIZE`] bytes.

use crate::error::ProtocolError;

/// Largest message a single read accepts, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 1024;

/// Separator between the marker byte and the message text.
pub const SEPARATOR: u8 = b'#';

const MARKER_TERMINATE: u8 = b'0';
const MARKER_FORWARD: u8 = b'1';
const MARKER_REVERSE: u8 = b'2';

/// Which axis of the name/address mapping a query is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Resolve a name to an address.
    Forward,
    /// Resolve an address to a name.
    Reverse,
}

impl Direction {
    const fn marker(self) -> u8 {
        match self {
            Direction::Forward => MARKER_FORWARD,
            Direction::Reverse => MARKER_REVERSE,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// A single lookup parsed from a client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub direction: Direction,
    pub key: String,
}

impl Query {
    pub fn new(direction: Direction, key: impl Into<String>) -> Self {
        Self {
            direction,
            key: key.into(),
        }
    }

    /// Build the wire form `<1|2>#<key>`.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(2 + self.key.len());
        buf.push(self.direction.marker());
        buf.push(SEPARATOR);
        buf.extend_from_slice(self.key.as_bytes());
        buf
    }
}

/// A classified client (or proxy-to-backend) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Marker `0`: end the session without a reply.
    Terminate,
    Lookup(Query),
}

impl Request {
    /// Parse a request from the bytes of one read.
    ///
    /// A single trailing newline (`\n` or `\r\n`) is dropped from the key so
    /// that line-oriented tools can talk to the server.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&marker, rest) = data.split_first().ok_or(ProtocolError::Empty)?;

        let direction = match marker {
            MARKER_TERMINATE => return Ok(Request::Terminate),
            MARKER_FORWARD => Direction::Forward,
            MARKER_REVERSE => Direction::Reverse,
            other => return Err(ProtocolError::UnknownMarker(other as char)),
        };

        let key = match rest.split_first() {
            Some((&SEPARATOR, key)) => strip_line_ending(key),
            _ => return Err(ProtocolError::MissingSeparator),
        };
        if key.is_empty() {
            return Err(ProtocolError::EmptyKey);
        }
        let key = std::str::from_utf8(key).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Request::Lookup(Query::new(direction, key)))
    }
}

/// Reply status, with a fixed byte for each value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// `0`: proxy answered, from cache or from the backend.
    Success,
    /// `3`: backend found a record.
    Found,
    /// `4`: backend has no record for the key.
    NotFound,
    /// `-`: backend is down or its datastore is unreadable.
    Unavailable,
}

impl Status {
    pub const fn as_byte(self) -> u8 {
        match self {
            Status::Success => b'0',
            Status::Found => b'3',
            Status::NotFound => b'4',
            Status::Unavailable => b'-',
        }
    }

    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'0' => Some(Status::Success),
            b'3' => Some(Status::Found),
            b'4' => Some(Status::NotFound),
            b'-' => Some(Status::Unavailable),
            _ => None,
        }
    }
}

/// A `<status>#<payload>` reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub payload: String,
}

impl Reply {
    pub fn new(status: Status, payload: impl Into<String>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    pub fn success(payload: impl Into<String>) -> Self {
        Self::new(Status::Success, payload)
    }

    pub fn unavailable(diagnostic: impl Into<String>) -> Self {
        Self::new(Status::Unavailable, diagnostic)
    }

    /// Parse a reply from the bytes of one read.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        let (&marker, rest) = data.split_first().ok_or(ProtocolError::Empty)?;
        let status =
            Status::from_byte(marker).ok_or(ProtocolError::UnknownMarker(marker as char))?;

        let payload = match rest.split_first() {
            Some((&SEPARATOR, payload)) => payload,
            // A bare status byte is a reply with an empty payload.
            None => &[][..],
            Some(_) => return Err(ProtocolError::MissingSeparator),
        };
        let payload = std::str::from_utf8(payload).map_err(|_| ProtocolError::InvalidUtf8)?;

        Ok(Self::new(status, payload))
    }

    /// Build the wire form, truncated to [`MAX_MESSAGE_SIZE`] on a character
    /// boundary.
    pub fn encode(&self) -> Vec<u8> {
        let mut payload = self.payload.as_str();
        let room = MAX_MESSAGE_SIZE - 2;
        if payload.len() > room {
            let mut end = room;
            while !payload.is_char_boundary(end) {
                end -= 1;
            }
            payload = &payload[..end];
        }

        let mut buf = Vec::with_capacity(2 + payload.len());
        buf.push(self.status.as_byte());
        buf.push(SEPARATOR);
        buf.extend_from_slice(payload.as_bytes());
        buf
    }
}

fn strip_line_ending(data: &[u8]) -> &[u8] {
    let data = data.strip_suffix(b"\n").unwrap_or(data);
    data.strip_suffix(b"\r").unwrap_or(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_forward_and_reverse_lookups() {
        assert_eq!(
            Request::parse(b"1#example.com"),
            Ok(Request::Lookup(Query::new(Direction::Forward, "example.com")))
        );
        assert_eq!(
            Request::parse(b"2#93.0.0.1"),
            Ok(Request::Lookup(Query::new(Direction::Reverse, "93.0.0.1")))
        );
    }

    #[test]
    fn terminate_ignores_the_rest_of_the_message() {
        assert_eq!(Request::parse(b"0#"), Ok(Request::Terminate));
        assert_eq!(Request::parse(b"0"), Ok(Request::Terminate));
        assert_eq!(Request::parse(b"0#bye"), Ok(Request::Terminate));
    }

    #[test]
    fn strips_one_trailing_newline_from_key() {
        assert_eq!(
            Request::parse(b"1#example.com\r\n"),
            Ok(Request::Lookup(Query::new(Direction::Forward, "example.com")))
        );
        assert_eq!(
            Request::parse(b"2#10.0.0.1\n"),
            Ok(Request::Lookup(Query::new(Direction::Reverse, "10.0.0.1")))
        );
    }

    #[test]
    fn rejects_malformed_requests() {
        assert_eq!(Request::parse(b""), Err(ProtocolError::Empty));
        assert_eq!(
            Request::parse(b"7#example.com"),
            Err(ProtocolError::UnknownMarker('7'))
        );
        assert_eq!(
            Request::parse(b"1example.com"),
            Err(ProtocolError::MissingSeparator)
        );
        assert_eq!(Request::parse(b"1"), Err(ProtocolError::MissingSeparator));
        assert_eq!(Request::parse(b"2#"), Err(ProtocolError::EmptyKey));
        assert_eq!(Request::parse(b"1#\n"), Err(ProtocolError::EmptyKey));
        assert_eq!(
            Request::parse(&[b'1', b'#', 0xff, 0xfe]),
            Err(ProtocolError::InvalidUtf8)
        );
    }

    #[test]
    fn query_encodes_to_request_wire_form() {
        assert_eq!(
            Query::new(Direction::Forward, "example.com").encode(),
            b"1#example.com"
        );
        assert_eq!(Query::new(Direction::Reverse, "1.2.3.4").encode(), b"2#1.2.3.4");
    }

    #[test]
    fn status_bytes_match_the_wire_table() {
        for (status, byte) in [
            (Status::Success, b'0'),
            (Status::Found, b'3'),
            (Status::NotFound, b'4'),
            (Status::Unavailable, b'-'),
        ] {
            assert_eq!(status.as_byte(), byte);
            assert_eq!(Status::from_byte(byte), Some(status));
        }
        assert_eq!(Status::from_byte(b'1'), None);
        assert_eq!(Status::from_byte(b'#'), None);
    }

    #[test]
    fn parses_backend_replies() {
        assert_eq!(
            Reply::parse(b"3#93.0.0.1"),
            Ok(Reply::new(Status::Found, "93.0.0.1"))
        );
        assert_eq!(
            Reply::parse(b"4#Entry Not Found"),
            Ok(Reply::new(Status::NotFound, "Entry Not Found"))
        );
        assert_eq!(
            Reply::parse(b"-#Database corrupted"),
            Ok(Reply::unavailable("Database corrupted"))
        );
        assert_eq!(Reply::parse(b"-"), Ok(Reply::unavailable("")));
        assert_eq!(Reply::parse(b"9#x"), Err(ProtocolError::UnknownMarker('9')));
        assert_eq!(Reply::parse(b"3x"), Err(ProtocolError::MissingSeparator));
    }

    #[test]
    fn reply_encode_truncates_oversized_payload() {
        let long = "é".repeat(MAX_MESSAGE_SIZE);
        let encoded = Reply::success(long).encode();

        assert!(encoded.len() <= MAX_MESSAGE_SIZE);
        assert_eq!(&encoded[..2], b"0#");
        assert!(std::str::from_utf8(&encoded[2..]).is_ok());
    }
}
