//! Wire protocol: length-prefixed token frames
//!
//! Every message is a frame of opaque byte tokens:
//!
//! ```text
//! i32 token_count | i32 len_0 | bytes_0 | i32 len_1 | bytes_1 | ...
//! ```
//!
//! All integers are 4-byte big-endian. The first token of a request frame is
//! the command name.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::FastdevError;

/// Reply sent on success
pub const OK: &str = "OK";
/// Reply sent when the shared secret does not match, or before a handshake
pub const INVALID_HANDSHAKE: &str = "Invalid Handshake";
/// Reply sent when `get` resolves no file
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Reply sent for kill/restart requests when no app has registered
pub const APP_NOT_CONNECTED: &str = "App not connected";

/// Default cap on a single token (64 MiB)
pub const DEFAULT_MAX_TOKEN_LEN: usize = 64 * 1024 * 1024;
/// Default cap on the number of tokens in one frame
pub const DEFAULT_MAX_TOKENS: usize = 1024;

const HEADER_LEN: usize = 4;

/// An ordered sequence of byte tokens
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    tokens: Vec<Bytes>,
}

impl Frame {
    pub fn new(tokens: Vec<Bytes>) -> Self {
        Self { tokens }
    }

    /// Build a frame from anything that converts to bytes
    pub fn from_parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        Self {
            tokens: parts.into_iter().map(Into::into).collect(),
        }
    }

    /// A frame with exactly one token
    pub fn single(token: impl Into<Bytes>) -> Self {
        Self {
            tokens: vec![token.into()],
        }
    }

    pub fn tokens(&self) -> &[Bytes] {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Bytes> {
        self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Token at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.tokens.get(index)
    }

    /// The command token (first token), decoded
    pub fn command(&self) -> Option<Command> {
        self.tokens.first().map(|t| Command::parse(t))
    }

    /// First token as lossy UTF-8, used for textual replies
    pub fn first_text(&self) -> Option<String> {
        self.tokens
            .first()
            .map(|t| String::from_utf8_lossy(t).into_owned())
    }

    /// Size of this frame on the wire
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.tokens.iter().map(|t| HEADER_LEN + t.len()).sum::<usize>()
    }
}

/// Request commands understood by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Handshake,
    ScriptHandshake,
    Get,
    KillApp,
    RestartApp,
    Status,
    Shutdown,
    Unknown(String),
}

impl Command {
    pub fn parse(token: &[u8]) -> Self {
        match token {
            b"handshake" => Self::Handshake,
            b"script-handshake" => Self::ScriptHandshake,
            b"get" => Self::Get,
            b"kill-app" => Self::KillApp,
            b"restart-app" => Self::RestartApp,
            b"status" => Self::Status,
            b"shutdown" => Self::Shutdown,
            other => Self::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Handshake => "handshake",
            Self::ScriptHandshake => "script-handshake",
            Self::Get => "get",
            Self::KillApp => "kill-app",
            Self::RestartApp => "restart-app",
            Self::Status => "status",
            Self::Shutdown => "shutdown",
            Self::Unknown(name) => name,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, Self::Handshake | Self::ScriptHandshake)
    }
}

/// Control signal forwarded to the connected app
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppSignal {
    Kill,
    Restart,
}

impl AppSignal {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Kill => "kill",
            Self::Restart => "restart",
        }
    }
}

/// Server status returned by the `status` command
///
/// Serialized as a single JSON token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(rename = "uptime")]
    pub uptime_seconds: u64,
    #[serde(rename = "pid")]
    pub process_id: u32,
    pub app_connected: bool,
    pub request_count: u64,
    pub port: u16,
}

/// Length-prefixed token codec
///
/// Decoding only consumes bytes once a complete frame is buffered, so a read
/// interrupted by a timeout resumes without losing partial input.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_token_len: usize,
    max_tokens: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKEN_LEN)
    }
}

impl FrameCodec {
    pub fn new(max_token_len: usize) -> Self {
        Self {
            max_token_len,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Total byte length of the frame at the head of `src`, or `None` if more
    /// input is needed.
    fn complete_len(&self, src: &[u8]) -> Result<Option<usize>, FastdevError> {
        let Some(count) = read_i32(src, 0) else {
            return Ok(None);
        };
        if count < 0 {
            return Err(FastdevError::protocol(format!("negative token count {}", count)));
        }
        let count = count as usize;
        if count > self.max_tokens {
            return Err(FastdevError::protocol(format!(
                "token count {} exceeds limit {}",
                count, self.max_tokens
            )));
        }

        let mut offset = HEADER_LEN;
        for _ in 0..count {
            let Some(len) = read_i32(src, offset) else {
                return Ok(None);
            };
            if len < 0 {
                return Err(FastdevError::protocol(format!("negative token length {}", len)));
            }
            let len = len as usize;
            if len > self.max_token_len {
                return Err(FastdevError::protocol(format!(
                    "token length {} exceeds limit {}",
                    len, self.max_token_len
                )));
            }
            offset += HEADER_LEN + len;
            if src.len() < offset {
                return Ok(None);
            }
        }
        Ok(Some(offset))
    }
}

fn read_i32(src: &[u8], offset: usize) -> Option<i32> {
    let bytes = src.get(offset..offset + HEADER_LEN)?;
    Some(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FastdevError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FastdevError> {
        let Some(total) = self.complete_len(src)? else {
            return Ok(None);
        };

        let mut frame = src.split_to(total).freeze();
        let count = frame.get_i32() as usize;
        let mut tokens = Vec::with_capacity(count);
        for _ in 0..count {
            let len = frame.get_i32() as usize;
            tokens.push(frame.split_to(len));
        }
        Ok(Some(Frame::new(tokens)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FastdevError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FastdevError::protocol(format!(
                "connection closed mid-frame ({} bytes buffered)",
                src.len()
            ))),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FastdevError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FastdevError> {
        if frame.len() > i32::MAX as usize {
            return Err(FastdevError::protocol("too many tokens to encode"));
        }
        dst.reserve(frame.encoded_len());
        dst.put_i32(frame.len() as i32);
        for token in frame.tokens {
            if token.len() > i32::MAX as usize {
                return Err(FastdevError::protocol("token too large to encode"));
            }
            dst.put_i32(token.len() as i32);
            dst.put_slice(&token);
        }
        Ok(())
    }
}

/// Read the next frame; `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<S>(stream: &mut S) -> Result<Option<Frame>, FastdevError>
where
    S: Stream<Item = Result<Frame, FastdevError>> + Unpin,
{
    stream.next().await.transpose()
}

/// Write one frame and flush it.
pub async fn write_frame<S>(sink: &mut S, frame: Frame) -> Result<(), FastdevError>
where
    S: Sink<Frame, Error = FastdevError> + Unpin,
{
    sink.send(frame).await
}
