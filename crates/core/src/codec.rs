// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenSSH agent wire framing (spec §4.1).
//!
//! A frame is a 4-byte big-endian length *L*, followed by *L* bytes whose
//! first byte is the message type and whose remaining `L-1` bytes are the
//! payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AgentError;
use crate::identity::Identity;

/// Maximum allowed frame size (spec §4.1, §6): 256 KiB.
pub const MAX_FRAME_SIZE: u32 = 256 * 1024;

/// Maximum identities accepted in a single identities-answer (spec §4.1, §6).
pub const MAX_IDENTITIES: u32 = 1000;

// OpenSSH agent protocol message type numbers.
pub const SSH_AGENT_FAILURE: u8 = 5;
pub const SSH_AGENT_SUCCESS: u8 = 6;
pub const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
pub const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
pub const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
pub const SSH_AGENT_SIGN_RESPONSE: u8 = 14;

/// A decoded frame: message type plus payload (payload excludes the type
/// byte itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(msg_type: u8, payload: Vec<u8>) -> Self {
        Self { msg_type, payload }
    }

    pub fn empty(msg_type: u8) -> Self {
        Self { msg_type, payload: Vec::new() }
    }

    pub fn success() -> Self {
        Self::empty(SSH_AGENT_SUCCESS)
    }

    pub fn failure() -> Self {
        Self::empty(SSH_AGENT_FAILURE)
    }
}

/// Read one frame from `stream`. Returns `Ok(None)` on a clean EOF before any
/// bytes of the length prefix were read. Any other malformed input — a short
/// read mid-prefix, a declared length of 0 or above [`MAX_FRAME_SIZE`], or an
/// EOF mid-payload — fails with [`AgentError::MalformedFrame`].
pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> Result<Option<Frame>, AgentError> {
    let mut len_buf = [0u8; 4];
    let mut read_so_far = 0usize;
    while read_so_far < 4 {
        let n = stream.read(&mut len_buf[read_so_far..]).await.map_err(|_| AgentError::MalformedFrame)?;
        if n == 0 {
            if read_so_far == 0 {
                return Ok(None);
            }
            return Err(AgentError::MalformedFrame);
        }
        read_so_far += n;
    }

    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_SIZE {
        return Err(AgentError::MalformedFrame);
    }

    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await.map_err(|_| AgentError::MalformedFrame)?;

    let msg_type = body[0];
    let payload = body[1..].to_vec();
    Ok(Some(Frame::new(msg_type, payload)))
}

/// Write one frame to `stream` and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    stream: &mut W,
    msg_type: u8,
    payload: &[u8],
) -> std::io::Result<()> {
    let len = (payload.len() + 1) as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(&[msg_type]).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

pub async fn write_response<W: AsyncWrite + Unpin>(stream: &mut W, frame: &Frame) -> std::io::Result<()> {
    write_frame(stream, frame.msg_type, &frame.payload).await
}

fn take_length_prefixed(buf: &[u8], pos: &mut usize) -> Result<Vec<u8>, AgentError> {
    if *pos + 4 > buf.len() {
        return Err(AgentError::MalformedFrame);
    }
    let mut len_buf = [0u8; 4];
    len_buf.copy_from_slice(&buf[*pos..*pos + 4]);
    let len = u32::from_be_bytes(len_buf) as usize;
    *pos += 4;
    if *pos + len > buf.len() {
        return Err(AgentError::MalformedFrame);
    }
    let value = buf[*pos..*pos + len].to_vec();
    *pos += len;
    Ok(value)
}

fn push_length_prefixed(out: &mut Vec<u8>, value: &[u8]) {
    out.extend_from_slice(&(value.len() as u32).to_be_bytes());
    out.extend_from_slice(value);
}

/// Parse a sign-request payload: length-prefixed `key_blob`, length-prefixed
/// `data`, and a trailing 4-byte flags word. If the payload ends exactly
/// after `data` the flags word is considered absent and defaults to 0
/// (spec §4.1, §8).
pub fn parse_sign_request(payload: &[u8]) -> Result<(Vec<u8>, Vec<u8>, u32), AgentError> {
    let mut pos = 0usize;
    let key_blob = take_length_prefixed(payload, &mut pos)?;
    let data = take_length_prefixed(payload, &mut pos)?;

    let flags = if pos == payload.len() {
        0
    } else if pos + 4 == payload.len() {
        let mut flags_buf = [0u8; 4];
        flags_buf.copy_from_slice(&payload[pos..pos + 4]);
        u32::from_be_bytes(flags_buf)
    } else {
        return Err(AgentError::MalformedFrame);
    };

    Ok((key_blob, data, flags))
}

/// Encode a sign-request payload (test/client-side helper — the proxy never
/// originates these itself; it forwards the client's raw payload).
pub fn encode_sign_request(key_blob: &[u8], data: &[u8], flags: u32) -> Vec<u8> {
    let mut out = Vec::new();
    push_length_prefixed(&mut out, key_blob);
    push_length_prefixed(&mut out, data);
    out.extend_from_slice(&flags.to_be_bytes());
    out
}

/// Parse an identities-answer payload: 4-byte count *N* followed by *N*
/// pairs of length-prefixed `(key_blob, comment)`. *N* over
/// [`MAX_IDENTITIES`] is malformed.
pub fn parse_identities_answer(payload: &[u8]) -> Result<Vec<Identity>, AgentError> {
    if payload.len() < 4 {
        return Err(AgentError::MalformedFrame);
    }
    let mut pos = 0usize;
    let mut count_buf = [0u8; 4];
    count_buf.copy_from_slice(&payload[0..4]);
    let count = u32::from_be_bytes(count_buf);
    pos += 4;

    if count > MAX_IDENTITIES {
        return Err(AgentError::MalformedFrame);
    }

    let mut identities = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key_blob = take_length_prefixed(payload, &mut pos)?;
        let comment_bytes = take_length_prefixed(payload, &mut pos)?;
        let comment = String::from_utf8(comment_bytes).map_err(|_| AgentError::MalformedFrame)?;
        identities.push(Identity::new(key_blob, comment));
    }
    Ok(identities)
}

/// Encode a list of identities into an identities-answer payload.
pub fn encode_identities_answer(identities: &[Identity]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(identities.len() as u32).to_be_bytes());
    for id in identities {
        push_length_prefixed(&mut out, &id.key_blob);
        push_length_prefixed(&mut out, id.comment.as_bytes());
    }
    out
}

/// Encode a sign-response payload: a single length-prefixed signature blob.
pub fn encode_sign_response(signature: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_length_prefixed(&mut out, signature);
    out
}

/// Parse a sign-response payload back into the raw signature blob.
pub fn parse_sign_response(payload: &[u8]) -> Result<Vec<u8>, AgentError> {
    let mut pos = 0usize;
    take_length_prefixed(payload, &mut pos)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
