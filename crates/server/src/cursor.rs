// Pagination token codec.
//
// A token is the URL-safe base64 (no padding) encoding of `{context_id}:{offset}`.
// Decoding only accepts canonical tokens, i.e. exactly what `encode_page_token`
// would have produced for the decoded pair.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use thiserror::Error;

/// Longest search context id a token can carry, in bytes.
pub const MAX_CONTEXT_ID_LEN: usize = 12 * 1024;

// Context id, separator and the widest u64.
const MAX_RAW_TOKEN_LEN: usize = MAX_CONTEXT_ID_LEN + 1 + 20;

/// Encoded length of the largest token `encode_page_token` issues.
pub const MAX_PAGE_TOKEN_LEN: usize = (MAX_RAW_TOKEN_LEN * 4).div_ceil(3);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorEncodeError {
    #[error("search context id is empty")]
    EmptyContext,

    #[error("search context id exceeds max length: {len} bytes (max {max})")]
    ContextTooLong { len: usize, max: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CursorDecodeError {
    #[error("page token is empty")]
    Empty,

    #[error("page token exceeds max length: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("page token is not valid base64")]
    InvalidEncoding,

    #[error("page token is not valid utf-8")]
    InvalidUtf8,

    #[error("page token is missing the offset separator")]
    MissingSeparator,

    #[error("page token has an empty search context")]
    EmptyContext,

    #[error("page token search context exceeds max length: {len} bytes (max {max})")]
    ContextTooLong { len: usize, max: usize },

    #[error("page token offset is invalid")]
    InvalidOffset,

    #[error("page token is not in canonical form")]
    NonCanonical,
}

/// Position of the next page inside one search context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    pub context_id: String,
    pub offset: u64,
}

/// Tokens issued here always fit within `MAX_PAGE_TOKEN_LEN`.
pub fn encode_page_token(context_id: &str, offset: u64) -> Result<String, CursorEncodeError> {
    if context_id.is_empty() {
        return Err(CursorEncodeError::EmptyContext);
    }
    if context_id.len() > MAX_CONTEXT_ID_LEN {
        return Err(CursorEncodeError::ContextTooLong {
            len: context_id.len(),
            max: MAX_CONTEXT_ID_LEN,
        });
    }
    Ok(URL_SAFE_NO_PAD.encode(format!("{context_id}:{offset}")))
}

pub fn decode_page_token(token: &str) -> Result<PageCursor, CursorDecodeError> {
    if token.is_empty() {
        return Err(CursorDecodeError::Empty);
    }

    if token.len() > MAX_PAGE_TOKEN_LEN {
        return Err(CursorDecodeError::TooLong { len: token.len(), max: MAX_PAGE_TOKEN_LEN });
    }

    let raw = URL_SAFE_NO_PAD.decode(token).map_err(|_| CursorDecodeError::InvalidEncoding)?;
    let raw = String::from_utf8(raw).map_err(|_| CursorDecodeError::InvalidUtf8)?;

    let (context_id, offset) =
        raw.rsplit_once(':').ok_or(CursorDecodeError::MissingSeparator)?;
    if context_id.is_empty() {
        return Err(CursorDecodeError::EmptyContext);
    }

    if context_id.len() > MAX_CONTEXT_ID_LEN {
        return Err(CursorDecodeError::ContextTooLong {
            len: context_id.len(),
            max: MAX_CONTEXT_ID_LEN,
        });
    }

    let offset = offset.parse::<u64>().map_err(|_| CursorDecodeError::InvalidOffset)?;

    // Rejects "+5", "007" and friends.
    if encode_page_token(context_id, offset).ok().as_deref() != Some(token) {
        return Err(CursorDecodeError::NonCanonical);
    }

    Ok(PageCursor { context_id: context_id.to_string(), offset })
}
