//! Transfer-encoding selection.
//!
//! The framing of a response is fixed when its first byte is committed and never changes
//! afterwards. Explicit framing headers set by the handler win; otherwise a response that
//! is committed by `close` with its whole body buffered gets `Content-Length`, and one
//! committed by overflow or an explicit flush is chunked.

use http::{HeaderMap, HeaderValue, header};
use tracing::debug;

use crate::protocol::{PayloadSize, ResponseError};

/// What caused the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTrigger {
    /// the response was closed with `total` bytes buffered
    Close { total: u64 },
    /// a write did not fit into the output buffer
    Overflow,
    /// the handler flushed explicitly
    Flush,
}

#[derive(Debug, Default)]
pub struct TransferEncodingSelector {
    decision: Option<PayloadSize>,
}

impl TransferEncodingSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decision(&self) -> Option<PayloadSize> {
        self.decision
    }

    /// Fixes the framing. Later calls return the first decision unchanged.
    pub fn select(&mut self, headers: &HeaderMap, trigger: CommitTrigger) -> Result<PayloadSize, ResponseError> {
        if let Some(decision) = self.decision {
            return Ok(decision);
        }

        let decision = match explicit_framing(headers)? {
            Some(explicit) => explicit,
            None => match trigger {
                CommitTrigger::Close { total } => PayloadSize::from_length(total),
                CommitTrigger::Overflow | CommitTrigger::Flush => PayloadSize::Chunked,
            },
        };

        debug!(?trigger, ?decision, "response framing selected");
        self.decision = Some(decision);
        Ok(decision)
    }
}

fn explicit_framing(headers: &HeaderMap) -> Result<Option<PayloadSize>, ResponseError> {
    let chunked = headers.get_all(header::TRANSFER_ENCODING).iter().any(|value| {
        value.to_str().is_ok_and(|value| value.rsplit(',').next().is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked")))
    });
    if chunked {
        return Ok(Some(PayloadSize::Chunked));
    }

    let Some(value) = headers.get(header::CONTENT_LENGTH) else {
        return Ok(None);
    };
    Ok(Some(PayloadSize::from_length(content_length(value)?)))
}

pub(crate) fn content_length(value: &HeaderValue) -> Result<u64, ResponseError> {
    value
        .to_str()
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .ok_or_else(|| ResponseError::invalid_header(format!("content-length {value:?} is not a number")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_framing_follows_trigger() {
        let headers = HeaderMap::new();

        assert_eq!(TransferEncodingSelector::new().select(&headers, CommitTrigger::Close { total: 5 }).unwrap(), PayloadSize::Length(5));
        assert_eq!(TransferEncodingSelector::new().select(&headers, CommitTrigger::Close { total: 0 }).unwrap(), PayloadSize::Empty);
        assert_eq!(TransferEncodingSelector::new().select(&headers, CommitTrigger::Overflow).unwrap(), PayloadSize::Chunked);
        assert_eq!(TransferEncodingSelector::new().select(&headers, CommitTrigger::Flush).unwrap(), PayloadSize::Chunked);
    }

    #[test]
    fn explicit_headers_win() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("12"));
        assert_eq!(TransferEncodingSelector::new().select(&headers, CommitTrigger::Overflow).unwrap(), PayloadSize::Length(12));

        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        assert_eq!(
            TransferEncodingSelector::new().select(&headers, CommitTrigger::Close { total: 3 }).unwrap(),
            PayloadSize::Chunked
        );
    }

    #[test]
    fn decided_once() {
        let mut selector = TransferEncodingSelector::new();
        assert_eq!(selector.select(&HeaderMap::new(), CommitTrigger::Flush).unwrap(), PayloadSize::Chunked);

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        assert_eq!(selector.select(&headers, CommitTrigger::Close { total: 3 }).unwrap(), PayloadSize::Chunked);
        assert_eq!(selector.decision(), Some(PayloadSize::Chunked));
    }

    #[test]
    fn malformed_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("twelve"));
        let result = TransferEncodingSelector::new().select(&headers, CommitTrigger::Flush);
        assert!(matches!(result, Err(ResponseError::InvalidHeader { .. })));
    }
}
