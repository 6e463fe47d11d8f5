// bucket_core is the core streaming library of the bucket pipeline.
// Copyright (C) 2026  bucket-pipeline contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use std::fmt;

use thiserror::Error;

/// Flat classification of a bucket operation's outcome, surfaced at the API
/// boundary alongside (or instead of) an [`Error`]. This is the "Status
/// codes" enumeration from the bucket protocol: `ok` is folded into
/// [`ReadStatus::MoreAvailable`] / [`ReadStatus::EndOfStream`] rather than
/// being a distinct variant, since every successful read already carries one
/// of those two.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorStatus {
    /// The underlying source has no data right now; retry once it's ready.
    WouldBlock,
    /// A response body ended before its framing said it would.
    TruncatedResponse,
    /// A `read-line` accumulation exceeded the line buffer's capacity.
    LineTooLong,
    /// The status line or a header line did not conform to HTTP/1.1.
    ParseError,
    /// The TLS handshake failed before completing.
    SslSetupFailed,
    /// A TLS error occurred on an already-established connection.
    SslCommFailed,
    /// Certificate verification failed (see [`crate::config`] for hooking a
    /// verification callback that can override this classification).
    SslCertFailed,
    /// A renegotiation attempt was detected and rejected.
    SslNegotiateInProgress,
    /// The TLS engine needs to write before it can make progress reading.
    WaitForConnection,
    /// The operation is not implemented by this bucket variant.
    NotImplemented,
}

impl fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::WouldBlock => "would-block",
            Self::TruncatedResponse => "truncated-response",
            Self::LineTooLong => "line-too-long",
            Self::ParseError => "parse-error",
            Self::SslSetupFailed => "ssl-setup-failed",
            Self::SslCommFailed => "ssl-comm-failed",
            Self::SslCertFailed => "ssl-cert-failed",
            Self::SslNegotiateInProgress => "ssl-negotiate-in-progress",
            Self::WaitForConnection => "wait-for-connection",
            Self::NotImplemented => "not-implemented",
        };
        f.write_str(s)
    }
}

/// A `ReadStatus` accompanies every `read`/`peek`/`read-line`/`read-iovec`
/// call. Unlike [`Error`], it is `Copy` and cheap to thread through hot
/// paths; bucket implementations map their internal errors to it rather
/// than propagating a boxed error on every read.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReadStatus {
    /// Data was returned; another read may succeed immediately.
    MoreAvailable,
    /// No data available now; the caller should retry once the outer event
    /// loop reports the underlying source is readable again.
    WouldBlock,
    /// This read returned the final bytes of the stream (length may be zero
    /// or positive).
    EndOfStream,
    /// A terminal, classified failure. No further reads should be attempted
    /// except where this module documents a latch that repeats it.
    Error(ErrorStatus),
}

impl ReadStatus {
    /// Reports whether this status permits the caller to read again
    /// immediately without waiting on the outer event loop.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WouldBlock | Self::Error(ErrorStatus::WaitForConnection)
        )
    }

    /// Reports whether the stream has been fully consumed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Error(_))
    }
}

/// Error taxonomy for the `bucket_core` crate, layered the way
/// `hbak_common`'s error types are: leaf variants for conditions local to
/// this crate, `#[from]` wrapping for anything a lower layer already
/// classified.
#[derive(Debug, Error)]
pub enum Error {
    /// A response body ended before its framing (`Content-Length` or
    /// chunked) said it would.
    #[error("response body truncated before framing completed")]
    TruncatedResponse,
    /// A `read-line` accumulation exceeded the 8000-byte line buffer.
    #[error("line exceeded the maximum buffered length")]
    LineTooLong,
    /// The status line or a header line was malformed.
    #[error("malformed HTTP/1.1 response: {0}")]
    Parse(String),
    /// `Content-Length` did not fit in a `u64` (or wasn't decimal).
    #[error("invalid Content-Length value: {0}")]
    InvalidContentLength(String),
    /// A chunk size line did not parse as hexadecimal.
    #[error("invalid chunk size line: {0}")]
    InvalidChunkSize(String),
    /// Misuse of the bucket contract (reading a destroyed bucket, calling
    /// an unsupported operation). Debug builds may choose to `panic!`
    /// instead of returning this for misuse that signals a programmer
    /// error rather than a data error.
    #[error("operation not implemented by this bucket")]
    NotImplemented,
    /// Wraps a lower-level I/O failure (used by `Databuf` readers backed by
    /// real sockets in downstream crates).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classifies this error into the flat [`ErrorStatus`] surfaced at the
    /// API boundary (§6 of the specification).
    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::TruncatedResponse => ErrorStatus::TruncatedResponse,
            Self::LineTooLong => ErrorStatus::LineTooLong,
            Self::Parse(_) | Self::InvalidContentLength(_) | Self::InvalidChunkSize(_) => {
                ErrorStatus::ParseError
            }
            Self::NotImplemented => ErrorStatus::NotImplemented,
            Self::Io(e) if e.kind() == std::io::ErrorKind::WouldBlock => ErrorStatus::WouldBlock,
            Self::Io(_) => ErrorStatus::ParseError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_transient() {
        assert!(ReadStatus::WouldBlock.is_transient());
        assert!(!ReadStatus::EndOfStream.is_transient());
        assert!(!ReadStatus::MoreAvailable.is_transient());
    }

    #[test]
    fn end_of_stream_and_errors_are_terminal() {
        assert!(ReadStatus::EndOfStream.is_terminal());
        assert!(ReadStatus::Error(ErrorStatus::ParseError).is_terminal());
        assert!(!ReadStatus::MoreAvailable.is_terminal());
    }

    #[test]
    fn error_status_display_matches_wire_names() {
        assert_eq!(ErrorStatus::WouldBlock.to_string(), "would-block");
        assert_eq!(
            ErrorStatus::SslNegotiateInProgress.to_string(),
            "ssl-negotiate-in-progress"
        );
    }
}
