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

use bytes::{Bytes, BytesMut};

use crate::aggregate::AggregateBucket;
use crate::bucket::{Bucket, LineEnding, LineMask, View};
use crate::chunked::ChunkedDecoder;
use crate::error::{Error, ErrorStatus, ReadStatus};
use crate::headers::HeaderTable;
use crate::linebuf::{LineAccumulator, LineOutcome};
use crate::simple::SimpleBucket;

/// `{version: (major, minor), code, reason}` parsed from the status line
/// (§3). `reason` is copied into parser-owned memory, matching
/// `serf_bucket_response_status`'s `serf_bstrmemdup` of the reason phrase.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusLine {
    pub version: (u8, u8),
    pub code: u16,
    pub reason: String,
}

/// Where the response body ends, decided once the header block is complete
/// (§4.6), in priority order `chunked` > `content-length` > `close-delimited`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
    ContentLength(u64),
    Chunked,
    CloseDelimited,
}

/// The response parser's externally observable phase (§3). `Trailers` is
/// only distinguishable from `Body` when the framing is `chunked`; the other
/// framings never visit it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    StatusLine,
    Headers,
    Body,
    Trailers,
    Done,
}

enum ParseState<B> {
    StatusLine(B),
    Headers(B),
}

enum BodySource<B> {
    ContentLength { stream: B, remaining: u64 },
    Chunked(ChunkedDecoder<B>),
    CloseDelimited(B),
}

enum Inner<B> {
    Parsing(ParseState<B>),
    Body(BodySource<B>),
    Done,
}

/// Parses an HTTP/1.1 response (status line, headers, framed body) off an
/// underlying byte stream (§4.6). The phase machine advances monotonically;
/// once in `Body`, `read`/`peek` delegate to the framing-specific substream.
pub struct ResponseBucket<B> {
    inner: Inner<B>,
    line: LineAccumulator,
    status_line: Option<StatusLine>,
    headers: HeaderTable,
    framing: Option<Framing>,
    body_bytes_read: u64,
    /// Literal status-line + header-block bytes as they arrived on the
    /// wire, retained so [`ResponseBucket::into_replay_aggregate`] can hand
    /// them back verbatim (§4.6 "full-response-become-aggregate").
    raw_prefix: BytesMut,
}

impl<B: Bucket> ResponseBucket<B> {
    pub fn new(stream: B) -> Self {
        Self {
            inner: Inner::Parsing(ParseState::StatusLine(stream)),
            line: LineAccumulator::new(),
            status_line: None,
            headers: HeaderTable::new(),
            framing: None,
            body_bytes_read: 0,
            raw_prefix: BytesMut::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        match &self.inner {
            Inner::Parsing(ParseState::StatusLine(_)) => Phase::StatusLine,
            Inner::Parsing(ParseState::Headers(_)) => Phase::Headers,
            Inner::Body(BodySource::Chunked(decoder)) if decoder.in_trailers() => Phase::Trailers,
            Inner::Body(_) => Phase::Body,
            Inner::Done => Phase::Done,
        }
    }

    /// The parsed status line. Drives the machine as far as needed to
    /// produce it; `Err` is a transient status (retry later) or a terminal
    /// parse error.
    pub fn status_line(&mut self) -> Result<&StatusLine, ReadStatus> {
        self.advance_to_headers()?;
        Ok(self.status_line.as_ref().expect("advance_to_headers guarantees this"))
    }

    /// The fully-parsed response headers. Drives the machine through the
    /// header block if it hasn't finished already.
    pub fn wait_for_headers(&mut self) -> Result<&HeaderTable, ReadStatus> {
        self.advance_to_headers()?;
        Ok(&self.headers)
    }

    /// The framing decided once headers completed. `None` before that.
    pub fn framing(&self) -> Option<Framing> {
        self.framing
    }

    /// Trailer headers observed after a chunked body's terminal chunk.
    /// Empty (and possibly incomplete) until `read` reports `EndOfStream`.
    pub fn trailers(&self) -> Option<&HeaderTable> {
        match &self.inner {
            Inner::Body(BodySource::Chunked(decoder)) => Some(decoder.trailers()),
            _ => None,
        }
    }

    fn advance_to_headers(&mut self) -> Result<(), ReadStatus> {
        loop {
            match &mut self.inner {
                Inner::Parsing(ParseState::StatusLine(_)) => self.advance_status_line()?,
                Inner::Parsing(ParseState::Headers(_)) => {
                    if self.advance_headers()? {
                        return Ok(());
                    }
                }
                Inner::Body(_) | Inner::Done => return Ok(()),
            }
        }
    }

    fn take_stream(&mut self) -> B {
        match std::mem::replace(&mut self.inner, Inner::Done) {
            Inner::Parsing(ParseState::StatusLine(s)) | Inner::Parsing(ParseState::Headers(s)) => s,
            _ => unreachable!("take_stream only called while parsing"),
        }
    }

    fn push_raw_line(&mut self, bytes: &[u8], kind: LineEnding) {
        self.raw_prefix.extend_from_slice(bytes);
        self.raw_prefix.extend_from_slice(match kind {
            LineEnding::None => b"",
            LineEnding::Cr => b"\r",
            LineEnding::Lf => b"\n",
            LineEnding::Crlf => b"\r\n",
            LineEnding::CrlfSplit => b"",
        });
    }

    fn advance_status_line(&mut self) -> Result<(), ReadStatus> {
        let Inner::Parsing(ParseState::StatusLine(stream)) = &mut self.inner else {
            unreachable!()
        };
        match self.line.poll(stream, LineMask::ANY) {
            LineOutcome::Ready(bytes, kind) => {
                self.push_raw_line(&bytes, kind);
                let status_line = parse_status_line(&bytes)
                    .map_err(|e| ReadStatus::Error(e.status()))?;
                self.status_line = Some(status_line);
                let stream = self.take_stream();
                self.inner = Inner::Parsing(ParseState::Headers(stream));
                Ok(())
            }
            LineOutcome::Pending(status) => Err(status),
            LineOutcome::Ended | LineOutcome::Truncated => {
                Err(ReadStatus::Error(ErrorStatus::ParseError))
            }
            LineOutcome::TooLong => Err(ReadStatus::Error(ErrorStatus::LineTooLong)),
        }
    }

    /// Advances one header line. Returns `Ok(true)` once the header block is
    /// complete (framing decided, transitioned to `Body`).
    fn advance_headers(&mut self) -> Result<bool, ReadStatus> {
        let Inner::Parsing(ParseState::Headers(stream)) = &mut self.inner else {
            unreachable!()
        };
        match self.line.poll(stream, LineMask::ANY) {
            LineOutcome::Ready(bytes, kind) => {
                self.push_raw_line(&bytes, kind);
                if bytes.is_empty() {
                    self.finish_headers()?;
                    Ok(true)
                } else {
                    let (name, value) = split_header_line(&bytes)
                        .map_err(|e| ReadStatus::Error(e.status()))?;
                    self.headers.set(name, value);
                    Ok(false)
                }
            }
            LineOutcome::Pending(status) => Err(status),
            LineOutcome::Ended | LineOutcome::Truncated => {
                Err(ReadStatus::Error(ErrorStatus::ParseError))
            }
            LineOutcome::TooLong => Err(ReadStatus::Error(ErrorStatus::LineTooLong)),
        }
    }

    fn finish_headers(&mut self) -> Result<(), ReadStatus> {
        let is_chunked = self
            .headers
            .get("Transfer-Encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        let framing = if is_chunked {
            Framing::Chunked
        } else if let Some(cl) = self.headers.get("Content-Length") {
            let n: u64 = cl
                .trim()
                .parse()
                .map_err(|_| ReadStatus::Error(ErrorStatus::ParseError))?;
            Framing::ContentLength(n)
        } else {
            Framing::CloseDelimited
        };
        self.framing = Some(framing);

        let stream = self.take_stream();
        let body = match framing {
            Framing::ContentLength(n) => BodySource::ContentLength { stream, remaining: n },
            Framing::Chunked => BodySource::Chunked(ChunkedDecoder::new(stream)),
            Framing::CloseDelimited => BodySource::CloseDelimited(stream),
        };
        self.inner = Inner::Body(body);
        Ok(())
    }

    fn read_body(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        match &mut self.inner {
            Inner::Body(BodySource::ContentLength { stream, remaining }) => {
                if *remaining == 0 {
                    self.inner = Inner::Done;
                    return (Bytes::new(), ReadStatus::EndOfStream);
                }
                let want = requested_max.map(|m| m.min(*remaining as usize)).unwrap_or(*remaining as usize);
                let (view, status) = stream.read(Some(want));
                self.body_bytes_read += view.len() as u64;
                if view.is_empty() && status.is_terminal() {
                    self.inner = Inner::Done;
                    let final_status = if matches!(status, ReadStatus::Error(_)) {
                        status
                    } else {
                        ReadStatus::Error(ErrorStatus::TruncatedResponse)
                    };
                    return (view, final_status);
                }
                let Inner::Body(BodySource::ContentLength { remaining, .. }) = &mut self.inner else {
                    unreachable!()
                };
                *remaining -= view.len() as u64;
                if *remaining == 0 {
                    self.inner = Inner::Done;
                    (view, ReadStatus::EndOfStream)
                } else if status.is_transient() && view.is_empty() {
                    (view, status)
                } else {
                    (view, ReadStatus::MoreAvailable)
                }
            }
            Inner::Body(BodySource::Chunked(decoder)) => {
                let (view, status) = decoder.read(requested_max);
                self.body_bytes_read += view.len() as u64;
                if status.is_terminal() {
                    self.inner = Inner::Done;
                }
                (view, status)
            }
            Inner::Body(BodySource::CloseDelimited(stream)) => {
                let (view, status) = stream.read(requested_max);
                self.body_bytes_read += view.len() as u64;
                match status {
                    ReadStatus::EndOfStream => {
                        self.inner = Inner::Done;
                        (view, ReadStatus::EndOfStream)
                    }
                    ReadStatus::Error(_) => {
                        self.inner = Inner::Done;
                        (view, status)
                    }
                    other => (view, other),
                }
            }
            Inner::Parsing(_) | Inner::Done => (Bytes::new(), ReadStatus::EndOfStream),
        }
    }

    /// Implements the "full-response-become-aggregate" administrative
    /// operation (§4.6): replaces the public read contract with an
    /// `AggregateBucket` emitting the literal status-line + header-block
    /// bytes this parser buffered, followed by whatever of the underlying
    /// stream remains unread. Only valid immediately after headers finish
    /// parsing and before any body byte has been consumed; otherwise the
    /// original `self` is handed back unchanged.
    pub fn into_replay_aggregate(mut self) -> Result<AggregateBucket, Self>
    where
        B: 'static,
    {
        if self.body_bytes_read != 0 {
            return Err(self);
        }
        let Inner::Body(body) = std::mem::replace(&mut self.inner, Inner::Done) else {
            return Err(self);
        };
        let remaining_stream: B = match body {
            BodySource::ContentLength { stream, .. } => stream,
            BodySource::Chunked(decoder) => decoder.into_source(),
            BodySource::CloseDelimited(stream) => stream,
        };
        let mut aggregate = AggregateBucket::new();
        aggregate.append(SimpleBucket::new(self.raw_prefix.freeze()));
        aggregate.append(remaining_stream);
        Ok(aggregate)
    }
}

impl<B: Bucket> Bucket for ResponseBucket<B> {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        if let Err(status) = self.advance_to_headers() {
            return (Bytes::new(), status);
        }
        self.read_body(requested_max)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        if let Err(status) = self.advance_to_headers() {
            return (Bytes::new(), status);
        }
        match &mut self.inner {
            Inner::Body(BodySource::ContentLength { stream, .. }) => stream.peek(),
            Inner::Body(BodySource::Chunked(decoder)) => decoder.peek(),
            Inner::Body(BodySource::CloseDelimited(stream)) => stream.peek(),
            Inner::Parsing(_) | Inner::Done => (Bytes::new(), ReadStatus::EndOfStream),
        }
    }
}

impl<B> std::fmt::Debug for ResponseBucket<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseBucket")
            .field("status_line", &self.status_line)
            .field("framing", &self.framing)
            .finish()
    }
}

fn parse_status_line(line: &[u8]) -> Result<StatusLine, Error> {
    let malformed = || Error::Parse(String::from_utf8_lossy(line).into_owned());

    if line.len() < 12 || &line[0..5] != b"HTTP/" {
        return Err(malformed());
    }
    let major = line[5];
    let minor = line[7];
    if !major.is_ascii_digit() || line[6] != b'.' || !minor.is_ascii_digit() || line[8] != b' ' {
        return Err(malformed());
    }
    let code_bytes = &line[9..12];
    if !code_bytes.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }
    let code: u16 = std::str::from_utf8(code_bytes).unwrap().parse().map_err(|_| malformed())?;

    let mut idx = 12;
    while idx < line.len() && line[idx] == b' ' {
        idx += 1;
    }
    let reason = String::from_utf8_lossy(&line[idx..]).into_owned();

    Ok(StatusLine {
        version: (major - b'0', minor - b'0'),
        code,
        reason,
    })
}

fn split_header_line(line: &[u8]) -> Result<(String, String), Error> {
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| Error::Parse(String::from_utf8_lossy(line).into_owned()))?;
    let name = String::from_utf8_lossy(&line[..colon]).into_owned();
    let mut rest = &line[colon + 1..];
    while rest.first() == Some(&b' ') || rest.first() == Some(&b'\t') {
        rest = &rest[1..];
    }
    let value = String::from_utf8_lossy(rest).into_owned();
    Ok((name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockBucket};

    fn drain<B: Bucket>(bucket: &mut B) -> (Vec<u8>, ReadStatus) {
        let mut out = Vec::new();
        loop {
            let (view, status) = bucket.read(None);
            out.extend_from_slice(&view);
            if !matches!(status, ReadStatus::MoreAvailable) {
                return (out, status);
            }
        }
    }

    #[test]
    fn content_length_body_scenario_three() {
        // Scenario 3 from spec.md §8.
        let source = SimpleBucket::new(Bytes::from_static(
            b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nabc1234",
        ));
        let mut resp = ResponseBucket::new(source);

        let status_line = resp.status_line().unwrap().clone();
        assert_eq!(status_line.version, (1, 1));
        assert_eq!(status_line.code, 200);
        assert_eq!(status_line.reason, "OK");

        let (body, status) = drain(&mut resp);
        assert_eq!(body, b"abc1234");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn chunked_body_with_trailer_scenario_four() {
        // Scenario 4 from spec.md §8.
        let source = SimpleBucket::new(Bytes::from_static(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n4\r\n1234\r\n0\r\nFooter: value\r\n\r\n",
        ));
        let mut resp = ResponseBucket::new(source);
        assert_eq!(resp.wait_for_headers().unwrap().get("Transfer-Encoding"), Some("chunked"));
        assert_eq!(resp.framing(), Some(Framing::Chunked));

        let (body, status) = drain(&mut resp);
        assert_eq!(body, b"abc1234");
        assert_eq!(status, ReadStatus::EndOfStream);
        assert_eq!(resp.trailers().unwrap().get("Footer"), Some("value"));
    }

    #[test]
    fn content_length_short_body_is_truncated_scenario_five() {
        // Scenario 5 from spec.md §8.
        let mut body = b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n".to_vec();
        body.extend(std::iter::repeat(b'x').take(60));
        let source = SimpleBucket::new(Bytes::from(body));
        let mut resp = ResponseBucket::new(source);

        let (_, status) = drain(&mut resp);
        assert_eq!(status, ReadStatus::Error(ErrorStatus::TruncatedResponse));
    }

    #[test]
    fn chunked_body_missing_trailing_crlf_is_truncated_scenario_six() {
        // Scenario 6 from spec.md §8.
        let source = SimpleBucket::new(Bytes::from_static(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n2\r\nAB\r",
        ));
        let mut resp = ResponseBucket::new(source);

        let (_, status) = drain(&mut resp);
        assert_eq!(status, ReadStatus::Error(ErrorStatus::TruncatedResponse));
    }

    #[test]
    fn close_delimited_body_ends_cleanly_without_content_length() {
        let source = SimpleBucket::new(Bytes::from_static(b"HTTP/1.0 200 OK\r\n\r\nhello"));
        let mut resp = ResponseBucket::new(source);
        assert_eq!(resp.wait_for_headers().unwrap().len(), 0);
        assert_eq!(resp.framing(), Some(Framing::CloseDelimited));

        let (body, status) = drain(&mut resp);
        assert_eq!(body, b"hello");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn non_conforming_status_line_is_a_parse_error() {
        let source = SimpleBucket::new(Bytes::from_static(b"NOT AN HTTP LINE\r\n\r\n"));
        let mut resp = ResponseBucket::new(source);
        match resp.status_line() {
            Err(ReadStatus::Error(ErrorStatus::ParseError)) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn mock_stream_consumed_without_livelock_scenario_eight() {
        // Scenario 8 from spec.md §8: the stall lands mid chunk-size-line,
        // at exactly the CRLF-split boundary.
        let source = MockBucket::new(vec![
            MockAction::data(b"HTTP/1.1 200 OK\r\n".to_vec()),
            MockAction::data(b"Content-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec()),
            MockAction::data(b"6\r".to_vec()),
            MockAction::would_block(),
            MockAction::last(b"\nblabla\r\n\r\n".to_vec()),
        ]);
        let mut resp = ResponseBucket::new(source);

        // Drive until the stall, then resolve it and drain the body.
        loop {
            let (view, status) = resp.read(None);
            if status == ReadStatus::WouldBlock {
                assert!(view.is_empty());
                break;
            }
        }

        let Inner::Body(BodySource::Chunked(decoder)) = &mut resp.inner else {
            panic!("expected chunked body phase")
        };
        decoder.source_mut().more_data_arrived();

        let (body, status) = drain(&mut resp);
        assert_eq!(body, b"blabla");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn into_replay_aggregate_emits_literal_bytes() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi".to_vec();
        let source = SimpleBucket::new(Bytes::from(raw.clone()));
        let mut resp = ResponseBucket::new(source);
        resp.wait_for_headers().unwrap();

        let mut aggregate = resp.into_replay_aggregate().expect("no body bytes consumed yet");
        let (body, status) = drain(&mut aggregate);
        assert_eq!(body, raw);
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
