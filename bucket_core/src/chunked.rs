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

use bytes::Bytes;

use crate::bucket::{Bucket, LineEnding, LineMask, View};
use crate::error::{Error, ErrorStatus, ReadStatus};
use crate::headers::HeaderTable;
use crate::linebuf::{LineAccumulator, LineOutcome};

#[derive(Debug)]
enum Phase {
    SizeLine,
    ChunkData { remaining: usize },
    TrailingCrlf,
    Trailers,
    Done,
    Errored(ErrorStatus),
}

/// Decodes the chunked transfer-coding (§5.4) off a raw byte source,
/// presenting the decoded body as a [`Bucket`] in its own right. Tracks
/// trailer headers separately; call [`ChunkedDecoder::into_trailers`] once
/// `read` has reported `end-of-stream` to retrieve them.
pub struct ChunkedDecoder<B> {
    source: B,
    phase: Phase,
    line: LineAccumulator,
    trailers: HeaderTable,
}

impl<B: Bucket> ChunkedDecoder<B> {
    pub fn new(source: B) -> Self {
        Self {
            source,
            phase: Phase::SizeLine,
            line: LineAccumulator::new(),
            trailers: HeaderTable::new(),
        }
    }

    /// Trailer headers observed after the terminal chunk. Empty until the
    /// decoder reaches `Done`.
    pub fn trailers(&self) -> &HeaderTable {
        &self.trailers
    }

    pub fn into_trailers(self) -> HeaderTable {
        self.trailers
    }

    /// Whether the decoder is past the terminal chunk and reading trailer
    /// headers, the response parser's `Phase::Trailers` sub-phase (§3).
    pub fn in_trailers(&self) -> bool {
        matches!(self.phase, Phase::Trailers)
    }

    /// Gives back the underlying source, for the "full-response-become-
    /// aggregate" administrative operation (§4.6). Only meaningful to call
    /// before any chunk data has been consumed.
    pub fn into_source(self) -> B {
        self.source
    }

    /// Borrows the underlying source, e.g. to resolve a scripted stall in
    /// tests.
    pub fn source_mut(&mut self) -> &mut B {
        &mut self.source
    }

    fn parse_size_line(line: &[u8]) -> Result<usize, Error> {
        let digits = line.split(|&b| b == b';').next().unwrap_or(line);
        let text = std::str::from_utf8(digits)
            .map_err(|_| Error::InvalidChunkSize(String::from_utf8_lossy(line).into_owned()))?
            .trim();
        usize::from_str_radix(text, 16)
            .map_err(|_| Error::InvalidChunkSize(String::from_utf8_lossy(line).into_owned()))
    }

    fn drive(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        loop {
            match &mut self.phase {
                Phase::SizeLine => match self.line.poll(&mut self.source, LineMask::CRLF) {
                    LineOutcome::Ready(bytes, _kind) => match Self::parse_size_line(&bytes) {
                        Ok(0) => self.phase = Phase::Trailers,
                        Ok(n) => self.phase = Phase::ChunkData { remaining: n },
                        Err(e) => self.phase = Phase::Errored(e.status()),
                    },
                    LineOutcome::Pending(status) => return (Bytes::new(), status),
                    LineOutcome::Ended => {
                        // The transport closed before the terminal `0`-size
                        // chunk was ever seen. The body is incomplete
                        // regardless of where the cut lands (§7).
                        self.phase = Phase::Errored(ErrorStatus::TruncatedResponse);
                    }
                    LineOutcome::Truncated => {
                        self.phase = Phase::Errored(ErrorStatus::TruncatedResponse);
                    }
                    LineOutcome::TooLong => {
                        self.phase = Phase::Errored(ErrorStatus::LineTooLong);
                    }
                },
                Phase::ChunkData { remaining } => {
                    if *remaining == 0 {
                        self.phase = Phase::TrailingCrlf;
                        continue;
                    }
                    let want = requested_max.map(|m| m.min(*remaining)).unwrap_or(*remaining);
                    let (view, status) = self.source.read(Some(want));
                    if view.is_empty() && status.is_terminal() {
                        self.phase = Phase::Errored(ErrorStatus::TruncatedResponse);
                        continue;
                    }
                    *remaining -= view.len();
                    if status.is_transient() && view.is_empty() {
                        return (view, status);
                    }
                    return (view, ReadStatus::MoreAvailable);
                }
                Phase::TrailingCrlf => match self.line.poll(&mut self.source, LineMask::CRLF) {
                    LineOutcome::Ready(bytes, _) if bytes.is_empty() => {
                        self.phase = Phase::SizeLine;
                    }
                    LineOutcome::Ready(_, _) => {
                        // Non-empty content where only the trailing CRLF was
                        // expected: malformed framing.
                        self.phase = Phase::Errored(ErrorStatus::ParseError);
                    }
                    LineOutcome::Pending(status) => return (Bytes::new(), status),
                    LineOutcome::Ended | LineOutcome::Truncated => {
                        self.phase = Phase::Errored(ErrorStatus::TruncatedResponse);
                    }
                    LineOutcome::TooLong => self.phase = Phase::Errored(ErrorStatus::LineTooLong),
                },
                Phase::Trailers => match self.line.poll(&mut self.source, LineMask::CRLF) {
                    LineOutcome::Ready(bytes, _) if bytes.is_empty() => {
                        self.phase = Phase::Done;
                    }
                    LineOutcome::Ready(bytes, _) => {
                        if let Some((name, value)) = split_header_line(&bytes) {
                            self.trailers.set(name, value);
                        }
                    }
                    LineOutcome::Pending(status) => return (Bytes::new(), status),
                    LineOutcome::Ended => self.phase = Phase::Done,
                    LineOutcome::Truncated => {
                        self.phase = Phase::Errored(ErrorStatus::TruncatedResponse);
                    }
                    LineOutcome::TooLong => self.phase = Phase::Errored(ErrorStatus::LineTooLong),
                },
                Phase::Done => return (Bytes::new(), ReadStatus::EndOfStream),
                Phase::Errored(status) => return (Bytes::new(), ReadStatus::Error(*status)),
            }
        }
    }
}

fn split_header_line(line: &[u8]) -> Option<(String, String)> {
    let pos = line.iter().position(|&b| b == b':')?;
    let name = std::str::from_utf8(&line[..pos]).ok()?.trim().to_string();
    let value = std::str::from_utf8(&line[pos + 1..]).ok()?.trim().to_string();
    Some((name, value))
}

impl<B: Bucket> Bucket for ChunkedDecoder<B> {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        self.drive(requested_max)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        // Chunk framing bytes interleave with body bytes, so there is no
        // single contiguous span to hand back without consuming it; fall
        // back to the same logic `read` uses and let the caller see it as
        // "whatever happens to already be decoded."
        match self.phase {
            Phase::ChunkData { .. } => self.source.peek(),
            _ => (Bytes::new(), ReadStatus::MoreAvailable),
        }
    }
}

impl<B> std::fmt::Debug for ChunkedDecoder<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedDecoder").field("phase", &self.phase).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockBucket};
    use crate::simple::SimpleBucket;

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
    fn decodes_single_chunk_with_terminator() {
        let source = SimpleBucket::new(Bytes::from_static(b"6\r\nblabla\r\n0\r\n\r\n"));
        let mut decoder = ChunkedDecoder::new(source);
        let (body, status) = drain(&mut decoder);
        assert_eq!(body, b"blabla");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn decodes_multiple_chunks_and_trailers() {
        let source = SimpleBucket::new(Bytes::from_static(
            b"3\r\nfoo\r\n3\r\nbar\r\n0\r\nX-Trailer: yes\r\n\r\n",
        ));
        let mut decoder = ChunkedDecoder::new(source);
        let (body, status) = drain(&mut decoder);
        assert_eq!(body, b"foobar");
        assert_eq!(status, ReadStatus::EndOfStream);
        assert_eq!(decoder.trailers().get("X-Trailer"), Some("yes"));
    }

    #[test]
    fn truncated_mid_chunk_is_reported() {
        let source = SimpleBucket::new(Bytes::from_static(b"6\r\nbla"));
        let mut decoder = ChunkedDecoder::new(source);
        let (_, status) = drain(&mut decoder);
        assert_eq!(status, ReadStatus::Error(ErrorStatus::TruncatedResponse));
    }

    #[test]
    fn truncated_after_lone_cr_of_trailing_crlf_is_reported() {
        let source = SimpleBucket::new(Bytes::from_static(b"6\r\nblabla\r"));
        let mut decoder = ChunkedDecoder::new(source);
        let (_, status) = drain(&mut decoder);
        assert_eq!(status, ReadStatus::Error(ErrorStatus::TruncatedResponse));
    }

    #[test]
    fn clean_close_mid_chunk_without_terminal_chunk_is_truncated() {
        let source = SimpleBucket::new(Bytes::from_static(b"3\r\nabc\r\n"));
        let mut decoder = ChunkedDecoder::new(source);
        let (body, status) = drain(&mut decoder);
        assert_eq!(body, b"abc");
        assert_eq!(status, ReadStatus::Error(ErrorStatus::TruncatedResponse));
    }

    #[test]
    fn consumed_without_livelock_across_would_block_boundary() {
        // Scenario 8 from SPEC_FULL.md / spec.md §8.
        let source = MockBucket::new(vec![
            MockAction::data(b"6\r".to_vec()),
            MockAction::would_block(),
            MockAction::last(b"\nblabla\r\n\r\n".to_vec()),
        ]);
        let mut decoder = ChunkedDecoder::new(source);

        let (view, status) = decoder.read(None);
        assert!(view.is_empty());
        assert_eq!(status, ReadStatus::WouldBlock);

        decoder.source.more_data_arrived();

        let (body, status) = drain(&mut decoder);
        assert_eq!(body, b"blabla");
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
