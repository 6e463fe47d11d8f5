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

use crate::bucket::{Bucket, LineEnding, LineMask};
use crate::error::ReadStatus;

/// Maximum size of a buffered status line, header line, or chunk size line
/// (§5.2, §5.4) before the parser gives up with `line-too-long`.
pub const MAX_LINE_LEN: usize = 8000;

/// Accumulates a single line across repeated `read_line` calls, since the
/// default `Bucket::read_line` implementation does not retain state between
/// calls on its own (§4.1). Also resolves the crlf-split boundary case: it
/// peeks one further byte on the next call to decide whether the lone `\r`
/// it already consumed paired with a `\n` or not (§5.2).
pub struct LineAccumulator {
    buf: BytesMut,
    cap: usize,
    split_pending: bool,
}

/// The outcome of one [`LineAccumulator::poll`] call.
pub enum LineOutcome {
    /// A complete line, with the terminator it was found with.
    Ready(Bytes, LineEnding),
    /// Not resolved yet; the caller should return `status` upward and poll
    /// again once the outer event loop says more data is available.
    Pending(ReadStatus),
    /// The stream ended cleanly with nothing buffered for this line.
    Ended,
    /// The stream ended mid-line.
    Truncated,
    /// The accumulated line exceeded the configured cap.
    TooLong,
}

impl LineAccumulator {
    pub fn new() -> Self {
        Self::with_cap(MAX_LINE_LEN)
    }

    pub fn with_cap(cap: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            cap,
            split_pending: false,
        }
    }

    pub fn poll(&mut self, bucket: &mut dyn Bucket, mask: LineMask) -> LineOutcome {
        if self.split_pending {
            return self.poll_split(bucket);
        }

        let (chunk, kind, status) = bucket.read_line(mask);
        if !chunk.is_empty() {
            self.buf.extend_from_slice(&chunk);
        }
        if self.buf.len() > self.cap {
            return LineOutcome::TooLong;
        }

        match kind {
            LineEnding::None => {
                if status.is_terminal() {
                    if self.buf.is_empty() {
                        LineOutcome::Ended
                    } else {
                        LineOutcome::Truncated
                    }
                } else {
                    LineOutcome::Pending(status)
                }
            }
            LineEnding::CrlfSplit => {
                self.split_pending = true;
                LineOutcome::Pending(status)
            }
            found => self.finish(found),
        }
    }

    fn poll_split(&mut self, bucket: &mut dyn Bucket) -> LineOutcome {
        let (view, status) = bucket.peek();
        if view.is_empty() {
            if status.is_terminal() {
                self.split_pending = false;
                return self.finish(LineEnding::Cr);
            }
            return LineOutcome::Pending(status);
        }
        self.split_pending = false;
        if view[0] == b'\n' {
            let _ = bucket.read(Some(1));
            self.finish(LineEnding::Crlf)
        } else {
            self.finish(LineEnding::Cr)
        }
    }

    fn finish(&mut self, kind: LineEnding) -> LineOutcome {
        let line = self.buf.split().freeze();
        LineOutcome::Ready(line, kind)
    }
}

impl Default for LineAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockBucket};

    #[test]
    fn resolves_crlf_split_across_a_would_block_boundary() {
        // Scenario 8 from SPEC_FULL.md / spec.md §8.
        let mut bucket = MockBucket::new(vec![
            MockAction::data(b"6\r".to_vec()),
            MockAction::would_block(),
            MockAction::last(b"\nblabla\r\n\r\n".to_vec()),
        ]);
        let mut line = LineAccumulator::new();

        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::Pending(ReadStatus::MoreAvailable) => {}
            _ => panic!("expected pending after the lone \\r"),
        }

        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::Pending(ReadStatus::WouldBlock) => {}
            _ => panic!("expected would-block while stalled"),
        }

        bucket.more_data_arrived();

        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::Ready(bytes, LineEnding::Crlf) => assert_eq!(&bytes[..], b"6"),
            _ => panic!("expected the size line to resolve to \"6\""),
        }
    }

    #[test]
    fn reports_too_long_once_cap_exceeded() {
        let mut bucket = MockBucket::new(vec![MockAction::last(vec![b'a'; 20])]);
        let mut line = LineAccumulator::with_cap(8);
        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::TooLong => {}
            _ => panic!("expected too-long"),
        }
    }

    #[test]
    fn truncated_mid_line_is_reported() {
        let mut bucket = MockBucket::new(vec![MockAction::last(b"partial".to_vec())]);
        let mut line = LineAccumulator::new();
        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::Truncated => {}
            _ => panic!("expected truncated"),
        }
    }

    #[test]
    fn clean_end_with_nothing_buffered_is_ended() {
        let mut bucket = MockBucket::new(vec![MockAction::last(Bytes::new())]);
        let mut line = LineAccumulator::new();
        match line.poll(&mut bucket, LineMask::CRLF) {
            LineOutcome::Ended => {}
            _ => panic!("expected ended"),
        }
    }
}
