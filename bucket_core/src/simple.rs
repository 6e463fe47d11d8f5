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

use crate::bucket::{Bucket, View};
use crate::error::ReadStatus;

/// A bucket wrapping an already-fully-buffered, immutable byte span (§4.2).
///
/// `requested_max` is honored exactly: a caller asking for fewer bytes than
/// remain gets only that prefix, and `end-of-stream` is reported once the
/// span is exhausted, not before. This refines the wire description of
/// "the first read returns the entire remaining span" to the common case of
/// a caller requesting "all available" — partial consumption is what makes
/// `read_line`'s default implementation (built on `peek` + `read`) correct
/// when composed on top of a `Simple` bucket, and is exercised directly by
/// the read-line scenarios.
#[derive(Clone, Debug)]
pub struct SimpleBucket {
    remaining: Bytes,
}

impl SimpleBucket {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            remaining: bytes.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn len(&self) -> usize {
        self.remaining.len()
    }
}

impl Bucket for SimpleBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        let take = requested_max
            .unwrap_or(self.remaining.len())
            .min(self.remaining.len());
        let chunk = self.remaining.split_to(take);
        let status = if self.remaining.is_empty() {
            ReadStatus::EndOfStream
        } else {
            ReadStatus::MoreAvailable
        };
        (chunk, status)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        let status = if self.remaining.is_empty() {
            ReadStatus::EndOfStream
        } else {
            ReadStatus::MoreAvailable
        };
        (self.remaining.clone(), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::LineMask;

    #[test]
    fn first_read_with_no_cap_drains_everything() {
        let mut bucket = SimpleBucket::new(Bytes::from_static(b"hello"));
        let (view, status) = bucket.read(None);
        assert_eq!(&view[..], b"hello");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn partial_reads_honor_requested_max() {
        let mut bucket = SimpleBucket::new(Bytes::from_static(b"hello"));
        let (view, status) = bucket.read(Some(2));
        assert_eq!(&view[..], b"he");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (view, status) = bucket.read(None);
        assert_eq!(&view[..], b"llo");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn read_line_consumes_only_up_to_terminator() {
        let mut bucket = SimpleBucket::new(Bytes::from_static(b"line1\r\nline2"));

        let (line, kind, status) = bucket.read_line(LineMask::CRLF);
        assert_eq!(&line[..], b"line1\r\n");
        assert_eq!(kind, crate::bucket::LineEnding::Crlf);
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (line, kind, status) = bucket.read_line(LineMask::CRLF);
        assert_eq!(&line[..], b"line2");
        assert_eq!(kind, crate::bucket::LineEnding::None);
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn empty_span_is_immediately_end_of_stream() {
        let mut bucket = SimpleBucket::new(Bytes::new());
        let (view, status) = bucket.read(None);
        assert!(view.is_empty());
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
