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

use std::collections::VecDeque;

use bytes::Bytes;

use crate::bucket::{Bucket, View};
use crate::error::ReadStatus;

/// A bucket over a fixed sequence of discontiguous byte spans (§4.3),
/// letting a writer hand over several buffers (headers, a body, a footer)
/// without first concatenating them. `read_iovec` is overridden to surface
/// the underlying spans directly rather than flattening through the
/// single-`read` default.
#[derive(Clone, Debug, Default)]
pub struct IovecBucket {
    spans: VecDeque<Bytes>,
}

impl IovecBucket {
    pub fn new(spans: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            spans: spans.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }

    fn status(&self) -> ReadStatus {
        if self.spans.is_empty() {
            ReadStatus::EndOfStream
        } else {
            ReadStatus::MoreAvailable
        }
    }
}

impl Bucket for IovecBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        let Some(front) = self.spans.front_mut() else {
            return (Bytes::new(), ReadStatus::EndOfStream);
        };

        let take = requested_max.unwrap_or(front.len()).min(front.len());
        let chunk = front.split_to(take);
        if front.is_empty() {
            self.spans.pop_front();
        }
        (chunk, self.status())
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        match self.spans.front() {
            Some(front) => (front.clone(), self.status()),
            None => (Bytes::new(), ReadStatus::EndOfStream),
        }
    }

    fn read_iovec(&mut self, requested_max: Option<usize>, max_vectors: usize) -> (Vec<View>, ReadStatus) {
        let mut out = Vec::new();
        let mut budget = requested_max;

        while out.len() < max_vectors {
            let Some(front) = self.spans.front_mut() else {
                break;
            };
            let take = match budget {
                Some(b) if b < front.len() => b,
                _ => front.len(),
            };
            if take == 0 {
                break;
            }
            let chunk = front.split_to(take);
            if front.is_empty() {
                self.spans.pop_front();
            }
            if let Some(b) = budget.as_mut() {
                *b -= take;
            }
            out.push(chunk);
            if matches!(budget, Some(0)) {
                break;
            }
        }

        (out, self.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_iovec_yields_one_vector_per_span() {
        let mut bucket = IovecBucket::new(vec![
            Bytes::from_static(b"head"),
            Bytes::from_static(b"er"),
            Bytes::from_static(b"body"),
        ]);

        let (vecs, status) = bucket.read_iovec(None, 4);
        assert_eq!(vecs.len(), 3);
        assert_eq!(&vecs[0][..], b"head");
        assert_eq!(&vecs[1][..], b"er");
        assert_eq!(&vecs[2][..], b"body");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn read_iovec_respects_max_vectors() {
        let mut bucket = IovecBucket::new(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);

        let (vecs, status) = bucket.read_iovec(None, 1);
        assert_eq!(vecs.len(), 1);
        assert_eq!(&vecs[0][..], b"a");
        assert_eq!(status, ReadStatus::MoreAvailable);
    }

    #[test]
    fn plain_read_flattens_across_spans() {
        let mut bucket = IovecBucket::new(vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]);

        let (chunk, status) = bucket.read(Some(1));
        assert_eq!(&chunk[..], b"a");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (chunk, status) = bucket.read(None);
        assert_eq!(&chunk[..], b"b");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn empty_spans_are_skipped_on_construction() {
        let bucket = IovecBucket::new(vec![Bytes::new(), Bytes::from_static(b"x")]);
        assert_eq!(bucket.spans.len(), 1);
    }
}
