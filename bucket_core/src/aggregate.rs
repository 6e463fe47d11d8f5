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
use std::sync::Arc;

use bytes::Bytes;

use crate::bucket::{Bucket, View};
use crate::config::BucketConfig;
use crate::error::ReadStatus;

/// A composite bucket concatenating a sequence of child buckets (§4.6) into
/// one logical stream: reading drains the front child to exhaustion before
/// moving to the next, and `end-of-stream` is only reported once every
/// child has been drained. Children are read in the order they appear
/// regardless of which end of the queue they were added from, which is what
/// makes `prepend` useful for pushing back bytes a higher layer peeked at
/// but decided not to consume yet.
#[derive(Default)]
pub struct AggregateBucket {
    children: VecDeque<Box<dyn Bucket>>,
}

impl AggregateBucket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_children(children: impl IntoIterator<Item = Box<dyn Bucket>>) -> Self {
        Self {
            children: children.into_iter().collect(),
        }
    }

    /// Adds a bucket to the end of the stream.
    pub fn append(&mut self, bucket: impl Bucket + 'static) {
        self.children.push_back(Box::new(bucket));
    }

    /// Adds a bucket to the front of the stream, to be read before anything
    /// already queued. Used to put back bytes read-ahead but not consumed
    /// (the size-line parser peeking past a chunk boundary, for instance).
    pub fn prepend(&mut self, bucket: impl Bucket + 'static) {
        self.children.push_front(Box::new(bucket));
    }

    /// Like [`Self::append`], for a child that is already boxed (a
    /// heterogeneous child coming from a caller that only has a
    /// `Box<dyn Bucket>` to hand over, such as `bucket_tls`'s multiplexed
    /// encrypt sources).
    pub fn append_boxed(&mut self, bucket: Box<dyn Bucket>) {
        self.children.push_back(bucket);
    }

    /// Like [`Self::prepend`], for an already-boxed child.
    pub fn prepend_boxed(&mut self, bucket: Box<dyn Bucket>) {
        self.children.push_front(bucket);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Drops children that have nothing left to read, so `is_empty`
    /// reflects true exhaustion rather than a queue of emptied buckets.
    fn drop_exhausted_front(&mut self, status: ReadStatus) {
        if status.is_terminal() && status != ReadStatus::Error(crate::error::ErrorStatus::WouldBlock) {
            self.children.pop_front();
        }
    }

    fn overall_status(&self, child_status: ReadStatus) -> ReadStatus {
        if self.children.is_empty() && child_status == ReadStatus::EndOfStream {
            ReadStatus::EndOfStream
        } else if matches!(child_status, ReadStatus::Error(_)) {
            child_status
        } else if self.children.is_empty() {
            ReadStatus::EndOfStream
        } else {
            ReadStatus::MoreAvailable
        }
    }
}

impl std::fmt::Debug for AggregateBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregateBucket")
            .field("children", &self.children.len())
            .finish()
    }
}

impl Bucket for AggregateBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        loop {
            let Some(front) = self.children.front_mut() else {
                return (Bytes::new(), ReadStatus::EndOfStream);
            };

            let (view, status) = front.read(requested_max);
            if matches!(status, ReadStatus::Error(_)) {
                return (view, status);
            }
            if status == ReadStatus::EndOfStream {
                self.children.pop_front();
                if !view.is_empty() {
                    let overall = self.overall_status(ReadStatus::EndOfStream);
                    return (view, overall);
                }
                continue;
            }
            if view.is_empty() && status == ReadStatus::WouldBlock {
                return (view, status);
            }
            let overall = self.overall_status(status);
            return (view, overall);
        }
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        loop {
            let Some(front) = self.children.front_mut() else {
                return (Bytes::new(), ReadStatus::EndOfStream);
            };

            let (view, status) = front.peek();
            if view.is_empty() && status == ReadStatus::EndOfStream {
                self.drop_exhausted_front(status);
                continue;
            }
            let overall = self.overall_status(status);
            return (view, overall);
        }
    }

    fn set_config(&mut self, config: Arc<BucketConfig>) {
        for child in &mut self.children {
            child.set_config(Arc::clone(&config));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::SimpleBucket;

    #[test]
    fn reads_children_in_order() {
        let mut agg = AggregateBucket::new();
        agg.append(SimpleBucket::new(Bytes::from_static(b"foo")));
        agg.append(SimpleBucket::new(Bytes::from_static(b"bar")));

        let (view, status) = agg.read(None);
        assert_eq!(&view[..], b"foo");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (view, status) = agg.read(None);
        assert_eq!(&view[..], b"bar");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn prepend_is_read_before_already_queued_children() {
        let mut agg = AggregateBucket::new();
        agg.append(SimpleBucket::new(Bytes::from_static(b"second")));
        agg.prepend(SimpleBucket::new(Bytes::from_static(b"first")));

        let (view, _) = agg.read(None);
        assert_eq!(&view[..], b"first");
        let (view, status) = agg.read(None);
        assert_eq!(&view[..], b"second");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn empty_aggregate_is_immediately_end_of_stream() {
        let mut agg = AggregateBucket::new();
        let (view, status) = agg.read(None);
        assert!(view.is_empty());
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn associativity_of_append_order_matches_concatenation() {
        let mut a = AggregateBucket::new();
        a.append(SimpleBucket::new(Bytes::from_static(b"a")));
        a.append(SimpleBucket::new(Bytes::from_static(b"b")));
        a.append(SimpleBucket::new(Bytes::from_static(b"c")));

        let mut collected = Vec::new();
        loop {
            let (view, status) = a.read(None);
            collected.extend_from_slice(&view);
            if status == ReadStatus::EndOfStream {
                break;
            }
        }
        assert_eq!(collected, b"abc");
    }
}
