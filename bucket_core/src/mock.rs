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
use crate::error::{ErrorStatus, ReadStatus};

/// One scripted step of a [`MockBucket`]'s stream (§4.9).
#[derive(Clone, Debug)]
pub struct MockAction {
    bytes: Bytes,
    status: ReadStatus,
    times: usize,
}

impl MockAction {
    /// A chunk of data followed by [`ReadStatus::MoreAvailable`].
    pub fn data(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            status: ReadStatus::MoreAvailable,
            times: 1,
        }
    }

    /// A chunk of data that is the final thing the stream ever produces.
    pub fn last(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            status: ReadStatus::EndOfStream,
            times: 1,
        }
    }

    /// Nothing is available yet. Stays current (stalls subsequent reads)
    /// until [`MockBucket::more_data_arrived`] is called.
    pub fn would_block() -> Self {
        Self {
            bytes: Bytes::new(),
            status: ReadStatus::WouldBlock,
            times: 1,
        }
    }

    /// A terminal classified error with no bytes.
    pub fn error(status: ErrorStatus) -> Self {
        Self {
            bytes: Bytes::new(),
            status: ReadStatus::Error(status),
            times: 1,
        }
    }

    /// Repeats this action's bytes-and-status `times` times before the
    /// script advances to the next action.
    pub fn repeat(mut self, times: usize) -> Self {
        self.times = times.max(1);
        self
    }
}

/// A scripted, non-blocking stream used to exercise other buckets' and
/// parsers' handling of partial reads, would-block stalls, and the
/// crlf-split boundary without needing a real socket (§4.9). Every action
/// models one underlying "delivery" the way a single `recv()` call would:
/// `read` never reaches across an action boundary to merge two actions'
/// bytes into one return, even when `requested_max` would otherwise allow
/// it, so scripts can pin down exactly how input arrives in pieces.
#[derive(Debug, Default)]
pub struct MockBucket {
    queue: VecDeque<MockAction>,
    current: Option<(MockAction, Bytes)>,
}

impl MockBucket {
    pub fn new(actions: impl IntoIterator<Item = MockAction>) -> Self {
        Self {
            queue: actions.into_iter().collect(),
            current: None,
        }
    }

    fn ensure_current(&mut self) {
        if self.current.is_none() {
            if let Some(action) = self.queue.pop_front() {
                let remaining = action.bytes.clone();
                self.current = Some((action, remaining));
            }
        }
    }

    /// Resolves a stalled [`MockAction::would_block`] action, letting the
    /// script advance to whatever comes after it. Calling this when the
    /// current action isn't a stall is a no-op.
    pub fn more_data_arrived(&mut self) {
        if let Some((action, remaining)) = &self.current {
            if action.status == ReadStatus::WouldBlock && remaining.is_empty() {
                self.current = None;
            }
        }
    }
}

impl Bucket for MockBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        self.ensure_current();
        let Some((action, remaining)) = self.current.as_mut() else {
            return (Bytes::new(), ReadStatus::EndOfStream);
        };

        if remaining.is_empty() {
            if action.status == ReadStatus::WouldBlock {
                return (Bytes::new(), ReadStatus::WouldBlock);
            }
            return (Bytes::new(), finish_action(&mut self.current));
        }

        let take = requested_max.unwrap_or(remaining.len()).min(remaining.len());
        let chunk = remaining.split_to(take);

        let status = if !remaining.is_empty() {
            ReadStatus::MoreAvailable
        } else if action.times > 1 {
            action.times -= 1;
            *remaining = action.bytes.clone();
            ReadStatus::MoreAvailable
        } else {
            finish_action(&mut self.current)
        };

        (chunk, status)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        self.ensure_current();
        match self.current.as_ref() {
            None => (Bytes::new(), ReadStatus::EndOfStream),
            Some((action, remaining)) => {
                if remaining.is_empty() {
                    (Bytes::new(), action.status)
                } else {
                    let status = if action.times <= 1 {
                        action.status
                    } else {
                        ReadStatus::MoreAvailable
                    };
                    (remaining.clone(), status)
                }
            }
        }
    }
}

/// Drops the current action (its repeats already exhausted by the caller)
/// and reports the status it was scripted to end on.
fn finish_action(current: &mut Option<(MockAction, Bytes)>) -> ReadStatus {
    let (action, _) = current.take().expect("finish_action called with no current action");
    action.status
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_single_action_honoring_requested_max() {
        let mut bucket = MockBucket::new(vec![MockAction::last(b"hello".to_vec())]);

        let (chunk, status) = bucket.read(Some(2));
        assert_eq!(&chunk[..], b"he");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (chunk, status) = bucket.read(None);
        assert_eq!(&chunk[..], b"llo");
        assert_eq!(status, ReadStatus::EndOfStream);

        let (chunk, status) = bucket.read(None);
        assert!(chunk.is_empty());
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn would_block_stalls_until_more_data_arrived() {
        let mut bucket = MockBucket::new(vec![
            MockAction::data(b"ab".to_vec()),
            MockAction::would_block(),
            MockAction::last(b"cd".to_vec()),
        ]);

        let (chunk, status) = bucket.read(None);
        assert_eq!(&chunk[..], b"ab");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (chunk, status) = bucket.read(None);
        assert!(chunk.is_empty());
        assert_eq!(status, ReadStatus::WouldBlock);

        // Retrying without a signal stays stalled.
        let (chunk, status) = bucket.read(None);
        assert!(chunk.is_empty());
        assert_eq!(status, ReadStatus::WouldBlock);

        bucket.more_data_arrived();

        let (chunk, status) = bucket.read(None);
        assert_eq!(&chunk[..], b"cd");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn actions_do_not_merge_across_boundaries() {
        let mut bucket = MockBucket::new(vec![
            MockAction::data(b"ab".to_vec()),
            MockAction::last(b"cd".to_vec()),
        ]);

        // Even though 10 bytes are requested, the first action only yields
        // its own 2 bytes: the second action is a distinct "delivery".
        let (chunk, status) = bucket.read(Some(10));
        assert_eq!(&chunk[..], b"ab");
        assert_eq!(status, ReadStatus::MoreAvailable);
    }

    #[test]
    fn repeated_action_replays_before_advancing() {
        let mut bucket = MockBucket::new(vec![MockAction::data(b"x".to_vec()).repeat(3)]);

        for _ in 0..3 {
            let (chunk, status) = bucket.read(None);
            assert_eq!(&chunk[..], b"x");
            assert_eq!(status, ReadStatus::MoreAvailable);
        }

        let (chunk, status) = bucket.read(None);
        assert!(chunk.is_empty());
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut bucket = MockBucket::new(vec![MockAction::last(b"peekme".to_vec())]);

        let (view, status) = bucket.peek();
        assert_eq!(&view[..], b"peekme");
        assert_eq!(status, ReadStatus::EndOfStream);

        let (view, status) = bucket.peek();
        assert_eq!(&view[..], b"peekme");
        assert_eq!(status, ReadStatus::EndOfStream);

        let (chunk, status) = bucket.read(None);
        assert_eq!(&chunk[..], b"peekme");
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
