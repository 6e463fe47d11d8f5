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
use std::ops::BitOr;
use std::sync::Arc;

use bytes::Bytes;

use crate::config::BucketConfig;
use crate::error::ReadStatus;

/// A borrowed-or-owned byte view returned by `read`/`peek`/`read_line`.
/// Realized as [`bytes::Bytes`] rather than a raw `(pointer, length)` pair
/// tied to the bucket's lifetime — see `SPEC_FULL.md` §3 for why.
pub type View = Bytes;

/// Bitset over recognized line terminators, used by [`Bucket::read_line`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct LineMask(u8);

impl LineMask {
    /// Accept a lone `\r` as a terminator.
    pub const CR: LineMask = LineMask(0b001);
    /// Accept a lone `\n` as a terminator.
    pub const LF: LineMask = LineMask(0b010);
    /// Accept `\r\n` as a terminator.
    pub const CRLF: LineMask = LineMask(0b100);
    /// Accept any of `\r`, `\n`, or `\r\n`.
    pub const ANY: LineMask = LineMask(0b111);

    fn contains(self, bit: LineMask) -> bool {
        self.0 & bit.0 != 0
    }
}

impl BitOr for LineMask {
    type Output = LineMask;

    fn bitor(self, rhs: LineMask) -> LineMask {
        LineMask(self.0 | rhs.0)
    }
}

/// The line terminator a [`Bucket::read_line`] call actually observed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LineEnding {
    /// No terminator was found in the returned view (either none is
    /// present yet, or the stream ended without one).
    None,
    /// A lone `\r` terminated the line.
    Cr,
    /// A lone `\n` terminated the line.
    Lf,
    /// `\r\n` terminated the line.
    Crlf,
    /// A `\r` sat at the end of the currently available input and `crlf` is
    /// an acceptable terminator; the matching `\n` has not been seen yet.
    /// The caller must read again to resolve it.
    CrlfSplit,
}

/// The polymorphic capability set every bucket variant implements (§4.1).
///
/// `destroy()` from the specification has no explicit method here: Rust's
/// `Drop` is the idiomatic realization of "releases all owned resources,
/// exactly once," and composite buckets (`Aggregate`) rely on their
/// children's `Drop` impls rather than an explicit destroy call.
pub trait Bucket: fmt::Debug {
    /// Returns up to `requested_max` bytes (or "all available" when `None`)
    /// from the current position. May return fewer, including zero, except
    /// that zero bytes with [`ReadStatus::MoreAvailable`] is forbidden
    /// (the read-line path is the only sanctioned exception, and it is
    /// exempt because it is a distinct method).
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus);

    /// Non-destructively returns the current position's view. May return
    /// [`ReadStatus::EndOfStream`] together with a non-empty view when the
    /// entire remaining content fits in one internal buffer.
    fn peek(&mut self) -> (View, ReadStatus);

    /// Returns at most one line. A terminator is recognized only if its
    /// kind is in `mask`; otherwise the terminator bytes are returned
    /// inline as data. The default implementation is built on `peek` plus
    /// `read` and is correct for any bucket; override it where scanning a
    /// bucket-internal buffer directly is cheaper.
    fn read_line(&mut self, mask: LineMask) -> (View, LineEnding, ReadStatus) {
        let (view, status) = self.peek();
        if view.is_empty() {
            return (Bytes::new(), LineEnding::None, status);
        }

        match scan_for_line(&view, mask, status) {
            LineScan::Found { end, consumed, kind } => {
                let line = view.slice(0..end);
                let (_, read_status) = self.read(Some(consumed));
                (line, kind, read_status)
            }
            LineScan::CrlfSplit { end, consumed } => {
                let line = view.slice(0..end);
                let (_, read_status) = self.read(Some(consumed));
                (line, LineEnding::CrlfSplit, read_status)
            }
            LineScan::NeedMore => {
                let (line, read_status) = self.read(None);
                (line, LineEnding::None, read_status)
            }
        }
    }

    /// Returns up to `max_vectors` contiguous runs whose total length is
    /// at most `requested_max` (or "all available" when `None`). The
    /// default wraps a single `read` call into a one-element vector, which
    /// is correct for any contiguous-storage bucket.
    fn read_iovec(&mut self, requested_max: Option<usize>, max_vectors: usize) -> (Vec<View>, ReadStatus) {
        if max_vectors == 0 {
            return (Vec::new(), ReadStatus::MoreAvailable);
        }

        let (view, status) = self.read(requested_max);
        if view.is_empty() {
            (Vec::new(), status)
        } else {
            (vec![view], status)
        }
    }

    /// Installs an opaque shared configuration. Composite buckets forward
    /// this to their children; leaf buckets default to a no-op.
    fn set_config(&mut self, _config: Arc<BucketConfig>) {}
}

/// Forwards the contract to the boxed trait object, the way
/// `std::io::Read` is implemented for `Box<dyn Read>`. Lets callers that
/// only have a `Box<dyn Bucket>` (an `Aggregate` child handed across a
/// crate boundary, `bucket_tls`'s multiplexed encrypt sources) use it
/// directly as a `Bucket` instead of threading a generic parameter through.
impl Bucket for Box<dyn Bucket> {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        (**self).read(requested_max)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        (**self).peek()
    }

    fn read_line(&mut self, mask: LineMask) -> (View, LineEnding, ReadStatus) {
        (**self).read_line(mask)
    }

    fn read_iovec(&mut self, requested_max: Option<usize>, max_vectors: usize) -> (Vec<View>, ReadStatus) {
        (**self).read_iovec(requested_max, max_vectors)
    }

    fn set_config(&mut self, config: Arc<BucketConfig>) {
        (**self).set_config(config)
    }
}

enum LineScan {
    Found {
        end: usize,
        consumed: usize,
        kind: LineEnding,
    },
    CrlfSplit {
        end: usize,
        consumed: usize,
    },
    NeedMore,
}

/// Scans `view` for the first terminator acceptable under `mask`, honoring
/// the crlf-split boundary case. `status` is the status that accompanied
/// `view` (from `peek`), used to decide whether a trailing lone `\r` is a
/// genuine crlf-split (more data may arrive) or, per the open question in
/// `SPEC_FULL.md` §9, should be treated as plain unterminated data because
/// the stream has already ended.
fn scan_for_line(view: &[u8], mask: LineMask, status: ReadStatus) -> LineScan {
    let mut i = 0;
    while i < view.len() {
        match view[i] {
            b'\n' if mask.contains(LineMask::LF) => {
                return LineScan::Found {
                    end: i,
                    consumed: i + 1,
                    kind: LineEnding::Lf,
                };
            }
            b'\r' => {
                if let Some(&next) = view.get(i + 1) {
                    if next == b'\n' {
                        if mask.contains(LineMask::CRLF) {
                            return LineScan::Found {
                                end: i,
                                consumed: i + 2,
                                kind: LineEnding::Crlf,
                            };
                        }
                        if mask.contains(LineMask::CR) {
                            return LineScan::Found {
                                end: i,
                                consumed: i + 1,
                                kind: LineEnding::Cr,
                            };
                        }
                        // Neither CR nor CRLF acceptable: the `\r` is data,
                        // keep scanning (the `\n` is handled by the next
                        // loop iteration).
                    } else if mask.contains(LineMask::CR) {
                        return LineScan::Found {
                            end: i,
                            consumed: i + 1,
                            kind: LineEnding::Cr,
                        };
                    }
                    // `\r` not followed by `\n` and CR unacceptable: data.
                } else {
                    // Lone `\r` at the boundary of currently available input.
                    if mask.contains(LineMask::CRLF) && !status.is_terminal() {
                        return LineScan::CrlfSplit {
                            end: i,
                            consumed: i + 1,
                        };
                    }
                    if mask.contains(LineMask::CR) {
                        return LineScan::Found {
                            end: i,
                            consumed: i + 1,
                            kind: LineEnding::Cr,
                        };
                    }
                    // Stream ended (or CR unacceptable with no lookahead
                    // possible): treat the trailing `\r` as plain data.
                }
                i += 1;
            }
            _ => i += 1,
        }
    }

    LineScan::NeedMore
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAction, MockBucket};

    #[test]
    fn line_mask_combination() {
        let mask = LineMask::CR | LineMask::LF;
        assert!(mask.contains(LineMask::CR));
        assert!(mask.contains(LineMask::LF));
        assert!(!mask.contains(LineMask::CRLF));
    }

    #[test]
    fn scan_finds_crlf_before_lf_when_both_acceptable() {
        let view = b"abc\r\ndef";
        match scan_for_line(view, LineMask::ANY, ReadStatus::MoreAvailable) {
            LineScan::Found { end, consumed, kind } => {
                assert_eq!(end, 3);
                assert_eq!(consumed, 5);
                assert_eq!(kind, LineEnding::Crlf);
            }
            _ => panic!("expected Found"),
        }
    }

    #[test]
    fn scan_reports_crlf_split_at_boundary() {
        let view = b"abc\r";
        match scan_for_line(view, LineMask::CRLF, ReadStatus::MoreAvailable) {
            LineScan::CrlfSplit { end, consumed } => {
                assert_eq!(end, 3);
                assert_eq!(consumed, 4);
            }
            _ => panic!("expected CrlfSplit"),
        }
    }

    #[test]
    fn scan_resolves_open_question_lone_cr_at_eof_as_none() {
        // Per SPEC_FULL.md §9: a lone trailing `\r` with the source already
        // at end-of-stream is reported as `none`, not `crlf-split`.
        let view = b"abc\r";
        match scan_for_line(view, LineMask::CRLF, ReadStatus::EndOfStream) {
            LineScan::NeedMore => {}
            _ => panic!("expected NeedMore (caller falls back to plain data)"),
        }
    }

    #[test]
    fn default_read_line_over_mock_handles_cr_mask_scenario() {
        // Scenario 2 from SPEC_FULL.md / spec.md §8.
        let mut bucket = MockBucket::new(vec![MockAction::data(b"line1\r\n".to_vec())]);

        let (line, kind, status) = bucket.read_line(LineMask::CR);
        assert_eq!(&line[..], b"line1\r");
        assert_eq!(kind, LineEnding::Cr);
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (line, kind, status) = bucket.read_line(LineMask::CR);
        assert_eq!(&line[..], b"\n");
        assert_eq!(kind, LineEnding::None);
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn default_read_line_crlf_mask_scenario_one() {
        let mut bucket = MockBucket::new(vec![MockAction::data(b"line1\r\nline2".to_vec())]);

        let (line, kind, status) = bucket.read_line(LineMask::CRLF);
        assert_eq!(&line[..], b"line1\r\n");
        assert_eq!(kind, LineEnding::Crlf);
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (line, kind, status) = bucket.read_line(LineMask::CRLF);
        assert_eq!(&line[..], b"line2");
        assert_eq!(kind, LineEnding::None);
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
