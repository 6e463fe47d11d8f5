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

use std::io::{self, ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use log::trace;

use crate::bucket::{Bucket, View};
use crate::error::{ErrorStatus, ReadStatus};

/// Default chunk size requested from the underlying reader per fill (§4.7).
/// Matches the size Apache Serf's socket bucket pulls per `apr_socket_recv`
/// call.
const DEFAULT_FILL_SIZE: usize = 8000;

/// The pull-source a [`Databuf`] adapts into the bucket contract: `(bufsize,
/// out_buf) -> (len, status)` per §4.7. `ssl_encrypt`/`ssl_decrypt` (§4.8)
/// are the two readers of real interest — each already produces a rich
/// [`ReadStatus`] directly, so there is no lossy translation through
/// `std::io::Error` on the way in.
pub type DatabufReader = Box<dyn FnMut(&mut [u8]) -> (usize, ReadStatus) + Send>;

/// Wraps a [`DatabufReader`] function in a fixed-size staging buffer and
/// presents the full bucket contract (§4.7), smoothing over short reads from
/// the underlying source. `peek` and partial `read` calls are served out of
/// the staging buffer without re-invoking the reader.
pub struct Databuf {
    reader: DatabufReader,
    buf: BytesMut,
    fill_size: usize,
    latched: Option<ReadStatus>,
}

impl Databuf {
    pub fn new(reader: DatabufReader) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
            fill_size: DEFAULT_FILL_SIZE,
            latched: None,
        }
    }

    pub fn with_fill_size(reader: DatabufReader, fill_size: usize) -> Self {
        Self {
            reader,
            buf: BytesMut::new(),
            fill_size: fill_size.max(1),
            latched: None,
        }
    }

    /// Adapts a real [`std::io::Read`] (a non-blocking socket) into a
    /// [`DatabufReader`], the convenience path a transport-facing caller
    /// (`bucketcat`) uses instead of hand-writing the `(len, status)`
    /// mapping itself.
    pub fn from_io<R: Read + Send + 'static>(mut source: R) -> Self {
        Self::new(Box::new(move |buf| loop {
            match source.read(buf) {
                Ok(0) => return (0, ReadStatus::EndOfStream),
                Ok(n) => return (n, ReadStatus::MoreAvailable),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return (0, ReadStatus::WouldBlock),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return (0, map_io_error(&e)),
            }
        }))
    }

    /// Pulls one chunk from the reader into the internal buffer if it is
    /// currently empty. Returns the status that should accompany an empty
    /// read/peek result. Once a terminal status (`EndOfStream` or an error)
    /// has been observed, it is latched and returned again without
    /// re-invoking the reader (§7: "data errors... latch where applicable").
    fn fill(&mut self) -> ReadStatus {
        if !self.buf.is_empty() {
            return ReadStatus::MoreAvailable;
        }
        if let Some(status) = self.latched {
            return status;
        }

        let mut chunk = vec![0u8; self.fill_size];
        let (n, status) = (self.reader)(&mut chunk);
        if n > 0 {
            trace!("databuf: filled {n} bytes");
            self.buf.extend_from_slice(&chunk[..n]);
        }
        if status.is_terminal() {
            self.latched = Some(status);
        }
        if n > 0 {
            ReadStatus::MoreAvailable
        } else {
            status
        }
    }
}

fn map_io_error(e: &io::Error) -> ReadStatus {
    ReadStatus::Error(match e.kind() {
        ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof => ErrorStatus::TruncatedResponse,
        _ => ErrorStatus::SslCommFailed,
    })
}

impl Bucket for Databuf {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        let status = self.fill();
        if self.buf.is_empty() {
            return (Bytes::new(), status);
        }

        let take = requested_max.unwrap_or(self.buf.len()).min(self.buf.len());
        let chunk = self.buf.split_to(take).freeze();
        let status = if !self.buf.is_empty() {
            ReadStatus::MoreAvailable
        } else {
            status
        };
        (chunk, status)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        let status = self.fill();
        (Bytes::copy_from_slice(&self.buf), status)
    }
}

impl std::fmt::Debug for Databuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Databuf")
            .field("buffered", &self.buf.len())
            .field("fill_size", &self.fill_size)
            .field("latched", &self.latched)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_through_to_end_of_stream() {
        let mut bucket = Databuf::from_io(Cursor::new(b"hello world".to_vec()));

        let (view, status) = bucket.read(Some(5));
        assert_eq!(&view[..], b"hello");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (view, status) = bucket.read(None);
        assert_eq!(&view[..], b" world");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn would_block_reader_reports_would_block_without_latching() {
        let mut calls = 0;
        let mut bucket = Databuf::new(Box::new(move |_buf| {
            calls += 1;
            (0, ReadStatus::WouldBlock)
        }));

        let (view, status) = bucket.read(None);
        assert!(view.is_empty());
        assert_eq!(status, ReadStatus::WouldBlock);

        // A second call does not latch the transient status either.
        let (view, status) = bucket.read(None);
        assert!(view.is_empty());
        assert_eq!(status, ReadStatus::WouldBlock);
    }

    #[test]
    fn peek_fills_but_does_not_consume() {
        let mut bucket = Databuf::from_io(Cursor::new(b"abc".to_vec()));

        let (view, status) = bucket.peek();
        assert_eq!(&view[..], b"abc");
        assert_eq!(status, ReadStatus::MoreAvailable);

        let (view, status) = bucket.read(None);
        assert_eq!(&view[..], b"abc");
        assert_eq!(status, ReadStatus::EndOfStream);
    }

    #[test]
    fn terminal_status_is_latched_after_end_of_stream() {
        let mut bucket = Databuf::from_io(Cursor::new(Vec::new()));
        let (_, status) = bucket.read(None);
        assert_eq!(status, ReadStatus::EndOfStream);
        let (_, status) = bucket.read(None);
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
