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

use bytes::{BufMut, Bytes, BytesMut};

use crate::bucket::{Bucket, View};
use crate::error::ReadStatus;
use crate::simple::SimpleBucket;

/// An ordered multimap of header name/value pairs (§4.4), the parsed form
/// `response.rs` produces and the form a request-building caller starts
/// from before handing headers to an `Aggregate`.
#[derive(Clone, Debug, Default)]
pub struct HeaderTable {
    entries: Vec<(String, String)>,
}

impl HeaderTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new entry for `name`, or, if `name` already exists
    /// (case-insensitive), rewrites its value to `existing + "," + value`
    /// (§4.4). This is the table's only mutator: there is no overwriting
    /// `insert`, matching the wire semantics of repeated HTTP headers.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, existing)) => {
                existing.push(',');
                existing.push_str(&value);
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the joined value for `name`, matched case-insensitively.
    /// `None` means the header is absent; `Some("")` means it is present
    /// with an empty value — the two must stay distinguishable (§6).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Serializes this table into CRLF-terminated `Name: value` lines
    /// followed by the blank-line terminator, the wire form a header
    /// section takes in an HTTP/1.1 message.
    pub fn to_wire_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(
            self.entries
                .iter()
                .map(|(n, v)| n.len() + v.len() + 4)
                .sum::<usize>()
                + 2,
        );
        for (name, value) in &self.entries {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.freeze()
    }

    /// Wraps this table as a readable bucket over its wire serialization.
    pub fn into_bucket(self) -> HeadersBucket {
        HeadersBucket {
            inner: SimpleBucket::new(self.to_wire_bytes()),
        }
    }
}

/// A bucket that streams a [`HeaderTable`]'s wire serialization (§4.4). A
/// thin `Bucket` wrapper around [`SimpleBucket`] over pre-serialized bytes,
/// the way a leaf whose content is fully known up front is handled
/// throughout this crate.
#[derive(Clone, Debug)]
pub struct HeadersBucket {
    inner: SimpleBucket,
}

impl Bucket for HeadersBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        self.inner.read(requested_max)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        self.inner.peek()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive() {
        let mut headers = HeaderTable::new();
        headers.set("Content-Type", "text/plain");

        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn repeated_set_joins_with_commas() {
        // Testable property from spec.md §8: "v1,v2" then "v1,v2,v3".
        let mut headers = HeaderTable::new();
        headers.set("Foo", "bar");
        assert_eq!(headers.get("Foo"), Some("bar"));

        headers.set("Foo", "baz");
        assert_eq!(headers.get("Foo"), Some("bar,baz"));

        headers.set("foo", "test");
        assert_eq!(headers.get("fOO"), Some("bar,baz,test"));
    }

    #[test]
    fn wire_serialization_ends_with_blank_line() {
        let mut headers = HeaderTable::new();
        headers.set("Host", "example.com");

        assert_eq!(&headers.to_wire_bytes()[..], b"Host: example.com\r\n\r\n");
    }

    #[test]
    fn bucket_reads_full_wire_form() {
        let mut headers = HeaderTable::new();
        headers.set("X-A", "1");
        let mut bucket = headers.into_bucket();

        let (view, status) = bucket.read(None);
        assert_eq!(&view[..], b"X-A: 1\r\n\r\n");
        assert_eq!(status, ReadStatus::EndOfStream);
    }
}
