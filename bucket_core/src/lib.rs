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

//! `bucket_core` is a composable, pull-driven, zero-copy streaming library
//! used to produce HTTP request bytes and consume HTTP response bytes. It
//! implements the bucket protocol (`Bucket`), its leaf and composite
//! variants, and the HTTP/1.1 response parser. TLS is layered on top by the
//! sibling `bucket_tls` crate.

mod aggregate;
mod bucket;
mod chunked;
mod config;
mod databuf;
mod error;
mod headers;
mod iovec;
mod linebuf;
mod mock;
mod response;
mod simple;

pub use aggregate::AggregateBucket;
pub use bucket::{Bucket, LineEnding, LineMask, View};
pub use chunked::ChunkedDecoder;
pub use config::BucketConfig;
pub use databuf::{Databuf, DatabufReader};
pub use error::{Error, ErrorStatus, ReadStatus};
pub use headers::{HeaderTable, HeadersBucket};
pub use iovec::IovecBucket;
pub use linebuf::{LineAccumulator, LineOutcome, MAX_LINE_LEN};
pub use mock::{MockAction, MockBucket};
pub use response::{Framing, Phase, ResponseBucket, StatusLine};
pub use simple::SimpleBucket;
