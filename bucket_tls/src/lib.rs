// bucket_tls is the TLS bridge of the bucket pipeline.
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

//! `bucket_tls` layers a TLS bridge over `bucket_core`'s bucket protocol
//! (§4.8): one shared [`TlsContext`] driving `rustls`, exposed as a pair of
//! encrypt/decrypt buckets instead of a socket.

mod cert;
mod context;
mod decrypt;
mod encrypt;
mod error;
mod init;

pub use cert::{CertCallback, CertProblems};
pub use context::TlsContext;
pub use decrypt::DecryptBucket;
pub use encrypt::EncryptBucket;
pub use error::TlsError;
