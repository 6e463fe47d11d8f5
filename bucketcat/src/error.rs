// bucketcat is a command-line HTTP(S) fetcher exercising the bucket pipeline.
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

use std::io;

use bucket_core::ErrorStatus;
use thiserror::Error;

/// `bucketcat`'s own error type, layered over `bucket_core`/`bucket_tls`
/// the way `hbak`'s `Error` wraps `hbak_common`'s error types with
/// `#[from]` rather than re-declaring their variants (§2 "Error handling").
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to parse URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("unsupported URL scheme \"{0}\" (only http and https are supported)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("header \"{0}\" is not in \"Name: Value\" form")]
    MalformedHeader(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("TLS error: {0}")]
    Tls(#[from] bucket_tls::TlsError),
    #[error("response error: {0}")]
    Response(ErrorStatus),
}

pub type Result<T> = std::result::Result<T, Error>;
