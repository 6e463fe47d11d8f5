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

use bucket_core::ErrorStatus;
use thiserror::Error;

/// Error taxonomy for `bucket_tls`, layered over [`bucket_core::Error`] the
/// way `hbak`'s `Error` wraps `hbak_common`'s error types with `#[from]`
/// rather than re-declaring their variants.
#[derive(Debug, Error)]
pub enum TlsError {
    /// The handshake failed before completing (§4.8, `ssl-setup-failed`).
    #[error("TLS handshake failed: {0}")]
    SetupFailed(String),
    /// A TLS error occurred on an already-established connection
    /// (§4.8, `ssl-comm-failed`).
    #[error("TLS communication error: {0}")]
    CommFailed(String),
    /// Certificate verification failed and no callback overrode it
    /// (§4.8, `ssl-cert-failed`).
    #[error("TLS certificate verification failed: {0}")]
    CertFailed(String),
    /// A renegotiation attempt was detected and rejected on a pipelined
    /// connection (§4.8, `ssl-negotiate-in-progress`).
    #[error("TLS renegotiation is not permitted on a pipelined connection")]
    NegotiateInProgress,
    /// The server name given to [`crate::TlsContext::new`] was not a valid
    /// DNS name or IP address.
    #[error("invalid server name: {0}")]
    InvalidServerName(String),
    /// Wraps the lower-level streaming error from `bucket_core`.
    #[error("bucket error: {0}")]
    Bucket(#[from] bucket_core::Error),
}

impl TlsError {
    /// Classifies this error into the flat [`ErrorStatus`] surfaced at the
    /// API boundary (§6), mirroring `bucket_core::Error::status`.
    pub fn status(&self) -> ErrorStatus {
        match self {
            Self::SetupFailed(_) | Self::InvalidServerName(_) => ErrorStatus::SslSetupFailed,
            Self::CommFailed(_) => ErrorStatus::SslCommFailed,
            Self::CertFailed(_) => ErrorStatus::SslCertFailed,
            Self::NegotiateInProgress => ErrorStatus::SslNegotiateInProgress,
            Self::Bucket(e) => e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_failed_maps_to_ssl_setup_failed() {
        assert_eq!(
            TlsError::SetupFailed("x".into()).status(),
            ErrorStatus::SslSetupFailed
        );
    }

    #[test]
    fn negotiate_in_progress_maps_to_its_own_status() {
        assert_eq!(
            TlsError::NegotiateInProgress.status(),
            ErrorStatus::SslNegotiateInProgress
        );
    }
}
