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

use std::rc::Rc;
use std::sync::Arc;

use bucket_core::{Bucket, BucketConfig, ReadStatus, View};
use bytes::{Bytes, BytesMut};

use crate::context::TlsContext;

const FILL_SIZE: usize = 16 * 1024;

/// The ciphertext side of the encrypt façade (§4.8): reads here drive the
/// engine to consume plaintext queued on the attached source and emit the
/// TLS records that resulted.
///
/// Unlike a plain [`bucket_core::Databuf`], the internal staging here never
/// latches [`bucket_core::ErrorStatus::WaitForConnection`] — that status is
/// explicitly transient (the engine needs the decrypt side driven before it
/// can produce more ciphertext) and must be retried, not remembered as a
/// dead stream.
#[derive(Debug)]
pub struct EncryptBucket {
    ctx: Rc<TlsContext>,
    staged: BytesMut,
    latched: Option<ReadStatus>,
}

impl EncryptBucket {
    /// Wraps `ctx`'s encrypt side, queuing `source` as the plaintext to send
    /// (attached immediately if no other request is currently active on
    /// this connection, otherwise queued behind it, per §4.8).
    pub fn new(ctx: Rc<TlsContext>, source: Box<dyn Bucket>) -> Self {
        ctx.attach_encrypt_source(source);
        Self {
            ctx,
            staged: BytesMut::new(),
            latched: None,
        }
    }

    fn fill(&mut self) -> ReadStatus {
        if !self.staged.is_empty() {
            return ReadStatus::MoreAvailable;
        }
        if let Some(status) = self.latched {
            return status;
        }

        let mut chunk = vec![0u8; FILL_SIZE];
        let (n, status) = self.ctx.drive_encrypt(&mut chunk);
        if n > 0 {
            self.staged.extend_from_slice(&chunk[..n]);
        }
        if status.is_terminal() && !status.is_transient() {
            self.latched = Some(status);
        }
        if n > 0 {
            ReadStatus::MoreAvailable
        } else {
            status
        }
    }
}

impl Bucket for EncryptBucket {
    fn read(&mut self, requested_max: Option<usize>) -> (View, ReadStatus) {
        let status = self.fill();
        if self.staged.is_empty() {
            return (Bytes::new(), status);
        }
        let take = requested_max.unwrap_or(self.staged.len()).min(self.staged.len());
        let chunk = self.staged.split_to(take).freeze();
        let status = if !self.staged.is_empty() {
            ReadStatus::MoreAvailable
        } else {
            status
        };
        (chunk, status)
    }

    fn peek(&mut self) -> (View, ReadStatus) {
        let status = self.fill();
        (Bytes::copy_from_slice(&self.staged), status)
    }

    fn set_config(&mut self, config: Arc<BucketConfig>) {
        self.ctx.set_pipelining(config.connection_pipelining);
    }
}

impl Drop for EncryptBucket {
    fn drop(&mut self) {
        self.ctx.release_encrypt_source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::{MockBucket, SimpleBucket};

    #[test]
    fn wraps_without_panicking_before_handshake_completes() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        let mut bucket = EncryptBucket::new(
            Rc::clone(&ctx),
            Box::new(SimpleBucket::new(Bytes::from_static(b"hello"))),
        );
        // Nothing has been exchanged with a real peer, so the engine has
        // only a ClientHello to emit; this should not panic or deadlock.
        let (_view, status) = bucket.read(Some(64));
        assert!(matches!(
            status,
            ReadStatus::MoreAvailable | ReadStatus::WouldBlock | ReadStatus::Error(_)
        ));
    }

    #[test]
    fn dropping_releases_the_active_slot() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        {
            let _bucket = EncryptBucket::new(
                Rc::clone(&ctx),
                Box::new(SimpleBucket::new(Bytes::from_static(b"a"))),
            );
        }
        let second_became_active =
            ctx.attach_encrypt_source(Box::new(SimpleBucket::new(Bytes::from_static(b"b"))));
        assert!(second_became_active);
    }
}
