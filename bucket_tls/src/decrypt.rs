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

/// The plaintext side of the decrypt façade (§4.8): reads here drive the
/// engine to consume ciphertext from the network source and emit whatever
/// application data that yielded.
///
/// Staging mirrors [`crate::EncryptBucket`]'s: a
/// [`bucket_core::ErrorStatus::WaitForConnection`] result is never latched,
/// since it means the encrypt side needs to be driven first, not that the
/// stream has ended.
#[derive(Debug)]
pub struct DecryptBucket {
    ctx: Rc<TlsContext>,
    staged: BytesMut,
    latched: Option<ReadStatus>,
}

impl DecryptBucket {
    pub fn new(ctx: Rc<TlsContext>) -> Self {
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
        let (n, status) = self.ctx.drive_decrypt(&mut chunk);
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

impl Bucket for DecryptBucket {
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

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::MockBucket;

    #[test]
    fn reads_nothing_useful_before_any_ciphertext_arrives() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        let mut bucket = DecryptBucket::new(ctx);
        let (view, status) = bucket.read(Some(64));
        assert!(view.is_empty());
        assert!(matches!(
            status,
            ReadStatus::WouldBlock | ReadStatus::Error(_)
        ));
    }
}
