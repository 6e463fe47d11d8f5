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

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use bucket_core::{AggregateBucket, Bucket, ErrorStatus, ReadStatus, SimpleBucket};
use bytes::{Bytes, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore};

use crate::cert::{CallbackVerifier, CertCallback};
use crate::error::TlsError;
use crate::init::ensure_global_init;

/// Upper bound on how many discontiguous spans `ssl_encrypt` coalesces out
/// of `encrypt.source` per call (§4.8: "up to 64 vectors").
const MAX_ENCRYPT_VECTORS: usize = 64;
/// Upper bound on how many plaintext bytes are coalesced into one scratch
/// buffer per `ssl_encrypt` call, bounding its allocation.
const MAX_ENCRYPT_BYTES: usize = 256 * 1024;

/// Shared state for one TLS connection, owned jointly by one
/// [`crate::EncryptBucket`] and one [`crate::DecryptBucket`] (§3 "TLS
/// context"). Modeled as `Rc`-shared single-threaded state rather than
/// cyclic references, per the "Self-referential TLS context" design note
/// in `SPEC_FULL.md` §9: the context owns its two aggregates outright, and
/// is itself jointly owned by its two façades via `Rc`'s explicit refcount.
pub struct TlsContext {
    conn: RefCell<ClientConnection>,
    /// Plaintext application data waiting to be pushed through the engine.
    encrypt_source: RefCell<AggregateBucket>,
    /// Ciphertext the engine has produced but the transport hasn't read yet.
    encrypt_pending: RefCell<AggregateBucket>,
    /// Ciphertext arriving from the network.
    decrypt_source: RefCell<Box<dyn Bucket>>,
    /// FIFO of plaintext sources queued behind the currently active one
    /// (§4.8 "Multiplexing encrypt sources", for request pipelining).
    next_encrypt_sources: RefCell<VecDeque<Box<dyn Bucket>>>,
    active_encrypt: Cell<bool>,
    /// Set when the engine's last write attempt needed to read from the
    /// transport before it could make progress (§4.8 step 5).
    want_read: Cell<bool>,
    /// The status latched by the last `bridge_read` call, threaded back out
    /// as the status accompanying a successful decrypt/encrypt (§4.8).
    crypt_status: Cell<ReadStatus>,
    /// Once set, every subsequent encrypt or decrypt returns this error
    /// without attempting further engine I/O (§3 "Fatal latch").
    fatal: Cell<Option<ErrorStatus>>,
    /// Whether the handshake has completed at least once. Used to decide
    /// whether a later protocol error is a post-handshake renegotiation
    /// attempt or a handshake failure (§4.8).
    established: Cell<bool>,
    /// Mirrors `BucketConfig::connection_pipelining` (§6): when set,
    /// renegotiation after the handshake is treated as fatal instead of a
    /// generic comm failure, since it would corrupt a pipelined
    /// connection's framing.
    pipelining: Cell<bool>,
    /// Set by [`CallbackVerifier`] when an application certificate callback
    /// rejects the chain, so the handshake failure that follows surfaces
    /// the application's classification instead of a generic one (§4.8).
    pending_cert_error: Arc<Mutex<Option<ErrorStatus>>>,
}

impl TlsContext {
    /// Builds a context trusting the Mozilla root CA bundle
    /// (`webpki-roots`), the default any HTTPS client in this ecosystem
    /// starts from.
    pub fn new(server_name: &str, decrypt_source: Box<dyn Bucket>) -> Result<Rc<Self>, TlsError> {
        Self::with_callback(server_name, decrypt_source, None)
    }

    /// Builds a context with an application certificate callback installed
    /// (§4.8 "Certificate callbacks").
    pub fn with_callback(
        server_name: &str,
        decrypt_source: Box<dyn Bucket>,
        callback: Option<CertCallback>,
    ) -> Result<Rc<Self>, TlsError> {
        ensure_global_init();

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let roots = Arc::new(roots);

        let pending_cert_error = Arc::new(Mutex::new(None));
        let verifier = Arc::new(CallbackVerifier::new(
            Arc::clone(&roots),
            callback,
            Arc::clone(&pending_cert_error),
        )?);

        let config = ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(verifier)
            .with_no_client_auth();

        let name = ServerName::try_from(server_name.to_owned())
            .map_err(|e| TlsError::InvalidServerName(e.to_string()))?;

        let conn = ClientConnection::new(Arc::new(config), name)
            .map_err(|e| TlsError::SetupFailed(e.to_string()))?;

        Ok(Rc::new(Self {
            conn: RefCell::new(conn),
            encrypt_source: RefCell::new(AggregateBucket::new()),
            encrypt_pending: RefCell::new(AggregateBucket::new()),
            decrypt_source: RefCell::new(decrypt_source),
            next_encrypt_sources: RefCell::new(VecDeque::new()),
            active_encrypt: Cell::new(false),
            want_read: Cell::new(false),
            crypt_status: Cell::new(ReadStatus::MoreAvailable),
            fatal: Cell::new(None),
            established: Cell::new(false),
            pipelining: Cell::new(false),
            pending_cert_error,
        }))
    }

    /// Mirrors the `connection-pipelining` config key (§6): enables the
    /// renegotiation-rejection behavior described in §4.8.
    pub fn set_pipelining(&self, enabled: bool) {
        self.pipelining.set(enabled);
    }

    pub fn is_handshaking(&self) -> bool {
        self.conn.borrow().is_handshaking()
    }

    /// Installs `source` as the plaintext stream the engine reads request
    /// bytes from. If an encrypt façade is already active, `source` is
    /// queued behind it instead (§4.8 "Multiplexing encrypt sources").
    /// Returns whether `source` became active immediately.
    pub(crate) fn attach_encrypt_source(&self, source: Box<dyn Bucket>) -> bool {
        if self.active_encrypt.get() {
            self.next_encrypt_sources.borrow_mut().push_back(source);
            false
        } else {
            self.encrypt_source.borrow_mut().append_boxed(source);
            self.active_encrypt.set(true);
            true
        }
    }

    /// Called when the active `EncryptBucket` façade is dropped: promotes
    /// the next queued stream (if any) to active with a fresh
    /// `encrypt.pending`, so a pipelined request that follows starts clean.
    pub(crate) fn release_encrypt_source(&self) {
        self.active_encrypt.set(false);
        if let Some(next) = self.next_encrypt_sources.borrow_mut().pop_front() {
            let mut fresh_source = AggregateBucket::new();
            fresh_source.append_boxed(next);
            *self.encrypt_source.borrow_mut() = fresh_source;
            *self.encrypt_pending.borrow_mut() = AggregateBucket::new();
            self.active_encrypt.set(true);
        }
    }

    fn fail(&self, status: ReadStatus) -> (usize, ReadStatus) {
        if let ReadStatus::Error(e) = status {
            self.fatal.set(Some(e));
        }
        (0, status)
    }

    /// Classifies a `process_new_packets` failure per §4.8 step "engine
    /// protocol error": a pending application cert-callback rejection takes
    /// priority, then renegotiation-on-a-pipelined-connection, then the
    /// generic handshake-vs-established split.
    fn fail_protocol(&self, _err: rustls::Error) -> (usize, ReadStatus) {
        if let Some(pending) = self
            .pending_cert_error
            .lock()
            .expect("pending_cert_error mutex poisoned")
            .take()
        {
            self.fatal.set(Some(pending));
            return (0, ReadStatus::Error(pending));
        }

        if self.established.get() && self.pipelining.get() {
            self.fatal.set(Some(ErrorStatus::SslNegotiateInProgress));
            return (0, ReadStatus::Error(ErrorStatus::SslNegotiateInProgress));
        }

        let status = if self.established.get() {
            ErrorStatus::SslCommFailed
        } else {
            ErrorStatus::SslSetupFailed
        };
        self.fatal.set(Some(status));
        (0, ReadStatus::Error(status))
    }

    fn update_established(&self, conn: &ClientConnection) {
        if !conn.is_handshaking() {
            self.established.set(true);
        }
    }

    /// Flushes every TLS record the engine currently wants to emit into
    /// `encrypt.pending`. `BridgeIo::write` cannot itself fail, so this can
    /// only fail if the engine's own framing rejects what it just produced
    /// (not expected in practice, but not ruled out by the type system).
    fn flush_writes(&self, conn: &mut ClientConnection) -> Result<(), ReadStatus> {
        let mut io = BridgeIo { ctx: self };
        while conn.wants_write() {
            conn.write_tls(&mut io)
                .map_err(|e| ReadStatus::Error(status_from_io_error(&e)))?;
        }
        Ok(())
    }

    fn pump_read(&self, conn: &mut ClientConnection) -> PumpOutcome {
        if !conn.wants_read() {
            return PumpOutcome::Ok;
        }
        let mut io = BridgeIo { ctx: self };
        match conn.read_tls(&mut io) {
            Ok(_) => match conn.process_new_packets() {
                Ok(_) => PumpOutcome::Ok,
                Err(e) => PumpOutcome::Protocol(e),
            },
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => PumpOutcome::WouldBlockRead,
            Err(_) => PumpOutcome::Transport(self.crypt_status.get()),
        }
    }

    fn drain_pending(&self, buf: &mut [u8]) -> Option<usize> {
        let (view, _status) = self.encrypt_pending.borrow_mut().read(Some(buf.len()));
        if view.is_empty() {
            None
        } else {
            buf[..view.len()].copy_from_slice(&view);
            Some(view.len())
        }
    }

    fn coalesce_source(&self) -> Bytes {
        let mut source = self.encrypt_source.borrow_mut();
        let (mut vecs, _status) = source.read_iovec(Some(MAX_ENCRYPT_BYTES), MAX_ENCRYPT_VECTORS);
        match vecs.len() {
            0 => Bytes::new(),
            1 => vecs.pop().unwrap(),
            _ => {
                let mut buf = BytesMut::with_capacity(vecs.iter().map(|v| v.len()).sum());
                for v in &vecs {
                    buf.extend_from_slice(v);
                }
                buf.freeze()
            }
        }
    }

    /// `ssl_decrypt` (§4.8): pumps ciphertext from `decrypt.source` through
    /// the engine and returns whatever plaintext falls out.
    pub(crate) fn drive_decrypt(&self, buf: &mut [u8]) -> (usize, ReadStatus) {
        if let Some(fatal) = self.fatal.get() {
            return (0, ReadStatus::Error(fatal));
        }

        let mut conn = self.conn.borrow_mut();

        if let Err(status) = self.flush_writes(&mut conn) {
            drop(conn);
            return self.fail(status);
        }

        match self.pump_read(&mut conn) {
            PumpOutcome::Ok => self.update_established(&conn),
            PumpOutcome::WouldBlockRead => {
                drop(conn);
                return (0, ReadStatus::WouldBlock);
            }
            PumpOutcome::Transport(status) => {
                drop(conn);
                return self.fail(status);
            }
            PumpOutcome::Protocol(e) => {
                drop(conn);
                return self.fail_protocol(e);
            }
        }

        match conn.reader().read(buf) {
            Ok(0) => (0, ReadStatus::EndOfStream),
            Ok(n) => (n, ReadStatus::MoreAvailable),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => (0, ReadStatus::WouldBlock),
            Err(_) => (0, ReadStatus::Error(ErrorStatus::SslCommFailed)),
        }
    }

    /// `ssl_encrypt` (§4.8): drains already-produced ciphertext first,
    /// otherwise pulls plaintext from `encrypt.source`, pushes it through
    /// the engine, and drains whatever ciphertext that produced.
    ///
    /// Critically, anything `flush_writes` produces is handed back to the
    /// caller *before* this attempts a read (§4.8 "produce before pumping
    /// read"): the caller is responsible for actually transmitting
    /// ciphertext over the transport, and a handshake message stuck in
    /// `encrypt.pending` because this function tried (and WouldBlock'd) to
    /// read the peer's reply first would never reach the wire, wedging the
    /// handshake forever.
    pub(crate) fn drive_encrypt(&self, buf: &mut [u8]) -> (usize, ReadStatus) {
        if let Some(fatal) = self.fatal.get() {
            return (0, ReadStatus::Error(fatal));
        }

        if let Some(n) = self.drain_pending(buf) {
            return (n, ReadStatus::MoreAvailable);
        }

        if !self.want_read.get() {
            let coalesced = self.coalesce_source();
            if !coalesced.is_empty() {
                let mut conn = self.conn.borrow_mut();
                if let Err(e) = conn.writer().write_all(&coalesced) {
                    drop(conn);
                    self.encrypt_source.borrow_mut().prepend(SimpleBucket::new(coalesced));
                    log::warn!("bucket_tls: engine rejected plaintext write: {e}");
                    return self.fail(ReadStatus::Error(ErrorStatus::SslCommFailed));
                }
            }
        }

        {
            let mut conn = self.conn.borrow_mut();
            if let Err(status) = self.flush_writes(&mut conn) {
                drop(conn);
                return self.fail(status);
            }
        }

        if let Some(n) = self.drain_pending(buf) {
            self.want_read.set(false);
            return (n, ReadStatus::MoreAvailable);
        }

        let mut conn = self.conn.borrow_mut();
        match self.pump_read(&mut conn) {
            PumpOutcome::Ok => {
                self.update_established(&conn);
                self.want_read.set(false);
            }
            PumpOutcome::WouldBlockRead => {
                drop(conn);
                self.want_read.set(true);
                return (0, ReadStatus::Error(ErrorStatus::WaitForConnection));
            }
            PumpOutcome::Transport(status) => {
                drop(conn);
                return self.fail(status);
            }
            PumpOutcome::Protocol(e) => {
                drop(conn);
                return self.fail_protocol(e);
            }
        }

        // Nothing left to encrypt: the plaintext source is exhausted and
        // the engine has nothing queued to write. The caller has sent
        // everything there is to send.
        let done = self.encrypt_source_is_empty() && !conn.wants_write();
        drop(conn);

        match self.drain_pending(buf) {
            Some(n) => (n, ReadStatus::MoreAvailable),
            None if done => (0, ReadStatus::EndOfStream),
            None => (0, ReadStatus::WouldBlock),
        }
    }

    pub(crate) fn encrypt_source_is_empty(&self) -> bool {
        self.encrypt_source.borrow().is_empty()
    }
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext")
            .field("fatal", &self.fatal.get())
            .field("established", &self.established.get())
            .finish()
    }
}

enum PumpOutcome {
    Ok,
    WouldBlockRead,
    Transport(ReadStatus),
    Protocol(rustls::Error),
}

fn status_from_io_error(e: &io::Error) -> ErrorStatus {
    match e.kind() {
        io::ErrorKind::ConnectionReset | io::ErrorKind::UnexpectedEof => ErrorStatus::TruncatedResponse,
        _ => ErrorStatus::SslCommFailed,
    }
}

/// Bridges the engine's `read_tls`/`write_tls` calls onto the context's
/// aggregates (§4.8 `bridge_read`/`bridge_write`): reads pull ciphertext
/// from `decrypt.source`, writes append to `encrypt.pending`.
struct BridgeIo<'a> {
    ctx: &'a TlsContext,
}

impl Read for BridgeIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (view, status) = self.ctx.decrypt_source.borrow_mut().read(Some(buf.len()));
        self.ctx.crypt_status.set(status);
        if !view.is_empty() {
            buf[..view.len()].copy_from_slice(&view);
            return Ok(view.len());
        }
        match status {
            ReadStatus::EndOfStream => Ok(0),
            ReadStatus::Error(e) => Err(io::Error::new(io::ErrorKind::Other, e.to_string())),
            // `would-block` and the forbidden empty-`more-available` case
            // are both "nothing to read right now" from the engine's
            // perspective (§4.8: "returns -1 and signals retry").
            _ => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

impl Write for BridgeIo<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ctx
            .encrypt_pending
            .borrow_mut()
            .append(SimpleBucket::new(Bytes::copy_from_slice(buf)));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bucket_core::MockBucket;

    #[test]
    fn new_context_starts_handshaking() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        assert!(ctx.is_handshaking());
    }

    #[test]
    fn invalid_server_name_is_rejected() {
        let err = TlsContext::new("not a valid name!", Box::new(MockBucket::new(Vec::new())));
        assert!(err.is_err());
    }

    #[test]
    fn attach_encrypt_source_activates_immediately_when_idle() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        assert!(ctx.encrypt_source_is_empty());
        let became_active = ctx.attach_encrypt_source(Box::new(bucket_core::SimpleBucket::new(
            Bytes::from_static(b"GET / HTTP/1.1\r\n\r\n"),
        )));
        assert!(became_active);
        assert!(!ctx.encrypt_source_is_empty());
    }

    #[test]
    fn second_attach_is_queued_not_active() {
        let ctx = TlsContext::new("example.com", Box::new(MockBucket::new(Vec::new()))).unwrap();
        assert!(ctx.attach_encrypt_source(Box::new(bucket_core::SimpleBucket::new(Bytes::from_static(b"a")))));
        assert!(!ctx.attach_encrypt_source(Box::new(bucket_core::SimpleBucket::new(Bytes::from_static(b"b")))));
    }
}
