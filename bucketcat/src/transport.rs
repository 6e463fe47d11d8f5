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

use std::io::Write;
use std::net::TcpStream;

use bucket_core::{AggregateBucket, Bucket, Databuf, ErrorStatus, ReadStatus, ResponseBucket};
use bucket_tls::{CertCallback, CertProblems, DecryptBucket, EncryptBucket, TlsContext};
use log::{debug, warn};

use crate::error::{Error, Result};

/// The response half of either transport, boxed so `main` doesn't need to
/// name the `ResponseBucket<Databuf>` vs. `ResponseBucket<DecryptBucket>`
/// type depending on scheme.
pub type BoxedResponse = ResponseBucket<Box<dyn Bucket>>;

/// Drives `request` across a plain-TCP connection to `host:port` (§4.10,
/// the `http://` path): writes the request bytes to the socket, then reads
/// the response back through the same socket wrapped as a `Databuf`.
///
/// Deliberately uses a blocking `TcpStream`: the "non-blocking I/O" the
/// bucket contract is built around (§5) is a property of the *library*, not
/// of every caller — `bucketcat` has no event loop to yield to (the
/// socket/event loop is out of scope per §1), so it drives the pipeline the
/// simplest way a single sequential request/response exchange allows.
pub fn fetch_plain(host: &str, port: u16, mut request: AggregateBucket) -> Result<BoxedResponse> {
    let stream = TcpStream::connect((host, port))?;
    let write_stream = stream.try_clone()?;
    send_all(&mut request, write_stream)?;

    let response_source: Box<dyn Bucket> = Box::new(Databuf::from_io(stream));
    Ok(ResponseBucket::new(response_source))
}

/// Drives `request` across a TLS connection to `host:port` (§4.10, the
/// `https://` path): pumps `bucket_tls`'s encrypt façade to push request
/// bytes (and, interleaved, the handshake) out over the socket, then hands
/// the decrypt façade to a `ResponseBucket` to parse the plaintext response.
pub fn fetch_tls(host: &str, port: u16, request: AggregateBucket, insecure: bool) -> Result<BoxedResponse> {
    let stream = TcpStream::connect((host, port))?;
    let write_stream = stream.try_clone()?;

    let callback: Option<CertCallback> = if insecure {
        Some(std::sync::Arc::new(|problems: CertProblems, _chain| {
            warn!("bucketcat: ignoring certificate problems {problems:?} (--insecure)");
            true
        }))
    } else {
        None
    };

    let decrypt_source: Box<dyn Bucket> = Box::new(Databuf::from_io(stream));
    let ctx = TlsContext::with_callback(host, decrypt_source, callback)?;

    let mut encrypt = EncryptBucket::new(ctx.clone(), Box::new(request));
    drive_encrypt_to_completion(&mut encrypt, write_stream)?;

    let decrypt: Box<dyn Bucket> = Box::new(DecryptBucket::new(ctx));
    Ok(ResponseBucket::new(decrypt))
}

/// Drains `source` (the request-side aggregate) by writing every byte it
/// yields to `sink`, the plain-HTTP equivalent of `drive_encrypt_to_completion`.
fn send_all(source: &mut AggregateBucket, mut sink: impl Write) -> Result<()> {
    loop {
        let (view, status) = source.read(None);
        if !view.is_empty() {
            sink.write_all(&view)?;
        }
        match status {
            ReadStatus::MoreAvailable => continue,
            ReadStatus::EndOfStream => return Ok(()),
            ReadStatus::WouldBlock => continue,
            ReadStatus::Error(e) => return Err(Error::Response(e)),
        }
    }
}

/// Pumps `encrypt` (which internally drives the TLS handshake and the
/// request body through rustls, per `bucket_tls::EncryptBucket`) until the
/// request side of the connection is fully sent, forwarding every byte of
/// produced ciphertext to `sink`.
fn drive_encrypt_to_completion(encrypt: &mut EncryptBucket, mut sink: impl Write) -> Result<()> {
    loop {
        let (view, status) = encrypt.read(None);
        if !view.is_empty() {
            sink.write_all(&view)?;
        }
        match status {
            ReadStatus::MoreAvailable => continue,
            ReadStatus::EndOfStream => {
                debug!("bucketcat: TLS request fully transmitted");
                return Ok(());
            }
            // The blocking socket underlying `decrypt.source` means a real
            // stall (waiting on the peer) simply blocks inside the next
            // call instead of surfacing here; this arm only fires for the
            // transient "nothing queued yet, but the plaintext source isn't
            // exhausted either" case, which resolves by looping back in.
            // Once the plaintext side truly runs dry, `drive_encrypt`
            // reports `EndOfStream` instead, so this loop always ends.
            ReadStatus::WouldBlock => continue,
            ReadStatus::Error(ErrorStatus::WaitForConnection) => continue,
            ReadStatus::Error(e) => return Err(Error::Response(e)),
        }
    }
}
