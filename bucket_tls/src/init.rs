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

use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use log::debug;

const UNINIT: u8 = 0;
const BUSY: u8 = 1;
const DONE: u8 = 2;

static STATE: AtomicU8 = AtomicU8::new(UNINIT);

/// The interval spin-waiters sleep for between polls of [`STATE`], matching
/// §5's "spin-sleep in millisecond-class units" requirement.
const SPIN_SLEEP: Duration = Duration::from_millis(1);

/// Ensures the process-wide rustls `CryptoProvider` is installed exactly
/// once, via the three-state atomic `{uninitialized, busy, done}` described
/// in §5 and §9. Every [`crate::TlsContext::new`] call runs this first.
///
/// Deliberately does not rely on `CryptoProvider::install_default`'s own
/// idempotence: that silently no-ops on a second caller and gives no way to
/// observe the "a concurrent caller is still initializing" busy window the
/// specification calls out explicitly.
pub fn ensure_global_init() {
    loop {
        match STATE.compare_exchange(UNINIT, BUSY, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => {
                debug!("bucket_tls: installing process-wide rustls CryptoProvider");
                // A second, concurrent call to `install_default` from outside
                // this module (e.g. another crate in the same process) would
                // return `Err` harmlessly; we only care that *some* default
                // provider ends up installed before we proceed.
                let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
                STATE.store(DONE, Ordering::Release);
                return;
            }
            Err(BUSY) => {
                thread::sleep(SPIN_SLEEP);
                continue;
            }
            Err(DONE) => return,
            Err(_) => unreachable!("STATE only ever holds UNINIT, BUSY, or DONE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_idempotent() {
        ensure_global_init();
        ensure_global_init();
        assert_eq!(STATE.load(Ordering::Acquire), DONE);
    }
}
