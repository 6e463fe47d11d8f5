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

/// The opaque shared configuration buckets receive via
/// [`crate::Bucket::set_config`] (§4.1, §6). Kept as a plain value type
/// rather than a trait object, the way `hbak_common::config::NodeConfig`
/// is a plain serializable value object passed around by the call site.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BucketConfig {
    /// Whether the connection may carry pipelined requests. When `true`,
    /// `bucket_tls` installs its renegotiation-detecting state callback,
    /// since renegotiation on a pipelined connection would corrupt framing
    /// (§4.8).
    pub connection_pipelining: bool,
}

impl BucketConfig {
    /// Returns a config with pipelining disabled (the conservative default).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter mirroring the `"Y"`/`"N"` configuration key
    /// from §6.
    pub fn with_connection_pipelining(mut self, enabled: bool) -> Self {
        self.connection_pipelining = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disables_pipelining() {
        assert!(!BucketConfig::new().connection_pipelining);
    }

    #[test]
    fn builder_enables_pipelining() {
        let cfg = BucketConfig::new().with_connection_pipelining(true);
        assert!(cfg.connection_pipelining);
    }
}
