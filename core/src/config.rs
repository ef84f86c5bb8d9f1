// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Name/host/port resolution and the small set of runtime tunables the
//! original exposes as constants (`libmx.h`'s hard-coded timeouts), pulled
//! out into a `Config` struct per the teacher's `P2PConfig`
//! (`p2p::types::P2PConfig`) rather than left as magic numbers.

use crate::error::Error;
use std::env;
use std::time::Duration;

/// Lowest port `derive_port` will ever produce.
pub const MIN_PORT: u32 = 1024;
/// Number of distinct ports in the derivable range (`65535 - 1024 + 1`).
pub const PORT_RANGE: u32 = 64512;
/// Per-byte multiplier in the name→port hash.
pub const PORT_HASH_MULTIPLIER: u32 = 307;

#[derive(Debug, Clone)]
pub struct Config {
    /// Deadline for `HelloReply` during client boot.
    pub hello_timeout: Duration,
    /// Deadline for `RegisterReply` during `Register`.
    pub register_timeout: Duration,
    /// Backlog passed to the listening socket.
    pub listen_backlog: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hello_timeout: Duration::from_secs(5),
            register_timeout: Duration::from_secs(5),
            listen_backlog: 128,
        }
    }
}

/// `port(name) = 1024 + (sum of byte * 307) mod 64512`, computed over the
/// UTF-8 bytes of `name`. Pure and deterministic: two names collide iff
/// their character sums agree modulo 64512.
pub fn derive_port(name: &str) -> u16 {
    let sum: u32 = name
        .as_bytes()
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(b as u32 * PORT_HASH_MULTIPLIER));
    (MIN_PORT + (sum % PORT_RANGE)) as u16
}

/// Exchange name: `arg` if non-empty, else `$MX_NAME`, else `$USER`, else a
/// configuration error.
pub fn resolve_name(arg: Option<&str>) -> Result<String, Error> {
    if let Some(name) = arg.filter(|s| !s.is_empty()) {
        return Ok(name.to_string());
    }
    if let Ok(name) = env::var("MX_NAME") {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    if let Ok(name) = env::var("USER") {
        if !name.is_empty() {
            return Ok(name);
        }
    }
    Err(Error::Configuration(
        "could not determine exchange name: pass one explicitly, or set MX_NAME or USER".into(),
    ))
}

/// Master host: `arg` if non-empty, else `$MX_HOST`, else `"localhost"`.
pub fn resolve_host(arg: Option<&str>) -> String {
    if let Some(host) = arg.filter(|s| !s.is_empty()) {
        return host.to_string();
    }
    if let Ok(host) = env::var("MX_HOST") {
        if !host.is_empty() {
            return host;
        }
    }
    "localhost".to_string()
}

/// Local component name: required for clients, defaults to `"master"` for
/// masters.
pub fn resolve_component_name(arg: Option<&str>, is_master: bool) -> Result<String, Error> {
    if let Some(name) = arg.filter(|s| !s.is_empty()) {
        return Ok(name.to_string());
    }
    if is_master {
        return Ok("master".to_string());
    }
    Err(Error::Configuration(
        "a component name is required when running as a client".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_derivation_matches_s5() {
        // port("T1") = 1024 + ((84+49)*307) mod 64512 = 41855
        assert_eq!(derive_port("T1"), 41855);
    }

    #[test]
    fn component_name_defaults_to_master() {
        assert_eq!(resolve_component_name(None, true).unwrap(), "master");
        assert!(resolve_component_name(None, false).is_err());
    }
}
