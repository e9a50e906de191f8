// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deterministic values derived from an application name.

use sha2::{Digest, Sha256};

/// Prefix shared by every generated asset prefix.
pub const ASSET_PREFIX_PREFIX: &str = "vc-ap-";

const PORT_RANGE_START: u16 = 3000;
const PORT_RANGE_SIZE: u32 = 5000;

/// Stable 6 character digest of an application name.
pub fn hash_application_name(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    hex::encode(&digest[..3])
}

/// Asset prefix used when an application does not declare one.
pub fn generate_asset_prefix(name: &str) -> String {
    format!("{ASSET_PREFIX_PREFIX}{}", hash_application_name(name))
}

/// Default local development port for an application.
pub fn generate_port(name: &str) -> u16 {
    let digest = Sha256::digest(name.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    PORT_RANGE_START + (value % PORT_RANGE_SIZE) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable_and_short() {
        let first = hash_application_name("docs");
        assert_eq!(first.len(), 6);
        assert_eq!(first, hash_application_name("docs"));
        assert_ne!(first, hash_application_name("blog"));
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_asset_prefix_format() {
        let prefix = generate_asset_prefix("docs");
        assert!(prefix.starts_with("vc-ap-"));
        assert_eq!(prefix.len(), "vc-ap-".len() + 6);
    }

    #[test]
    fn test_port_in_range() {
        for name in ["docs", "web", "marketing", "a-really-long-application-name"] {
            let port = generate_port(name);
            assert!((3000..8000).contains(&port), "{name} -> {port}");
            assert_eq!(port, generate_port(name));
        }
    }
}
