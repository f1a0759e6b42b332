//! Per-instance configuration. Wire-format knobs that both peers must agree
//! on (byte order, id width) are Cargo features; everything sized at runtime
//! lives here and can be loaded from TOML.

use crate::crypto::XorCipher;
use crate::error::Result;
use serde_derive::{Deserialize, Serialize};

/// Largest datagram the library will send or accept.
pub const DEFAULT_MAX_PACKET_SIZE: usize = 4096;

/// Largest stream message the library will accept.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4096;

/// Default multiplexer capacity, wakeup descriptor included.
pub const DEFAULT_MAX_RESOURCE_COUNT: usize = 1024;

/// Channel tuning shared by the stream and datagram messaging interfaces.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum datagram size, CRC trailer included.
    pub max_packet_size: usize,
    /// Maximum stream payload size accepted from a peer.
    pub max_message_size: usize,
    /// Whether datagrams carry a CRC32 trailer.
    pub crc: bool,
}

impl Default for ChannelConfig {
    fn default() -> ChannelConfig {
        ChannelConfig {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            crc: true,
        }
    }
}

impl ChannelConfig {
    pub fn from_toml_str(toml: &str) -> ::std::result::Result<ChannelConfig, serdeconv::Error> {
        serdeconv::from_toml_str(toml)
    }
}

/// Cipher key material as it appears in configuration files.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CipherConfig {
    /// Base64-encoded key bytes.
    pub key: String,
}

impl CipherConfig {
    pub fn from_toml_str(toml: &str) -> ::std::result::Result<CipherConfig, serdeconv::Error> {
        serdeconv::from_toml_str(toml)
    }

    /// Builds the cipher this configuration describes.
    pub fn build(&self) -> Result<XorCipher> {
        XorCipher::from_base64(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ChannelConfig::default();

        assert_eq!(config.max_packet_size, 4096);
        assert_eq!(config.max_message_size, 4096);
        assert!(config.crc);
    }

    #[test]
    fn test_channel_config_from_toml() {
        let config = ChannelConfig::from_toml_str(
            r#"
max_packet_size = 1500
crc = false
"#,
        )
        .unwrap();

        assert_eq!(config.max_packet_size, 1500);
        assert_eq!(config.max_message_size, DEFAULT_MAX_MESSAGE_SIZE);
        assert!(!config.crc);
    }

    #[test]
    fn test_cipher_config_builds() {
        let config = CipherConfig {
            key: base64::encode(&[7u8; 16]),
        };

        let cipher = config.build().unwrap();
        assert_eq!(cipher.key(), vec![7u8; 16]);
    }

    #[test]
    fn test_cipher_config_from_toml() {
        let toml = format!("key = \"{}\"", base64::encode(b"0123456789abcdef"));
        let config = CipherConfig::from_toml_str(&toml).unwrap();

        assert_eq!(config.build().unwrap().key(), b"0123456789abcdef".to_vec());
    }
}
