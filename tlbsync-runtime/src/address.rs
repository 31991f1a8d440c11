//! Standard internal addresses in user-friendly and raw text form.
//!
//! Friendly form: URL-safe base64 of 36 bytes
//! `flags | workchain | hash[32] | crc16-xmodem (big endian)`.
//! Raw form: `<workchain>:<64 hex digits>`.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use crc::{Crc, CRC_16_XMODEM};

use crate::error::CodecError;

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

const FLAG_BOUNCEABLE: u8 = 0x11;
const FLAG_NON_BOUNCEABLE: u8 = 0x51;
const FLAG_TESTNET: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdAddress {
    pub workchain: i8,
    pub hash: [u8; 32],
}

impl StdAddress {
    /// Bounceable, mainnet, URL-safe.
    pub fn to_friendly(&self) -> String {
        let mut raw = Vec::with_capacity(36);
        raw.push(FLAG_BOUNCEABLE);
        raw.push(self.workchain as u8);
        raw.extend_from_slice(&self.hash);
        raw.extend_from_slice(&XMODEM.checksum(&raw).to_be_bytes());
        URL_SAFE.encode(raw)
    }

    pub fn to_raw(&self) -> String {
        format!("{}:{}", self.workchain, hex::encode(self.hash))
    }

    fn parse_friendly(text: &str) -> Result<Self, CodecError> {
        let bytes = URL_SAFE
            .decode(text)
            .or_else(|_| STANDARD.decode(text))
            .map_err(|_| CodecError::Address(format!("`{text}` is not base64")))?;
        if bytes.len() != 36 {
            return Err(CodecError::Address(format!(
                "`{text}` decodes to {} bytes, expected 36",
                bytes.len()
            )));
        }
        let flags = bytes[0] & !FLAG_TESTNET;
        if flags != FLAG_BOUNCEABLE && flags != FLAG_NON_BOUNCEABLE {
            return Err(CodecError::Address(format!("`{text}` has unknown flags {:#04x}", bytes[0])));
        }
        let expected = XMODEM.checksum(&bytes[..34]);
        let stored = u16::from_be_bytes([bytes[34], bytes[35]]);
        if expected != stored {
            return Err(CodecError::Address(format!("`{text}` has a bad checksum")));
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[2..34]);
        Ok(StdAddress {
            workchain: bytes[1] as i8,
            hash,
        })
    }

    fn parse_raw(text: &str) -> Result<Self, CodecError> {
        let (wc, digits) = text
            .split_once(':')
            .ok_or_else(|| CodecError::Address(format!("`{text}` is not `workchain:hex`")))?;
        let workchain: i8 = wc
            .parse()
            .map_err(|_| CodecError::Address(format!("workchain `{wc}` is not an 8-bit integer")))?;
        let bytes = hex::decode(digits).map_err(|e| CodecError::Address(format!("`{digits}`: {e}")))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CodecError::Address("account id must be 32 bytes".to_string()))?;
        Ok(StdAddress { workchain, hash })
    }
}

impl FromStr for StdAddress {
    type Err = CodecError;

    /// Friendly (bounceable or not, either base64 alphabet) or raw form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.contains(':') {
            Self::parse_raw(s)
        } else {
            Self::parse_friendly(s)
        }
    }
}

impl fmt::Display for StdAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_friendly())
    }
}
