//! Login channel block cipher
//!
//! Player traffic is encrypted with Blowfish (big-endian block order) keyed
//! from configuration. Plaintext is zero-padded up to the next 8-byte block
//! boundary before encryption and decryption hands back the padded buffer;
//! fixed-layout packet decoders simply ignore the trailing zeros.
//!
//! Until [`LoginCipher::initialize`] is called the cipher is in clear-text
//! mode, which is only used for the very first handshake packet.

use std::fmt;

use blowfish::cipher::generic_array::GenericArray;
use blowfish::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use blowfish::Blowfish;

use crate::error::CryptoError;

/// Blowfish block size in bytes
pub const BLOCK_SIZE: usize = 8;

/// Static login key shipped with the classic client
pub const DEFAULT_LOGIN_KEY: &[u8] = b"[;'.]94-31==-%&@!^+]\0";

/// Blowfish state for one player connection
#[derive(Default)]
pub struct LoginCipher {
    cipher: Option<Blowfish>,
}

impl LoginCipher {
    /// Create a cipher in clear-text mode
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the cipher. Blowfish accepts keys of 4 to 56 bytes.
    pub fn initialize(&mut self, key: &[u8]) -> Result<(), CryptoError> {
        let cipher: Blowfish = Blowfish::new_from_slice(key)
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        self.cipher = Some(cipher);
        Ok(())
    }

    /// Whether a key has been installed
    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Encrypt a buffer, zero-padding it to a block boundary.
    ///
    /// In clear-text mode the input is returned unchanged.
    pub fn encrypt(&self, data: &[u8]) -> Vec<u8> {
        let Some(cipher) = &self.cipher else {
            return data.to_vec();
        };

        let mut out = pad_to_block(data);
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        out
    }

    /// Decrypt a buffer whose length must be a whole number of blocks.
    ///
    /// The padding added by the sender is left in place.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let Some(cipher) = &self.cipher else {
            return Ok(data.to_vec());
        };

        if data.len() % BLOCK_SIZE != 0 {
            return Err(CryptoError::UnalignedCiphertext(data.len()));
        }

        let mut out = data.to_vec();
        for block in out.chunks_exact_mut(BLOCK_SIZE) {
            cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(out)
    }
}

impl fmt::Debug for LoginCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginCipher")
            .field("has_key", &self.has_key())
            .finish()
    }
}

/// Zero-pad a buffer up to the next block boundary
pub fn pad_to_block(data: &[u8]) -> Vec<u8> {
    let padded_len = data.len().div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
    let mut out = Vec::with_capacity(padded_len);
    out.extend_from_slice(data);
    out.resize(padded_len, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keyed() -> LoginCipher {
        let mut cipher = LoginCipher::new();
        cipher.initialize(DEFAULT_LOGIN_KEY).unwrap();
        cipher
    }

    #[test]
    fn test_known_vector() {
        let mut cipher = LoginCipher::new();
        cipher.initialize(&[0u8; 8]).unwrap();

        let encrypted = cipher.encrypt(&[0u8; 8]);
        assert_eq!(
            encrypted,
            vec![0x4e, 0xf9, 0x97, 0x45, 0x61, 0x98, 0xdd, 0x78]
        );
    }

    #[test]
    fn test_clear_text_mode() {
        let cipher = LoginCipher::new();
        assert!(!cipher.has_key());
        assert_eq!(cipher.encrypt(&[1, 2, 3]), vec![1, 2, 3]);
        assert_eq!(cipher.decrypt(&[1, 2, 3]), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn test_decrypt_returns_padded_plaintext() {
        let cipher = keyed();
        assert!(cipher.has_key());

        for len in [1usize, 7, 8, 9, 16, 23] {
            let message: Vec<u8> = (0..len as u8).map(|b| b.wrapping_mul(31)).collect();
            let encrypted = cipher.encrypt(&message);
            assert_eq!(encrypted.len() % BLOCK_SIZE, 0);
            assert_ne!(&encrypted[..len], &message[..]);

            let decrypted = cipher.decrypt(&encrypted).unwrap();
            assert_eq!(decrypted, pad_to_block(&message));
        }
    }

    #[test]
    fn test_unaligned_ciphertext_rejected() {
        let cipher = keyed();
        assert_eq!(
            cipher.decrypt(&[0u8; 13]),
            Err(CryptoError::UnalignedCiphertext(13))
        );
    }

    #[test]
    fn test_invalid_key_length() {
        let mut cipher = LoginCipher::new();
        assert_eq!(
            cipher.initialize(&[1, 2, 3]),
            Err(CryptoError::InvalidKeyLength(3))
        );
        assert_eq!(
            cipher.initialize(&[0u8; 57]),
            Err(CryptoError::InvalidKeyLength(57))
        );
        assert!(!cipher.has_key());
    }

    #[test]
    fn test_pad_to_block() {
        assert_eq!(pad_to_block(&[]).len(), 0);
        assert_eq!(pad_to_block(&[1]), vec![1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(pad_to_block(&[7; 8]).len(), 8);
        assert_eq!(pad_to_block(&[7; 9]).len(), 16);
    }
}
