//! World channel rolling-key cipher
//!
//! Each direction keeps its own 8-byte key. Every byte is XORed with the
//! key byte at `i & 7` and with the previous ciphertext byte, so a packet
//! chains through itself. After a packet of `n` bytes has been processed the
//! first four key bytes, read as a little-endian u32, are advanced by `n`.
//! Both peers must therefore process packets in exactly the same order; a
//! lost or reordered packet desynchronizes the link for good.

use std::fmt;

use rand::Rng;

use crate::error::CryptoError;

/// Size of one direction's key
pub const WORLD_KEY_SIZE: usize = 8;

/// Constant tail of every generated world key
const KEY_TAIL: [u8; 4] = [0xa1, 0x6c, 0x54, 0x87];

/// Generate a fresh world link key: four random bytes plus the constant tail
pub fn generate_world_key() -> [u8; WORLD_KEY_SIZE] {
    let mut key = [0u8; WORLD_KEY_SIZE];
    rand::thread_rng().fill(&mut key[..4]);
    key[4..].copy_from_slice(&KEY_TAIL);
    key
}

/// One direction's mutable key state
#[derive(PartialEq, Eq)]
struct RollingKey([u8; WORLD_KEY_SIZE]);

impl RollingKey {
    fn advance(&mut self, processed: usize) {
        let head = u32::from_le_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        let head = head.wrapping_add(processed as u32);
        self.0[..4].copy_from_slice(&head.to_le_bytes());
    }

    fn encrypt(&mut self, buf: &mut [u8]) {
        let mut prev = 0u8;
        for (i, byte) in buf.iter_mut().enumerate() {
            prev = *byte ^ self.0[i & 7] ^ prev;
            *byte = prev;
        }
        self.advance(buf.len());
    }

    fn decrypt(&mut self, buf: &mut [u8]) {
        let mut prev = 0u8;
        for (i, byte) in buf.iter_mut().enumerate() {
            let cipher = *byte;
            *byte = cipher ^ self.0[i & 7] ^ prev;
            prev = cipher;
        }
        self.advance(buf.len());
    }
}

/// Inbound and outbound key state for one world link. Never shared between links.
#[derive(Default)]
pub struct WorldCipher {
    inbound: Option<RollingKey>,
    outbound: Option<RollingKey>,
}

impl WorldCipher {
    /// Create an unkeyed cipher
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed both directions from the exchanged key
    pub fn initialize(&mut self, key: &[u8]) -> Result<(), CryptoError> {
        let key: [u8; WORLD_KEY_SIZE] = key
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(key.len()))?;
        self.inbound = Some(RollingKey(key));
        self.outbound = Some(RollingKey(key));
        Ok(())
    }

    /// Whether the link has been keyed
    pub fn has_key(&self) -> bool {
        self.inbound.is_some() && self.outbound.is_some()
    }

    /// Encrypt an outgoing buffer in place and advance the outbound key
    pub fn encrypt(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        let key = self.outbound.as_mut().ok_or(CryptoError::NotInitialized)?;
        key.encrypt(buf);
        Ok(())
    }

    /// Decrypt an incoming buffer in place and advance the inbound key
    pub fn decrypt(&mut self, buf: &mut [u8]) -> Result<(), CryptoError> {
        let key = self.inbound.as_mut().ok_or(CryptoError::NotInitialized)?;
        key.decrypt(buf);
        Ok(())
    }
}

impl fmt::Debug for WorldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldCipher")
            .field("has_key", &self.has_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEY: [u8; 8] = [0x11, 0x22, 0x33, 0x44, 0xa1, 0x6c, 0x54, 0x87];

    fn keyed() -> WorldCipher {
        let mut cipher = WorldCipher::new();
        cipher.initialize(&KEY).unwrap();
        cipher
    }

    fn messages() -> Vec<Vec<u8>> {
        vec![
            b"register".to_vec(),
            vec![0x01, 0x00, 0x10],
            b"status update with more bytes".to_vec(),
            vec![0xff; 12],
        ]
    }

    #[test]
    fn test_in_order_round_trip() {
        let mut sender = keyed();
        let mut receiver = keyed();

        for message in messages() {
            let mut buf = message.clone();
            sender.encrypt(&mut buf).unwrap();
            assert_ne!(buf, message);
            receiver.decrypt(&mut buf).unwrap();
            assert_eq!(buf, message);
        }
    }

    #[test]
    fn test_out_of_order_does_not_reproduce() {
        let mut sender = keyed();
        let originals = messages();
        let encrypted: Vec<Vec<u8>> = originals
            .iter()
            .map(|m| {
                let mut buf = m.clone();
                sender.encrypt(&mut buf).unwrap();
                buf
            })
            .collect();

        let mut receiver = keyed();
        let order = [1usize, 0, 3, 2];
        let decrypted: Vec<Vec<u8>> = order
            .iter()
            .map(|&i| {
                let mut buf = encrypted[i].clone();
                receiver.decrypt(&mut buf).unwrap();
                buf
            })
            .collect();

        let reordered: Vec<Vec<u8>> = order.iter().map(|&i| originals[i].clone()).collect();
        assert_ne!(decrypted, reordered);
        assert_ne!(decrypted[0], originals[1]);
    }

    #[test]
    fn test_same_plaintext_differs_each_time() {
        let mut cipher = keyed();
        let mut first = b"ping".to_vec();
        let mut second = b"ping".to_vec();
        cipher.encrypt(&mut first).unwrap();
        cipher.encrypt(&mut second).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_key_advances_by_length() {
        let mut key = RollingKey(KEY);
        key.advance(10);
        assert_eq!(key.0, [0x1b, 0x22, 0x33, 0x44, 0xa1, 0x6c, 0x54, 0x87]);

        let mut key = RollingKey([0xff, 0xff, 0xff, 0xff, 1, 2, 3, 4]);
        key.advance(2);
        assert_eq!(key.0, [0x01, 0x00, 0x00, 0x00, 1, 2, 3, 4]);
    }

    #[test]
    fn test_directions_are_independent() {
        let mut cipher = keyed();
        let mut out = b"outbound".to_vec();
        cipher.encrypt(&mut out).unwrap();

        // Inbound key is still fresh, so a peer encryption decrypts cleanly
        let mut peer = keyed();
        let mut incoming = b"inbound".to_vec();
        peer.encrypt(&mut incoming).unwrap();
        cipher.decrypt(&mut incoming).unwrap();
        assert_eq!(incoming, b"inbound".to_vec());
    }

    #[test]
    fn test_uninitialized() {
        let mut cipher = WorldCipher::new();
        assert!(!cipher.has_key());
        assert_eq!(
            cipher.encrypt(&mut [1, 2, 3]),
            Err(CryptoError::NotInitialized)
        );
        assert_eq!(
            cipher.initialize(&[1, 2, 3]),
            Err(CryptoError::InvalidKeyLength(3))
        );
    }

    #[test]
    fn test_generated_key_shape() {
        let key = generate_world_key();
        assert_eq!(&key[4..], &KEY_TAIL);
    }
}
