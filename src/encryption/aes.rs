//! AES-CBC with PKCS#7 padding, as used by the PDF 1.6+ security handlers.
//!
//! - AES-128: 16-byte key (V=4, R=4)
//! - AES-256: 32-byte key (V=5, R=5/6)

use aes::cipher::block_padding::NoPadding;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes256};

use crate::error::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

fn pad(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    let padding_len = 16 - (data.len() % 16);
    padded.extend(std::iter::repeat_n(padding_len as u8, padding_len));
    padded
}

fn unpad(decrypted: &[u8]) -> Result<Vec<u8>> {
    let Some(&last) = decrypted.last() else {
        return Ok(Vec::new());
    };
    let padding_len = last as usize;
    if padding_len == 0 || padding_len > 16 || padding_len > decrypted.len() {
        return Err(Error::Decode("Invalid PKCS#7 padding".to_string()));
    }
    let data_len = decrypted.len() - padding_len;
    if decrypted[data_len..].iter().any(|&b| b != last) {
        return Err(Error::Decode("Invalid PKCS#7 padding".to_string()));
    }
    Ok(decrypted[..data_len].to_vec())
}

fn check_lengths(key: &[u8], expected_key: usize, iv: &[u8]) -> Result<()> {
    if key.len() != expected_key {
        return Err(Error::Encode(format!(
            "AES key must be {} bytes, got {}",
            expected_key,
            key.len()
        )));
    }
    if iv.len() != 16 {
        return Err(Error::Encode("IV must be 16 bytes".to_string()));
    }
    Ok(())
}

/// Encrypt with AES-128-CBC and PKCS#7 padding.
pub fn aes128_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, 16, iv)?;
    let mut padded = pad(data);
    let len = padded.len();
    Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Encode("AES-128 encryption failed".to_string()))?;
    Ok(padded)
}

/// Encrypt with AES-256-CBC and PKCS#7 padding.
pub fn aes256_encrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, 32, iv)?;
    let mut padded = pad(data);
    let len = padded.len();
    Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<NoPadding>(&mut padded, len)
        .map_err(|_| Error::Encode("AES-256 encryption failed".to_string()))?;
    Ok(padded)
}

/// Decrypt AES-128-CBC data and strip the padding.
pub fn aes128_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, 16, iv)?;
    if !data.len().is_multiple_of(16) {
        return Err(Error::Decode(
            "Encrypted data length must be multiple of 16".to_string(),
        ));
    }
    let mut buffer = data.to_vec();
    let decrypted = Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Decode("AES-128 decryption failed".to_string()))?;
    unpad(decrypted)
}

/// Decrypt AES-256-CBC data and strip the padding.
pub fn aes256_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_lengths(key, 32, iv)?;
    if !data.len().is_multiple_of(16) {
        return Err(Error::Decode(
            "Encrypted data length must be multiple of 16".to_string(),
        ));
    }
    let mut buffer = data.to_vec();
    let decrypted = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|_| Error::Decode("AES-256 decryption failed".to_string()))?;
    unpad(decrypted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aes128_round_trip() {
        let key = [7u8; 16];
        let iv = [1u8; 16];
        let ciphertext = aes128_encrypt(&key, &iv, b"sixteen byte msg").unwrap();
        // A full block of padding is added to block-aligned input.
        assert_eq!(ciphertext.len(), 32);
        assert_eq!(aes128_decrypt(&key, &iv, &ciphertext).unwrap(), b"sixteen byte msg");
    }

    #[test]
    fn test_aes256_round_trip() {
        let key = [9u8; 32];
        let iv = [2u8; 16];
        let ciphertext = aes256_encrypt(&key, &iv, b"hello").unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(aes256_decrypt(&key, &iv, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_wrong_key_length() {
        assert!(aes128_encrypt(&[0u8; 5], &[0u8; 16], b"x").is_err());
        assert!(aes256_encrypt(&[0u8; 16], &[0u8; 16], b"x").is_err());
    }
}
