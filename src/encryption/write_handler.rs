//! Standard security handler encryption for writing.

use md5::{Digest, Md5};

use super::aes;
use super::rc4;
use super::{Algorithm, DataKind, Encryptor};
use crate::error::{Error, Result};

/// Encrypts objects with a caller-supplied file key.
pub struct StandardEncryptor {
    encryption_key: Vec<u8>,
    algorithm: Algorithm,
}

impl StandardEncryptor {
    /// Create an encryptor from an already derived file key.
    pub fn from_key(encryption_key: Vec<u8>, algorithm: Algorithm) -> Result<Self> {
        let expected = algorithm.key_length();
        let valid = if algorithm.is_aes() {
            encryption_key.len() == expected
        } else {
            (5..=16).contains(&encryption_key.len())
        };
        if !valid {
            return Err(Error::Encode(format!(
                "{:?} needs a {}-byte key, got {} bytes",
                algorithm,
                expected,
                encryption_key.len()
            )));
        }
        Ok(Self {
            encryption_key,
            algorithm,
        })
    }

    /// The encryption algorithm.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Object-specific key (Algorithm 1). AES-256 uses the file key directly.
    fn derive_object_key(&self, obj_num: u32, gen_num: u16) -> Vec<u8> {
        if self.algorithm == Algorithm::Aes256 {
            return self.encryption_key.clone();
        }

        let mut hasher = Md5::new();
        hasher.update(&self.encryption_key);
        hasher.update(&obj_num.to_le_bytes()[..3]);
        hasher.update(gen_num.to_le_bytes());
        if self.algorithm.is_aes() {
            hasher.update(b"sAlT");
        }
        let hash = hasher.finalize();

        let key_length = (self.encryption_key.len() + 5).min(16);
        hash[..key_length].to_vec()
    }

    /// Reverse of [`Encryptor::encrypt`]; AES input starts with its IV.
    pub fn decrypt(&self, data: &[u8], obj_num: u32, gen_num: u16) -> Result<Vec<u8>> {
        let key = self.derive_object_key(obj_num, gen_num);
        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => Ok(rc4::rc4_crypt(&key, data)),
            Algorithm::Aes128 | Algorithm::Aes256 => {
                if data.len() < 16 {
                    return Err(Error::Decode("AES data shorter than its IV".to_string()));
                }
                let (iv, body) = data.split_at(16);
                if self.algorithm == Algorithm::Aes128 {
                    aes::aes128_decrypt(&key, iv, body)
                } else {
                    aes::aes256_decrypt(&key, iv, body)
                }
            },
        }
    }

    /// Random 16-byte IV: MD5 of a v4 UUID and the current time.
    fn generate_iv() -> [u8; 16] {
        let mut hasher = Md5::new();
        hasher.update(uuid::Uuid::new_v4().as_bytes());
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        hasher.update(now.as_nanos().to_le_bytes());
        hasher.finalize().into()
    }
}

impl Encryptor for StandardEncryptor {
    fn encrypt(&self, data: &[u8], obj_num: u32, gen_num: u16, kind: DataKind) -> Result<Vec<u8>> {
        let key = self.derive_object_key(obj_num, gen_num);
        log::trace!("Encrypting {:?} of object {} {} ({} bytes)", kind, obj_num, gen_num, data.len());
        match self.algorithm {
            Algorithm::Rc4_40 | Algorithm::Rc4_128 => Ok(rc4::rc4_crypt(&key, data)),
            Algorithm::Aes128 | Algorithm::Aes256 => {
                let iv = Self::generate_iv();
                let ciphertext = if self.algorithm == Algorithm::Aes128 {
                    aes::aes128_encrypt(&key, &iv, data)?
                } else {
                    aes::aes256_encrypt(&key, &iv, data)?
                };
                let mut result = iv.to_vec();
                result.extend(ciphertext);
                Ok(result)
            },
        }
    }
}
