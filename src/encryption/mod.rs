//! Encryption of strings and streams on save.
//!
//! Key derivation from passwords is not done here: the caller supplies the
//! file key together with the matching `/Encrypt` dictionary, and the
//! writer calls an [`Encryptor`] for every string and stream it emits.
//!
//! - RC4 (40-bit and 128-bit) for PDF 1.4-1.5
//! - AES-128 and AES-256 in CBC mode for PDF 1.6+

use std::rc::Rc;

use crate::error::Result;
use crate::object::PdfDictionary;

mod aes;
mod rc4;
mod write_handler;

pub use write_handler::StandardEncryptor;

/// Encryption algorithm of the standard security handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// RC4 with 40-bit key (V=1, R=2)
    Rc4_40,
    /// RC4 with 128-bit key (V=2, R=3)
    Rc4_128,
    /// AES with 128-bit key in CBC mode (V=4, R=4)
    Aes128,
    /// AES with 256-bit key in CBC mode (V=5, R=5/6)
    Aes256,
}

impl Algorithm {
    /// Key length in bytes.
    pub fn key_length(&self) -> usize {
        match self {
            Algorithm::Rc4_40 => 5,
            Algorithm::Rc4_128 | Algorithm::Aes128 => 16,
            Algorithm::Aes256 => 32,
        }
    }

    /// Check if this is an AES algorithm.
    pub fn is_aes(&self) -> bool {
        matches!(self, Algorithm::Aes128 | Algorithm::Aes256)
    }

    /// Security handler revision.
    pub fn revision(&self) -> u32 {
        match self {
            Algorithm::Rc4_40 => 2,
            Algorithm::Rc4_128 => 3,
            Algorithm::Aes128 => 4,
            Algorithm::Aes256 => 6,
        }
    }
}

/// What kind of data is being encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// A string object
    String,
    /// Stream data
    Stream,
}

/// Encrypts the bytes of one string or stream of one indirect object.
pub trait Encryptor {
    /// Encrypt `data` belonging to object `obj_num` / `gen_num`.
    fn encrypt(&self, data: &[u8], obj_num: u32, gen_num: u16, kind: DataKind) -> Result<Vec<u8>>;
}

/// Encryptor plus the `/Encrypt` dictionary written (in clear) to the trailer.
#[derive(Clone)]
pub struct EncryptionSettings {
    /// Per-object encryptor
    pub encryptor: Rc<dyn Encryptor>,
    /// Dictionary stored under `/Encrypt`
    pub dictionary: PdfDictionary,
}

impl EncryptionSettings {
    /// Bundle an encryptor with its dictionary.
    pub fn new(encryptor: Rc<dyn Encryptor>, dictionary: PdfDictionary) -> Self {
        Self {
            encryptor,
            dictionary,
        }
    }
}

impl std::fmt::Debug for EncryptionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionSettings")
            .field("dictionary", &self.dictionary)
            .finish_non_exhaustive()
    }
}
