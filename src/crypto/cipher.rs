/// CBC-mode block encryption with PKCS#7 padding.
///
/// Covers the two payload ciphers used by archives and deliveries:
/// 3DES (EDE3) and AES-128/256. Decryption pads and unpads in place inside a
/// [`SensitiveVec`], so no intermediate plaintext buffer escapes zeroization.
use aes::{Aes128, Aes256};
use cbc::cipher::{block_padding::Pkcs7, BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::TdesEde3;

use crate::crypto::params::PayloadAlgorithm;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::CryptoError;

/// Encrypt `plaintext` under `key` and `iv`.
pub fn encrypt(
    algorithm: PayloadAlgorithm,
    key: &[u8],
    iv: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_iv(algorithm, iv)?;
    match algorithm {
        PayloadAlgorithm::Des3CbcPad => cbc_encrypt::<TdesEde3>(key, iv, plaintext),
        PayloadAlgorithm::AesCbcPad => match key.len() {
            16 => cbc_encrypt::<Aes128>(key, iv, plaintext),
            32 => cbc_encrypt::<Aes256>(key, iv, plaintext),
            got => Err(CryptoError::InvalidKeyLength { expected: 32, got }),
        },
    }
}

/// Decrypt `ciphertext` and strip its padding.
pub fn decrypt(
    algorithm: PayloadAlgorithm,
    key: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Result<SensitiveVec, CryptoError> {
    check_iv(algorithm, iv)?;
    match algorithm {
        PayloadAlgorithm::Des3CbcPad => cbc_decrypt::<TdesEde3>(key, iv, ciphertext),
        PayloadAlgorithm::AesCbcPad => match key.len() {
            16 => cbc_decrypt::<Aes128>(key, iv, ciphertext),
            32 => cbc_decrypt::<Aes256>(key, iv, ciphertext),
            got => Err(CryptoError::InvalidKeyLength { expected: 32, got }),
        },
    }
}

fn check_iv(algorithm: PayloadAlgorithm, iv: &[u8]) -> Result<(), CryptoError> {
    if iv.len() != algorithm.iv_len() {
        return Err(CryptoError::InvalidParameters(format!(
            "{algorithm:?} needs a {}-byte IV, got {}",
            algorithm.iv_len(),
            iv.len()
        )));
    }
    Ok(())
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>
where
    C: BlockEncryptMut + BlockCipher,
    cbc::Encryptor<C>: KeyIvInit + BlockEncryptMut,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<SensitiveVec, CryptoError>
where
    C: BlockDecryptMut + BlockCipher,
    cbc::Decryptor<C>: KeyIvInit + BlockDecryptMut,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    let mut buf = SensitiveVec::from_slice(ciphertext);
    let len = decryptor
        .decrypt_padded_mut::<Pkcs7>(buf.as_mut_slice())
        .map_err(|e| CryptoError::Decryption(e.to_string()))?
        .len();
    buf.truncate(len);
    Ok(buf)
}
