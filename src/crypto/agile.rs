//! MS-OFFCRYPTO "Agile" encryption (Office 2010+).
//!
//! The `EncryptionInfo` stream carries an 8-byte version header followed by an XML
//! descriptor. Password verification decrypts `encryptedVerifierHashInput` and
//! `encryptedVerifierHashValue` with keys derived from the password and checks
//! `Hash(verifierHashInput) == verifierHashValue`. The package key (`encryptedKeyValue`)
//! then decrypts `EncryptedPackage` in 4096-byte segments, each with its own IV. When the
//! descriptor carries `<dataIntegrity>`, an HMAC over the package stream is checked last.

use aes::{Aes128, Aes192, Aes256};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use cbc::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader as XmlReader;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::DecryptError;

const VERIFIER_HASH_INPUT_BLOCK: [u8; 8] = [0xFE, 0xA7, 0xD2, 0x76, 0x3B, 0x4B, 0x9E, 0x79];
const VERIFIER_HASH_VALUE_BLOCK: [u8; 8] = [0xD7, 0xAA, 0x0F, 0x6D, 0x30, 0x61, 0x34, 0x4E];
const KEY_VALUE_BLOCK: [u8; 8] = [0x14, 0x6E, 0x0B, 0xE7, 0xAB, 0xAC, 0xD0, 0xD6];
const HMAC_KEY_BLOCK: [u8; 8] = [0x5F, 0xB2, 0xAD, 0x01, 0x0C, 0xB9, 0xE1, 0xF6];
const HMAC_VALUE_BLOCK: [u8; 8] = [0xA0, 0x67, 0x7F, 0x02, 0xB2, 0x2C, 0x84, 0x33];

const SEGMENT_LEN: usize = 4096;
const AES_BLOCK: usize = 16;
const MAX_SPIN_COUNT: u32 = 10_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    fn parse(name: &str) -> Result<Self, DecryptError> {
        match name.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "SHA1" => Ok(HashAlgorithm::Sha1),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            other => Err(DecryptError::Unsupported(format!(
                "hash algorithm {other}"
            ))),
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            HashAlgorithm::Sha1 => {
                use sha1::Digest as _;
                sha1::Sha1::digest(data).to_vec()
            }
            HashAlgorithm::Sha256 => {
                use sha2::Digest as _;
                sha2::Sha256::digest(data).to_vec()
            }
            HashAlgorithm::Sha384 => {
                use sha2::Digest as _;
                sha2::Sha384::digest(data).to_vec()
            }
            HashAlgorithm::Sha512 => {
                use sha2::Digest as _;
                sha2::Sha512::digest(data).to_vec()
            }
        }
    }

    fn hmac(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptError> {
        let bad_key = |_| DecryptError::InvalidInfo("invalid HMAC key");
        let out = match self {
            HashAlgorithm::Sha1 => {
                let mut mac: Hmac<sha1::Sha1> = Hmac::new_from_slice(key).map_err(bad_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha256 => {
                let mut mac: Hmac<sha2::Sha256> = Hmac::new_from_slice(key).map_err(bad_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha384 => {
                let mut mac: Hmac<sha2::Sha384> = Hmac::new_from_slice(key).map_err(bad_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
            HashAlgorithm::Sha512 => {
                let mut mac: Hmac<sha2::Sha512> = Hmac::new_from_slice(key).map_err(bad_key)?;
                mac.update(data);
                mac.finalize().into_bytes().to_vec()
            }
        };
        Ok(out)
    }

    fn digest_parts(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut buf = Zeroizing::new(Vec::with_capacity(a.len() + b.len()));
        buf.extend_from_slice(a);
        buf.extend_from_slice(b);
        self.digest(&buf)
    }
}

/// The subset of the Agile descriptor needed to decrypt with a password
#[derive(Debug, Clone)]
pub struct AgileInfo {
    pub key_data_salt: Vec<u8>,
    pub key_data_hash: HashAlgorithm,
    pub key_data_block_size: usize,
    pub spin_count: u32,
    pub password_salt: Vec<u8>,
    pub password_hash: HashAlgorithm,
    pub password_key_bits: usize,
    pub encrypted_key_value: Vec<u8>,
    pub encrypted_verifier_hash_input: Vec<u8>,
    pub encrypted_verifier_hash_value: Vec<u8>,
    /// `(encryptedHmacKey, encryptedHmacValue)` from `<dataIntegrity>`
    pub data_integrity: Option<(Vec<u8>, Vec<u8>)>,
}

/// Parse the XML part of an Agile `EncryptionInfo` stream (everything after the
/// 8-byte version header).
pub fn parse_info(xml_bytes: &[u8]) -> Result<AgileInfo, DecryptError> {
    let xml = std::str::from_utf8(xml_bytes)
        .map_err(|_| DecryptError::InvalidInfo("descriptor is not valid UTF-8"))?;
    // Some producers prepend a BOM
    let xml = xml.trim_start_matches('\u{feff}');

    let mut reader = XmlReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut key_data: Option<(Vec<u8>, HashAlgorithm, usize)> = None;
    let mut password_key: Option<PasswordKey> = None;
    let mut data_integrity: Option<(Vec<u8>, Vec<u8>)> = None;

    loop {
        match reader
            .read_event()
            .map_err(|_| DecryptError::InvalidInfo("descriptor XML parse error"))?
        {
            XmlEvent::Start(e) | XmlEvent::Empty(e) => match e.local_name().as_ref() {
                b"keyData" => key_data = Some(parse_key_data(&e)?),
                b"dataIntegrity" => data_integrity = Some(parse_data_integrity(&e)?),
                // Certificate key encryptors share the element name but carry no spinCount
                b"encryptedKey" if has_attr(&e, b"spinCount") => {
                    password_key = Some(parse_password_key(&e)?)
                }
                _ => {}
            },
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    let (key_data_salt, key_data_hash, key_data_block_size) =
        key_data.ok_or(DecryptError::InvalidInfo("missing <keyData> element"))?;
    let password_key = password_key.ok_or(DecryptError::InvalidInfo(
        "no password key encryptor in descriptor",
    ))?;

    Ok(AgileInfo {
        key_data_salt,
        key_data_hash,
        key_data_block_size,
        spin_count: password_key.spin_count,
        password_salt: password_key.salt,
        password_hash: password_key.hash,
        password_key_bits: password_key.key_bits,
        encrypted_key_value: password_key.encrypted_key_value,
        encrypted_verifier_hash_input: password_key.encrypted_verifier_hash_input,
        encrypted_verifier_hash_value: password_key.encrypted_verifier_hash_value,
        data_integrity,
    })
}

struct PasswordKey {
    spin_count: u32,
    salt: Vec<u8>,
    hash: HashAlgorithm,
    key_bits: usize,
    encrypted_key_value: Vec<u8>,
    encrypted_verifier_hash_input: Vec<u8>,
    encrypted_verifier_hash_value: Vec<u8>,
}

fn has_attr(e: &BytesStart<'_>, name: &[u8]) -> bool {
    e.attributes()
        .with_checks(false)
        .flatten()
        .any(|a| local_name(a.key.as_ref()) == name)
}

fn attrs(e: &BytesStart<'_>) -> Result<Vec<(Vec<u8>, String)>, DecryptError> {
    let mut out = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|_| DecryptError::InvalidInfo("invalid XML attribute"))?;
        let value = std::str::from_utf8(attr.value.as_ref())
            .map_err(|_| DecryptError::InvalidInfo("invalid UTF-8 attribute value"))?
            .to_string();
        out.push((local_name(attr.key.as_ref()).to_vec(), value));
    }
    Ok(out)
}

fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|b| *b == b':') {
        Some(idx) => &name[idx + 1..],
        None => name,
    }
}

fn parse_key_data(e: &BytesStart<'_>) -> Result<(Vec<u8>, HashAlgorithm, usize), DecryptError> {
    let mut salt = None;
    let mut hash = None;
    let mut block_size = None;

    for (key, value) in attrs(e)? {
        match key.as_slice() {
            b"saltValue" => salt = Some(decode_b64(&value)?),
            b"hashAlgorithm" => hash = Some(HashAlgorithm::parse(&value)?),
            b"blockSize" => block_size = Some(parse_number(&value)?),
            _ => {}
        }
    }

    Ok((
        salt.ok_or(DecryptError::InvalidInfo("missing keyData.saltValue"))?,
        hash.ok_or(DecryptError::InvalidInfo("missing keyData.hashAlgorithm"))?,
        block_size.ok_or(DecryptError::InvalidInfo("missing keyData.blockSize"))?,
    ))
}

fn parse_data_integrity(e: &BytesStart<'_>) -> Result<(Vec<u8>, Vec<u8>), DecryptError> {
    let mut hmac_key = None;
    let mut hmac_value = None;
    for (key, value) in attrs(e)? {
        match key.as_slice() {
            b"encryptedHmacKey" => hmac_key = Some(decode_b64(&value)?),
            b"encryptedHmacValue" => hmac_value = Some(decode_b64(&value)?),
            _ => {}
        }
    }
    Ok((
        hmac_key.ok_or(DecryptError::InvalidInfo("missing dataIntegrity.encryptedHmacKey"))?,
        hmac_value.ok_or(DecryptError::InvalidInfo("missing dataIntegrity.encryptedHmacValue"))?,
    ))
}

fn parse_password_key(e: &BytesStart<'_>) -> Result<PasswordKey, DecryptError> {
    let mut spin_count = None;
    let mut salt = None;
    let mut hash = None;
    let mut key_bits = None;
    let mut key_value = None;
    let mut hash_input = None;
    let mut hash_value = None;

    for (key, value) in attrs(e)? {
        match key.as_slice() {
            b"spinCount" => spin_count = Some(parse_number(&value)?),
            b"saltValue" => salt = Some(decode_b64(&value)?),
            b"hashAlgorithm" => hash = Some(HashAlgorithm::parse(&value)?),
            b"keyBits" => key_bits = Some(parse_number(&value)?),
            b"encryptedKeyValue" => key_value = Some(decode_b64(&value)?),
            b"encryptedVerifierHashInput" => hash_input = Some(decode_b64(&value)?),
            b"encryptedVerifierHashValue" => hash_value = Some(decode_b64(&value)?),
            _ => {}
        }
    }

    let spin_count: usize =
        spin_count.ok_or(DecryptError::InvalidInfo("missing encryptedKey.spinCount"))?;
    let spin_count = u32::try_from(spin_count)
        .ok()
        .filter(|n| *n <= MAX_SPIN_COUNT)
        .ok_or(DecryptError::InvalidInfo("encryptedKey.spinCount is out of range"))?;

    Ok(PasswordKey {
        spin_count,
        salt: salt.ok_or(DecryptError::InvalidInfo("missing encryptedKey.saltValue"))?,
        hash: hash.ok_or(DecryptError::InvalidInfo("missing encryptedKey.hashAlgorithm"))?,
        key_bits: key_bits.ok_or(DecryptError::InvalidInfo("missing encryptedKey.keyBits"))?,
        encrypted_key_value: key_value
            .ok_or(DecryptError::InvalidInfo("missing encryptedKey.encryptedKeyValue"))?,
        encrypted_verifier_hash_input: hash_input.ok_or(DecryptError::InvalidInfo(
            "missing encryptedKey.encryptedVerifierHashInput",
        ))?,
        encrypted_verifier_hash_value: hash_value.ok_or(DecryptError::InvalidInfo(
            "missing encryptedKey.encryptedVerifierHashValue",
        ))?,
    })
}

fn decode_b64(value: &str) -> Result<Vec<u8>, DecryptError> {
    // Pretty-printed descriptors may wrap long values
    let cleaned: String = value.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(cleaned.as_bytes())
        .or_else(|_| STANDARD_NO_PAD.decode(cleaned.as_bytes()))
        .map_err(|_| DecryptError::InvalidInfo("invalid base64 value"))
}

fn parse_number(value: &str) -> Result<usize, DecryptError> {
    value
        .trim()
        .parse::<usize>()
        .map_err(|_| DecryptError::InvalidInfo("invalid numeric attribute"))
}

fn password_utf16le(password: &str) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::with_capacity(password.len() * 2));
    for unit in password.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// `H0 = Hash(salt || password)`, then `H(n+1) = Hash(LE32(n) || Hn)` for `spin_count` rounds.
fn iterated_hash(password: &str, salt: &[u8], alg: HashAlgorithm, spin_count: u32) -> Zeroizing<Vec<u8>> {
    let pw = password_utf16le(password);
    let mut h = Zeroizing::new(alg.digest_parts(salt, &pw));
    for i in 0..spin_count {
        *h = alg.digest_parts(&i.to_le_bytes(), &h);
    }
    h
}

/// Final key for one block: `Hash(H || block_key)` cut or 0x36-padded to `key_bits / 8`.
fn derive_key(h: &[u8], block_key: &[u8], alg: HashAlgorithm, key_bits: usize) -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(alg.digest_parts(h, block_key));
    key.resize(key_bits / 8, 0x36);
    key
}

/// IV for a segment or block: `Hash(salt || block_key)` cut or 0x36-padded to the block size.
/// Segments use `LE32(index)` as the block key.
fn derive_iv(salt: &[u8], block_key: &[u8], alg: HashAlgorithm, block_size: usize) -> Vec<u8> {
    let mut iv = alg.digest_parts(salt, block_key);
    iv.resize(block_size, 0x36);
    iv
}

fn aes_cbc_decrypt(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    if data.len() % AES_BLOCK != 0 {
        return Err(DecryptError::InvalidInfo(
            "ciphertext is not a multiple of the AES block size",
        ));
    }
    if iv.len() != AES_BLOCK {
        return Err(DecryptError::InvalidInfo("IV must be 16 bytes"));
    }

    let mut buf = Zeroizing::new(data.to_vec());
    let bad_key = |_| DecryptError::InvalidInfo("invalid AES key length");
    let bad_pad = |_| DecryptError::InvalidInfo("AES-CBC decryption failed");
    match key.len() {
        16 => {
            cbc::Decryptor::<Aes128>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_pad)?;
        }
        24 => {
            cbc::Decryptor::<Aes192>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_pad)?;
        }
        32 => {
            cbc::Decryptor::<Aes256>::new_from_slices(key, iv)
                .map_err(bad_key)?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(bad_pad)?;
        }
        _ => return Err(DecryptError::Unsupported(format!("{}-bit AES key", key.len() * 8))),
    }
    Ok(buf)
}

/// Verify the password and recover the package key.
pub fn secret_key(info: &AgileInfo, password: &str) -> Result<Zeroizing<Vec<u8>>, DecryptError> {
    if info.password_key_bits == 0 || info.password_key_bits % 8 != 0 {
        return Err(DecryptError::InvalidInfo("keyBits is not a whole number of bytes"));
    }
    let alg = info.password_hash;
    let bits = info.password_key_bits;
    let iv = {
        let mut iv = info.password_salt.clone();
        iv.resize(AES_BLOCK, 0x36);
        iv
    };

    let h = iterated_hash(password, &info.password_salt, alg, info.spin_count);

    let key1 = derive_key(&h, &VERIFIER_HASH_INPUT_BLOCK, alg, bits);
    let hash_input = aes_cbc_decrypt(&key1, &iv, &info.encrypted_verifier_hash_input)?;

    let key2 = derive_key(&h, &VERIFIER_HASH_VALUE_BLOCK, alg, bits);
    let hash_value = aes_cbc_decrypt(&key2, &iv, &info.encrypted_verifier_hash_value)?;

    // The verifier input is the salt-sized prefix; the stored hash may carry CBC padding
    let input_len = info.password_salt.len().min(hash_input.len());
    let digest = alg.digest(&hash_input[..input_len]);
    let expected = hash_value
        .get(..digest.len())
        .ok_or(DecryptError::WrongPassword)?;
    if !bool::from(digest.ct_eq(expected)) {
        return Err(DecryptError::WrongPassword);
    }

    let key3 = derive_key(&h, &KEY_VALUE_BLOCK, alg, bits);
    let key_value = aes_cbc_decrypt(&key3, &iv, &info.encrypted_key_value)?;
    let key_len = bits / 8;
    if key_value.len() < key_len {
        return Err(DecryptError::InvalidInfo("decrypted keyValue is truncated"));
    }
    Ok(Zeroizing::new(key_value[..key_len].to_vec()))
}

/// Decrypt the `EncryptedPackage` stream: an 8-byte little-endian plaintext size followed
/// by the ciphertext, in independently keyed 4096-byte segments.
pub fn decrypt_package(info: &AgileInfo, key: &[u8], package: &[u8]) -> Result<Vec<u8>, DecryptError> {
    if package.len() < 8 {
        return Err(DecryptError::InvalidInfo("EncryptedPackage is truncated"));
    }
    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&package[..8]);
    let size = usize::try_from(u64::from_le_bytes(size_bytes))
        .map_err(|_| DecryptError::InvalidInfo("EncryptedPackage size overflows"))?;

    let ciphertext = &package[8..];
    if size > ciphertext.len() {
        return Err(DecryptError::InvalidInfo("EncryptedPackage is shorter than its declared size"));
    }

    let mut out = Vec::with_capacity(ciphertext.len());
    for (index, segment) in ciphertext.chunks(SEGMENT_LEN).enumerate() {
        let index = u32::try_from(index)
            .map_err(|_| DecryptError::InvalidInfo("too many package segments"))?;
        let iv = derive_iv(
            &info.key_data_salt,
            &index.to_le_bytes(),
            info.key_data_hash,
            info.key_data_block_size,
        );
        // Trailing bytes past the last whole block are slack after the declared size
        let whole = segment.len() - segment.len() % AES_BLOCK;
        let plain = aes_cbc_decrypt(key, &iv, &segment[..whole])?;
        out.extend_from_slice(&plain);
        if out.len() >= size {
            break;
        }
    }

    if out.len() < size {
        return Err(DecryptError::InvalidInfo("EncryptedPackage is shorter than its declared size"));
    }
    out.truncate(size);
    Ok(out)
}

/// Check the `<dataIntegrity>` HMAC. The stored value covers the `EncryptedPackage`
/// stream; some producers hash the decrypted package instead, so either is accepted.
pub fn verify_integrity(
    info: &AgileInfo,
    key: &[u8],
    package: &[u8],
    plaintext: &[u8],
) -> Result<(), DecryptError> {
    let Some((encrypted_hmac_key, encrypted_hmac_value)) = &info.data_integrity else {
        return Ok(());
    };
    let alg = info.key_data_hash;
    let hash_len = alg.digest(&[]).len();

    let iv = derive_iv(&info.key_data_salt, &HMAC_KEY_BLOCK, alg, info.key_data_block_size);
    let hmac_key = aes_cbc_decrypt(key, &iv, encrypted_hmac_key)?;
    let hmac_key = hmac_key
        .get(..hash_len)
        .ok_or(DecryptError::InvalidInfo("decrypted HMAC key is truncated"))?;

    let iv = derive_iv(&info.key_data_salt, &HMAC_VALUE_BLOCK, alg, info.key_data_block_size);
    let expected = aes_cbc_decrypt(key, &iv, encrypted_hmac_value)?;
    let expected = expected
        .get(..hash_len)
        .ok_or(DecryptError::InvalidInfo("decrypted HMAC value is truncated"))?;

    for target in [package, plaintext] {
        if bool::from(alg.hmac(hmac_key, target)?.ct_eq(expected)) {
            return Ok(());
        }
    }
    Err(DecryptError::IntegrityMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<encryption xmlns="http://schemas.microsoft.com/office/2006/encryption" xmlns:p="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
  <keyData saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="AAECAwQFBgcICQoLDA0ODw=="/>
  <dataIntegrity encryptedHmacKey="AAAA" encryptedHmacValue="AAAA"/>
  <keyEncryptors>
    <keyEncryptor uri="http://schemas.microsoft.com/office/2006/keyEncryptor/password">
      <p:encryptedKey spinCount="100000" saltSize="16" blockSize="16" keyBits="256" hashSize="64" cipherAlgorithm="AES" cipherChaining="ChainingModeCBC" hashAlgorithm="SHA512" saltValue="EBESExQVFhcYGRobHB0eHw==" encryptedVerifierHashInput="AAAAAAAAAAAAAAAAAAAAAA==" encryptedVerifierHashValue="AAAA" encryptedKeyValue="AAAA"/>
    </keyEncryptor>
  </keyEncryptors>
</encryption>"#;

    #[test]
    fn test_parse_info_reads_password_key_encryptor() {
        let info = parse_info(SAMPLE_XML.as_bytes()).unwrap();
        assert_eq!(info.key_data_hash, HashAlgorithm::Sha512);
        assert_eq!(info.data_integrity, Some((vec![0, 0, 0], vec![0, 0, 0])));
        assert_eq!(info.key_data_block_size, 16);
        assert_eq!(info.key_data_salt, (0u8..16).collect::<Vec<_>>());
        assert_eq!(info.spin_count, 100_000);
        assert_eq!(info.password_key_bits, 256);
        assert_eq!(info.password_salt, (16u8..32).collect::<Vec<_>>());
        assert_eq!(info.encrypted_verifier_hash_input.len(), 16);
    }

    #[test]
    fn test_parse_info_without_password_encryptor_fails() {
        let xml = r#"<encryption><keyData blockSize="16" hashAlgorithm="SHA1" saltValue="AAAA"/></encryption>"#;
        let err = parse_info(xml.as_bytes()).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidInfo(_)));
    }

    #[test]
    fn test_hash_algorithm_names() {
        assert_eq!(HashAlgorithm::parse("SHA-256").unwrap(), HashAlgorithm::Sha256);
        assert_eq!(HashAlgorithm::parse("sha1").unwrap(), HashAlgorithm::Sha1);
        assert!(HashAlgorithm::parse("MD5").is_err());
    }

    #[test]
    fn test_hmac_sha256_known_answer() {
        // RFC 4231 test case 2
        let mac = HashAlgorithm::Sha256
            .hmac(b"Jefe", b"what do ya want for nothing?")
            .unwrap();
        assert_eq!(mac.len(), 32);
        assert_eq!(mac[..4].to_vec(), vec![0x5bu8, 0xdc, 0xc1, 0x46]);
    }

    #[test]
    fn test_derive_key_pads_with_0x36() {
        let key = derive_key(b"h", b"block", HashAlgorithm::Sha1, 256);
        assert_eq!(key.len(), 32);
        assert!(key[20..].iter().all(|b| *b == 0x36));
    }

    #[test]
    fn test_decode_b64_tolerates_whitespace_and_missing_padding() {
        assert_eq!(decode_b64("AA EC\nAw==").unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(decode_b64("AAECAw").unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_truncated_package_is_rejected() {
        let info = parse_info(SAMPLE_XML.as_bytes()).unwrap();
        let err = decrypt_package(&info, &[0u8; 32], &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, DecryptError::InvalidInfo(_)));
    }
}
