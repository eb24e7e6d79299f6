//! Decryption of password-protected OOXML workbooks.
//!
//! An encrypted `.xlsx`/`.xlsm` is not a ZIP at all: it is an OLE/CFB container holding an
//! `EncryptionInfo` stream and an `EncryptedPackage` stream. Decrypting yields the original
//! ZIP package, which is staged to a scoped temporary file so the regular reader can open it.

mod agile;

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::debug;

use crate::error::{ExcelMgrError, ExcelMgrResult};

pub use agile::HashAlgorithm;

const OLE_MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("not an encrypted Office container")]
    NotEncrypted,

    #[error("incorrect password")]
    WrongPassword,

    #[error("unsupported encryption: {0}")]
    Unsupported(String),

    #[error("package integrity check failed")]
    IntegrityMismatch,

    #[error("malformed encryption info: {0}")]
    InvalidInfo(&'static str),

    #[error("container read error: {0}")]
    Container(#[from] std::io::Error),
}

/// True when the bytes are an OLE container carrying an encrypted OOXML package.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    if bytes.len() < OLE_MAGIC.len() || bytes[..OLE_MAGIC.len()] != OLE_MAGIC {
        return false;
    }
    match cfb::CompoundFile::open(Cursor::new(bytes)) {
        Ok(ole) => ole.exists("EncryptionInfo") && ole.exists("EncryptedPackage"),
        Err(_) => false,
    }
}

/// Peek at a file on disk without reading more than the container needs.
pub fn is_encrypted_file(path: &Path) -> ExcelMgrResult<bool> {
    let mut head = [0u8; 8];
    let mut file = fs::File::open(path)?;
    let n = file.read(&mut head)?;
    if n < head.len() || head != OLE_MAGIC {
        return Ok(false);
    }
    let bytes = fs::read(path)?;
    Ok(is_encrypted(&bytes))
}

/// Decrypt an encrypted OOXML container and return the plaintext ZIP package.
pub fn decrypt(bytes: &[u8], password: &str) -> Result<Vec<u8>, DecryptError> {
    if !is_encrypted(bytes) {
        return Err(DecryptError::NotEncrypted);
    }

    let mut ole = cfb::CompoundFile::open(Cursor::new(bytes))?;
    let mut info = Vec::new();
    ole.open_stream("EncryptionInfo")?.read_to_end(&mut info)?;
    let mut package = Vec::new();
    ole.open_stream("EncryptedPackage")?.read_to_end(&mut package)?;

    if info.len() < 8 {
        return Err(DecryptError::InvalidInfo("EncryptionInfo is truncated"));
    }
    let major = u16::from_le_bytes([info[0], info[1]]);
    let minor = u16::from_le_bytes([info[2], info[3]]);
    match (major, minor) {
        (4, 4) => {
            let descriptor = agile::parse_info(&info[8..])?;
            let key = agile::secret_key(&descriptor, password)?;
            let plain = agile::decrypt_package(&descriptor, &key, &package)?;
            agile::verify_integrity(&descriptor, &key, &package, &plain)?;
            Ok(plain)
        }
        (2..=4, 2) => Err(DecryptError::Unsupported(
            "Standard (CryptoAPI) encryption".to_string(),
        )),
        _ => Err(DecryptError::Unsupported(format!(
            "EncryptionInfo version {major}.{minor}"
        ))),
    }
}

/// A decrypted copy of a workbook on disk. The file is removed when this is dropped,
/// whichever way the caller leaves its scope.
#[derive(Debug)]
pub struct DecryptedWorkbook {
    file: NamedTempFile,
}

impl DecryptedWorkbook {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Decrypt `source` with `password` into a scoped temporary file.
///
/// The temp file lives in `temp_dir` when given, otherwise in the system temp directory.
/// Its name is derived from the source stem plus a random part so unrelated runs never
/// collide.
pub fn unlock(source: &Path, password: &str, temp_dir: Option<&Path>) -> ExcelMgrResult<DecryptedWorkbook> {
    let bytes = fs::read(source)?;
    let plaintext = decrypt(&bytes, password).map_err(|source_err| ExcelMgrError::Decryption {
        path: source.to_path_buf(),
        source: source_err,
    })?;

    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("workbook");
    // The reader picks its parser from the extension; the plaintext is always a ZIP package
    let suffix = match source.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("xlsm") => ".xlsm",
        _ => ".xlsx",
    };

    let prefix = format!(".excelmgr-{stem}-");
    let mut builder = Builder::new();
    builder.prefix(&prefix).suffix(suffix);
    let mut file = match temp_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            builder.tempfile_in(dir)?
        }
        None => builder.tempfile()?,
    };
    file.write_all(&plaintext)?;
    file.flush()?;

    debug!(
        file = %source.display(),
        staged = %file.path().display(),
        bytes = plaintext.len(),
        "decrypted workbook staged"
    );

    Ok(DecryptedWorkbook { file })
}
