//! # Envelope — at-rest container
//!
//! Wraps a sealed database file for storage:
//!
//! ```text
//! salt(16) || nonce(12) || AES-256-CTR( tar.gz( file ) )
//! ```
//!
//! The key is PBKDF2-HMAC-SHA256 over the password with the stored
//! salt, 100,000 iterations, 32 bytes out. The CTR IV is the 12-byte
//! nonce followed by four zero bytes. The tar archive holds a single
//! entry named `database.bin`.
//!
//! Both directions stream: the cipher wraps the file handle, the gzip
//! codec wraps the cipher, and tar wraps gzip, so the archive never
//! materializes in memory.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use aes::Aes256;
use cipher::{KeyIvInit, StreamCipher};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const PBKDF2_ITERATIONS: u32 = 100_000;

/// Name of the single entry inside the tar archive.
const ARCHIVE_ENTRY: &str = "database.bin";

#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The archive is truncated, not gzip, or not tar — including the
    /// usual symptom of a wrong password.
    #[error("invalid archive: {0}")]
    Format(String),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Encrypts `input` into the container file `output`.
pub fn encrypt<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    password: &str,
) -> Result<(), EnvelopeError> {
    let mut out = File::create(output)?;

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut nonce);

    out.write_all(&salt)?;
    out.write_all(&nonce)?;

    let cipher = make_cipher(password, &salt, &nonce);
    let encrypted = CipherWriter { inner: out, cipher };
    let gz = GzEncoder::new(encrypted, Compression::default());
    let mut archive = tar::Builder::new(gz);

    let mut source = File::open(input)?;
    archive.append_file(ARCHIVE_ENTRY, &mut source)?;

    let gz = archive.into_inner()?;
    let mut encrypted = gz.finish()?;
    encrypted.flush()?;
    encrypted.inner.sync_all()?;
    Ok(())
}

/// Decrypts the container file `input` back into `output`.
///
/// A wrong password does not fail key derivation — it produces a
/// keystream that turns the archive into noise, which surfaces as a
/// gzip/tar format error.
pub fn decrypt<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    password: &str,
) -> Result<(), EnvelopeError> {
    let mut source = File::open(input)?;

    let mut salt = [0u8; SALT_SIZE];
    let mut nonce = [0u8; NONCE_SIZE];
    source.read_exact(&mut salt)?;
    source.read_exact(&mut nonce)?;

    let cipher = make_cipher(password, &salt, &nonce);
    let decrypted = CipherReader {
        inner: source,
        cipher,
    };
    let gz = GzDecoder::new(decrypted);
    let mut archive = tar::Archive::new(gz);

    let mut extracted = false;
    for entry in archive
        .entries()
        .map_err(|err| EnvelopeError::Format(err.to_string()))?
    {
        let mut entry = entry.map_err(|err| EnvelopeError::Format(err.to_string()))?;
        let mut out = File::create(output.as_ref())?;
        io::copy(&mut entry, &mut out)
            .map_err(|err| EnvelopeError::Format(err.to_string()))?;
        out.sync_all()?;
        extracted = true;
    }

    if !extracted {
        return Err(EnvelopeError::Format("archive holds no entries".to_string()));
    }
    Ok(())
}

/// PBKDF2-HMAC-SHA256 key plus the CTR cipher over nonce‖0⁴.
fn make_cipher(password: &str, salt: &[u8; SALT_SIZE], nonce: &[u8; NONCE_SIZE]) -> Aes256Ctr {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);

    let mut iv = [0u8; 16];
    iv[..NONCE_SIZE].copy_from_slice(nonce);

    Aes256Ctr::new(&key.into(), &iv.into())
}

/// Applies the keystream to everything written through it.
struct CipherWriter<W: Write> {
    inner: W,
    cipher: Aes256Ctr,
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut scratch = buf.to_vec();
        self.cipher.apply_keystream(&mut scratch);
        self.inner.write_all(&scratch)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Applies the keystream to everything read through it.
struct CipherReader<R: Read> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}
