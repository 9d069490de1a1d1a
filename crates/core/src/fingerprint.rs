//! Content fingerprints used as cache-busting query values.

use crate::error::{Result, ScriptSourceError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Digest a byte stream without materializing it.
///
/// The result uses the URL-safe base64 alphabet with padding stripped, so it
/// never contains `=`, `+` or `/`.
pub fn fingerprint_reader<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

pub fn fingerprint_file(path: &Path) -> Result<String> {
    let wrap = |source| ScriptSourceError::Fingerprint {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(wrap)?;
    fingerprint_reader(BufReader::new(file)).map_err(wrap)
}
