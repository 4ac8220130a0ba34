//! Binary framing of compiled bytecode
//!
//! Layout: `RSQJ` magic, one format byte, one language-version byte, the
//! SHA-256 digest of the bytecode, then the engine bytecode. The loader
//! refuses anything else before handing bytes to the engine.

use sha2::{Digest, Sha256};

use super::LanguageVersion;

const MAGIC: &[u8; 4] = b"RSQJ";
const FORMAT_VERSION: u8 = 2;
const DIGEST_LEN: usize = 32;
const DIGEST_OFFSET: usize = MAGIC.len() + 2;
const HEADER_LEN: usize = DIGEST_OFFSET + DIGEST_LEN;

fn digest(bytecode: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(bytecode);
    hasher.finalize().into()
}

pub(crate) fn frame(language: LanguageVersion, bytecode: &[u8]) -> Vec<u8> {
    let mut binary = Vec::with_capacity(HEADER_LEN + bytecode.len());
    binary.extend_from_slice(MAGIC);
    binary.push(FORMAT_VERSION);
    binary.push(language.tag());
    binary.extend_from_slice(&digest(bytecode));
    binary.extend_from_slice(bytecode);
    binary
}

/// Split a framed binary into its language version and bytecode
///
/// Bytecode is only returned when it matches the digest recorded at frame
/// time.
pub(crate) fn unframe(binary: &[u8]) -> Result<(LanguageVersion, &[u8]), String> {
    if binary.len() <= HEADER_LEN || &binary[..MAGIC.len()] != MAGIC {
        return Err("not a compiled script binary".to_string());
    }
    if binary[MAGIC.len()] != FORMAT_VERSION {
        return Err(format!(
            "unsupported binary format version {}",
            binary[MAGIC.len()]
        ));
    }

    let tag = binary[MAGIC.len() + 1];
    let language = LanguageVersion::from_tag(tag)
        .ok_or_else(|| format!("unknown language version tag {}", tag))?;

    let bytecode = &binary[HEADER_LEN..];
    if binary[DIGEST_OFFSET..HEADER_LEN] != digest(bytecode) {
        return Err("bytecode digest mismatch, binary is corrupt".to_string());
    }

    Ok((language, bytecode))
}
