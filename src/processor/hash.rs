//! Post-write content validation against the store's reported hash.

use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::io::Read;
use std::str::FromStr;

use crate::error::CometError;
use crate::processor::store::StoreResponse;
use crate::types::WorkItem;
use crate::utils::config::{HASH_READ_BUFFER_SIZE, StoreProtocol};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl FromStr for HashAlgorithm {
    type Err = CometError;

    /// Accepts `SHA-256` and `SHA256` spellings, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "").as_str() {
            "SHA224" => Ok(HashAlgorithm::Sha224),
            "SHA256" => Ok(HashAlgorithm::Sha256),
            "SHA384" => Ok(HashAlgorithm::Sha384),
            "SHA512" => Ok(HashAlgorithm::Sha512),
            _ => Err(CometError::UnsupportedHash(s.to_string())),
        }
    }
}

fn digest_reader<D: Digest>(mut reader: impl Read) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; HASH_READ_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect())
}

/// Uppercase hex digest of everything `reader` yields.
pub fn compute_hash(alg: HashAlgorithm, reader: impl Read) -> std::io::Result<String> {
    match alg {
        HashAlgorithm::Sha224 => digest_reader::<Sha224>(reader),
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(reader),
        HashAlgorithm::Sha384 => digest_reader::<Sha384>(reader),
        HashAlgorithm::Sha512 => digest_reader::<Sha512>(reader),
    }
}

/// Split `"<ALG> <HEX>"`.
pub fn parse_hash_header(value: &str) -> Result<(HashAlgorithm, String), CometError> {
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(alg), Some(hex), None) => Ok((alg.parse()?, hex.to_ascii_uppercase())),
        _ => Err(CometError::MalformedHeader {
            header: StoreProtocol::HASH_HEADER,
            value: value.to_string(),
        }),
    }
}

/// Recompute the hash of the item's content and compare with the one the store returned.
pub fn validate_hash(resp: &StoreResponse, item: &WorkItem) -> Result<(), CometError> {
    let value = resp
        .header(StoreProtocol::HASH_HEADER)
        .ok_or(CometError::MissingHeader(StoreProtocol::HASH_HEADER))?;
    let (alg, expected) = parse_hash_header(value)?;
    let computed = compute_hash(alg, item.open_content()?)?;
    if computed != expected {
        return Err(CometError::HashMismatch { expected, computed });
    }
    log::debug!("Hash validated for {}", item.name());
    Ok(())
}
