//! Host key fingerprint derivation.
//!
//! Fingerprints are computed over the raw wire encoding of the server's
//! public key, exactly as OpenSSH does: the canonical form is
//! `SHA256:<unpadded base64>`, with a colon-separated MD5 hex digest kept
//! only for display next to older tooling.

use data_encoding::BASE64_NOPAD;
use md5::Md5;
use sha2::{Digest, Sha256};

/// Canonical SHA-256 fingerprint in OpenSSH text form
pub fn sha256_fingerprint(raw_key: &[u8]) -> String {
    let digest = Sha256::digest(raw_key);
    format!("SHA256:{}", BASE64_NOPAD.encode(&digest))
}

/// Legacy MD5 fingerprint as colon-separated lowercase hex
pub fn md5_fingerprint(raw_key: &[u8]) -> String {
    let digest = Md5::digest(raw_key);
    let hex: Vec<String> = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.join(":")
}

/// Extract the algorithm name from an SSH wire-encoded public key.
///
/// The first field of the encoding is a length-prefixed ASCII string such
/// as `ssh-ed25519` or `ecdsa-sha2-nistp256`.
pub fn wire_algorithm(raw_key: &[u8]) -> Option<String> {
    if raw_key.len() < 4 {
        return None;
    }
    let len = u32::from_be_bytes([raw_key[0], raw_key[1], raw_key[2], raw_key[3]]) as usize;
    if len == 0 || len > 64 || raw_key.len() < 4 + len {
        return None;
    }
    std::str::from_utf8(&raw_key[4..4 + len])
        .ok()
        .map(|s| s.to_string())
}

/// Short display family for an SSH algorithm name
pub fn key_family(algorithm: &str) -> &'static str {
    match algorithm {
        "ssh-ed25519" => "ED25519",
        "ssh-rsa" | "rsa-sha2-256" | "rsa-sha2-512" => "RSA",
        "ssh-dss" => "DSA",
        a if a.starts_with("ecdsa-sha2-") => "ECDSA",
        a if a.starts_with("sk-ssh-ed25519") => "ED25519-SK",
        a if a.starts_with("sk-ecdsa-") => "ECDSA-SK",
        _ => "UNKNOWN",
    }
}
