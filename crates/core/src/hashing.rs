//! SHA-256 digests for provider signatures and downloaded artifacts.

use sha2::{Digest, Sha256};

use crate::naming::short_hash;

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// Content fingerprint recorded for a materialized artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDigest {
    pub sha256: String,
    /// Size in bytes, as stored in `file_size`.
    pub size: i64,
}

impl ArtifactDigest {
    pub fn of(data: &[u8]) -> Self {
        Self {
            sha256: sha256_hex(data),
            size: i64::try_from(data.len()).unwrap_or(i64::MAX),
        }
    }

    /// Leading hex characters of the digest, used in artifact file names.
    pub fn prefix(&self, len: usize) -> &str {
        short_hash(&self.sha256, len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Twelve-byte binary glTF header: magic, version 2, total length 12.
    const GLB_HEADER: &[u8] = b"glTF\x02\x00\x00\x00\x0c\x00\x00\x00";

    #[test]
    fn empty_input_produces_known_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn glb_artifact_digest() {
        let digest = ArtifactDigest::of(GLB_HEADER);
        assert_eq!(
            digest.sha256,
            "54267b825b3110a5cdaba82e19d4a7a89a2fa1fc73f37efa0b56e496120e22f6"
        );
        assert_eq!(digest.size, 12);
        assert_eq!(digest.prefix(8), "54267b82");
        assert_eq!(digest.prefix(100), digest.sha256);
    }

    #[test]
    fn one_flipped_byte_changes_the_digest() {
        let mut corrupted = GLB_HEADER.to_vec();
        corrupted[4] = 0x01;
        let original = ArtifactDigest::of(GLB_HEADER);
        let changed = ArtifactDigest::of(&corrupted);
        assert_ne!(original.sha256, changed.sha256);
        assert_eq!(original.size, changed.size);
    }
}
