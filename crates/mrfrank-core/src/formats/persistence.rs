//! # Index File Format
//!
//! Binary serialization for memory-resident indexes.
//!
//! Format: Header (5 bytes) + postcard-serialized `SerializableIndex`.
//! - 4 bytes: Magic ("MRFX")
//! - 1 byte: Version
//!
//! Size and header are validated before the payload is decoded, so a
//! truncated or foreign file fails with a clear error instead of an
//! allocation blow-up.

use crate::index::{MemoryIndex, SerializableIndex};
use crate::primitives::{FORMAT_VERSION, MAGIC_BYTES, MAX_INDEX_PAYLOAD_SIZE};
use crate::MrfError;
use std::path::Path;

/// Minimum valid file size (header only).
const MIN_FILE_SIZE: usize = 5;

// =============================================================================
// FILE HEADER
// =============================================================================

/// The header preceding all index data.
#[derive(Debug, Clone, Copy)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl IndexHeader {
    /// Create a new header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *MAGIC_BYTES,
            version: FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), MrfError> {
        if &self.magic != MAGIC_BYTES {
            return Err(MrfError::Deserialization(
                "Invalid magic bytes: not an mrfrank index".to_string(),
            ));
        }
        if self.version != FORMAT_VERSION {
            return Err(MrfError::Deserialization(format!(
                "Unsupported index version: {} (expected {})",
                self.version, FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; 5] {
        let mut bytes = [0u8; 5];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MrfError> {
        if bytes.len() < MIN_FILE_SIZE {
            return Err(MrfError::Deserialization("Header too short".to_string()));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for IndexHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize an index to bytes (header + payload).
pub fn index_to_bytes(index: &MemoryIndex) -> Result<Vec<u8>, MrfError> {
    let header = IndexHeader::new();
    let serializable = SerializableIndex::from(index);

    let payload = postcard::to_stdvec(&serializable)
        .map_err(|e| MrfError::Serialization(e.to_string()))?;

    let mut result = Vec::with_capacity(MIN_FILE_SIZE + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);
    Ok(result)
}

/// Deserialize an index from bytes.
pub fn index_from_bytes(bytes: &[u8]) -> Result<MemoryIndex, MrfError> {
    if bytes.len() < MIN_FILE_SIZE {
        return Err(MrfError::Deserialization(
            "Data too short: minimum 5 bytes required".to_string(),
        ));
    }
    if bytes.len() > MAX_INDEX_PAYLOAD_SIZE {
        return Err(MrfError::Deserialization(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_INDEX_PAYLOAD_SIZE
        )));
    }

    let header = IndexHeader::from_bytes(bytes)?;
    header.validate()?;

    let serializable: SerializableIndex = postcard::from_bytes(&bytes[MIN_FILE_SIZE..])
        .map_err(|e| MrfError::Deserialization(format!("Failed to decode index data: {}", e)))?;

    MemoryIndex::from_serializable(serializable)
}

/// Write an index file.
pub fn save_index(index: &MemoryIndex, path: &Path) -> Result<(), MrfError> {
    let bytes = index_to_bytes(index)?;
    std::fs::write(path, bytes).map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))
}

/// Read an index file.
pub fn load_index(path: &Path) -> Result<MemoryIndex, MrfError> {
    let bytes =
        std::fs::read(path).map_err(|e| MrfError::Io(format!("{}: {}", path.display(), e)))?;
    index_from_bytes(&bytes)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexBuilder, tokenize};

    fn sample() -> MemoryIndex {
        let mut builder = IndexBuilder::new();
        builder
            .add_document("d1", &tokenize("markov random field ranking"))
            .expect("add");
        builder
            .add_document("d2", &tokenize("random walks"))
            .expect("add");
        builder.build().expect("build")
    }

    #[test]
    fn header_roundtrip() {
        let header = IndexHeader::new();
        let restored = IndexHeader::from_bytes(&header.to_bytes()).expect("parse header");
        assert_eq!(restored.magic, *MAGIC_BYTES);
        assert_eq!(restored.version, FORMAT_VERSION);
    }

    #[test]
    fn bytes_roundtrip_bit_exact() {
        let bytes1 = index_to_bytes(&sample()).expect("first serialize");
        let restored = index_from_bytes(&bytes1).expect("deserialize");
        let bytes2 = index_to_bytes(&restored).expect("second serialize");
        assert_eq!(bytes1, bytes2, "save -> load -> save must produce identical bytes");
    }

    #[test]
    fn invalid_magic_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(matches!(
            index_from_bytes(&bytes),
            Err(MrfError::Deserialization(_))
        ));
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("index.mrfx");
        save_index(&sample(), &path).expect("save");
        let loaded = load_index(&path).expect("load");
        assert_eq!(loaded.vocabulary_size(), 5);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_index(Path::new("/nonexistent/index.mrfx"));
        assert!(matches!(err, Err(MrfError::Io(_))));
    }
}
