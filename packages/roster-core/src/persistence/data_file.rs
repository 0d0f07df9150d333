//! On-disk format of the Person table.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::person::Person;

/// Current data file format version.
pub const DATA_FILE_FORMAT: u32 = 1;

/// File name inside the data directory.
pub const DATA_FILE_NAME: &str = "persons.json";

/// Persisted table contents with a CRC32 over the serialized records.
#[derive(Debug, Serialize, Deserialize)]
pub struct DataFile {
    pub format: u32,
    pub checksum: u32,
    pub records: Vec<Person>,
}

impl DataFile {
    /// Wraps `records`, computing their checksum.
    pub fn new(records: Vec<Person>) -> Result<Self, StoreError> {
        let checksum = checksum(&records)?;
        Ok(Self {
            format: DATA_FILE_FORMAT,
            checksum,
            records,
        })
    }

    /// Parses and verifies a data file.
    pub fn decode(bytes: &[u8]) -> Result<Self, StoreError> {
        let file: DataFile = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::DataCorruption(format!("unreadable data file: {}", e)))?;
        if file.format != DATA_FILE_FORMAT {
            return Err(StoreError::DataCorruption(format!(
                "unsupported data file format {} (expected {})",
                file.format, DATA_FILE_FORMAT
            )));
        }
        let actual = checksum(&file.records)?;
        if actual != file.checksum {
            return Err(StoreError::DataCorruption(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                file.checksum, actual
            )));
        }
        Ok(file)
    }

    pub fn encode(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(self).map_err(|e| StoreError::SerializationError(e.to_string()))
    }
}

fn checksum(records: &[Person]) -> Result<u32, StoreError> {
    let bytes =
        serde_json::to_vec(records).map_err(|e| StoreError::SerializationError(e.to_string()))?;
    let mut hasher = Hasher::new();
    hasher.update(&bytes);
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person::{PersonDraft, PersonId};

    #[test]
    fn test_tampered_records_fail_checksum() {
        let records = vec![PersonDraft::new("Ada", "Lovelace", 36).into_person(PersonId::generate())];
        let encoded = DataFile::new(records).unwrap().encode().unwrap();
        let tampered = String::from_utf8(encoded).unwrap().replace("36", "37");

        let err = DataFile::decode(tampered.as_bytes()).unwrap_err();
        assert!(matches!(err, StoreError::DataCorruption(ref m) if m.contains("checksum")));
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let mut file = DataFile::new(Vec::new()).unwrap();
        file.format = 99;
        let err = DataFile::decode(&file.encode().unwrap()).unwrap_err();
        assert!(matches!(err, StoreError::DataCorruption(_)));
    }
}
