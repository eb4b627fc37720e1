//! The two append-only log files and the textual key-log record format.
//!
//! The key-log holds one JSON record per newline-terminated line; the
//! value-log is a raw concatenation of payload bytes whose boundaries are
//! defined entirely by the (offset, size) pairs recorded in the key-log.

use crate::checksum::record_checksum;
use crate::codec::{Encoding, canonical_text};
use crate::error::{Error, Result};
use crate::index::ValuePointer;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Text key-log, one record per line.
pub const KEY_LOG: &str = "db.klog";
/// Binary value-log, concatenated payloads.
pub const VALUE_LOG: &str = "db.vlog";
/// Temporary key-log used while rewriting.
pub const KEY_LOG_TMP: &str = "db.klog.tmp";
/// Temporary value-log used while rewriting.
pub const VALUE_LOG_TMP: &str = "db.vlog.tmp";
/// Zero-byte marker present between open and clean close.
pub const OPEN_MARKER: &str = ".OPEN";

/// One key-log line.
///
/// The checksum is computed over the record serialized with the `checksum`
/// field absent, so the serialized field order must stay fixed: recovery
/// re-serializes parsed records and compares digests byte-for-byte.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Record {
    Set {
        timestamp: u64,
        key: serde_json::Value,
        encoding: Encoding,
        offset: u64,
        size: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiration: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<u32>,
    },
    Del {
        timestamp: u64,
        key: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        checksum: Option<u32>,
    },
}

impl Record {
    /// Serializes the record with the checksum cleared. This is the checksum
    /// input.
    pub fn canonical(&self) -> Result<String> {
        let mut stripped = self.clone();
        match &mut stripped {
            Record::Set { checksum, .. } | Record::Del { checksum, .. } => *checksum = None,
        }
        serde_json::to_string(&stripped).map_err(|err| Error::Codec(err.to_string()))
    }

    /// Computes the CRC32 for this record; set records also cover their
    /// payload bytes, delete records ignore the argument.
    pub fn compute_checksum(&self, payload: &[u8]) -> Result<u32> {
        let canonical = self.canonical()?;
        let digest = match self {
            Record::Set { .. } => record_checksum(canonical.as_bytes(), Some(payload)),
            Record::Del { .. } => record_checksum(canonical.as_bytes(), None),
        };
        Ok(digest)
    }

    /// Returns the recorded checksum, if any.
    pub fn checksum(&self) -> Option<u32> {
        match self {
            Record::Set { checksum, .. } | Record::Del { checksum, .. } => *checksum,
        }
    }

    /// Attaches a computed checksum.
    pub fn set_checksum(&mut self, digest: u32) {
        match self {
            Record::Set { checksum, .. } | Record::Del { checksum, .. } => {
                *checksum = Some(digest)
            }
        }
    }

    /// Serializes the record to its key-log line, without the newline.
    pub fn to_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|err| Error::Codec(err.to_string()))
    }
}

/// The paired append-only files backing one store directory.
#[derive(Debug)]
pub struct Logs {
    dir: PathBuf,
    klog: BufWriter<File>,
    vlog: File,
}

impl Logs {
    /// Opens or creates both logs in append mode.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let klog = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(KEY_LOG))?;
        let vlog = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(VALUE_LOG))?;
        Ok(Self {
            dir,
            klog: BufWriter::new(klog),
            vlog,
        })
    }

    /// Seeks both files to their end and returns the next value-log offset.
    pub fn seek_to_end(&mut self) -> Result<u64> {
        self.klog.seek(SeekFrom::End(0))?;
        Ok(self.vlog.seek(SeekFrom::End(0))?)
    }

    /// Appends one newline-terminated record line to the key-log.
    pub fn append_record(&mut self, line: &str) -> Result<()> {
        self.klog.write_all(line.as_bytes())?;
        self.klog.write_all(b"\n")?;
        Ok(())
    }

    /// Appends raw payload bytes to the value-log.
    pub fn append_payload(&mut self, payload: &[u8]) -> Result<()> {
        self.vlog.write_all(payload)?;
        Ok(())
    }

    /// Reads exactly `size` payload bytes starting at `offset`.
    pub fn read_payload(&mut self, offset: u64, size: u64) -> Result<Vec<u8>> {
        self.vlog.seek(SeekFrom::Start(offset))?;
        let mut payload = vec![0u8; size as usize];
        self.vlog.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Pushes buffered writes through to the operating system. Must run
    /// before every externally observable commit point.
    pub fn sync(&mut self) -> Result<()> {
        self.klog.flush()?;
        self.klog.get_ref().sync_data()?;
        self.vlog.sync_data()?;
        Ok(())
    }

    /// Replays the key-log into an index: last write wins per key and
    /// tombstones remove. Expired rows are kept; lookups filter them until
    /// reclaim drops them for good.
    pub fn load_index(&self) -> Result<HashMap<String, ValuePointer>> {
        let file = File::open(self.dir.join(KEY_LOG))?;
        let mut index = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(&line)
                .map_err(|err| Error::Corrupt(format!("unparseable key-log line: {err}")))?;
            apply_record(&mut index, record);
        }
        Ok(index)
    }

    /// Creates truncated temp files for a rewrite of both logs.
    pub fn create_temps(&self) -> Result<(BufWriter<File>, File)> {
        create_temps(&self.dir)
    }

    /// Renames the temp files over the primaries and reopens the handles.
    /// Callers must have flushed and synced the temps first.
    pub fn swap_temps(&mut self) -> Result<()> {
        fs::rename(self.dir.join(KEY_LOG_TMP), self.dir.join(KEY_LOG))?;
        fs::rename(self.dir.join(VALUE_LOG_TMP), self.dir.join(VALUE_LOG))?;
        *self = Logs::open(&self.dir)?;
        Ok(())
    }
}

/// Opens a truncated temp pair, shared by recovery and reclaim.
pub(crate) fn create_temps(dir: &Path) -> Result<(BufWriter<File>, File)> {
    let klog = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(KEY_LOG_TMP))?;
    let vlog = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dir.join(VALUE_LOG_TMP))?;
    Ok((BufWriter::new(klog), vlog))
}

fn apply_record(index: &mut HashMap<String, ValuePointer>, record: Record) {
    match record {
        Record::Set {
            timestamp,
            key,
            encoding,
            offset,
            size,
            expiration,
            ..
        } => {
            index.insert(
                canonical_text(&key),
                ValuePointer {
                    timestamp,
                    expiration,
                    offset,
                    size,
                    encoding,
                },
            );
        }
        Record::Del { key, .. } => {
            index.remove(&canonical_text(&key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_form_excludes_checksum() {
        let mut record = Record::Set {
            timestamp: 7,
            key: json!("alpha"),
            encoding: Encoding::Json,
            offset: 0,
            size: 2,
            expiration: None,
            checksum: None,
        };
        let canonical = record.canonical().unwrap();
        record.set_checksum(123);
        assert_eq!(record.canonical().unwrap(), canonical);
        assert!(record.to_line().unwrap().contains("\"checksum\":123"));
        assert!(!canonical.contains("checksum"));
    }

    #[test]
    fn record_line_round_trips() {
        let mut record = Record::Set {
            timestamp: 42,
            key: json!(["composite", 1]),
            encoding: Encoding::Bytes,
            offset: 16,
            size: 8,
            expiration: Some(99),
            checksum: None,
        };
        let digest = record.compute_checksum(b"payload!").unwrap();
        record.set_checksum(digest);

        let line = record.to_line().unwrap();
        let parsed: Record = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.compute_checksum(b"payload!").unwrap(), digest);
    }

    #[test]
    fn tag_and_field_names_match_the_wire_format() {
        let record = Record::Del {
            timestamp: 1,
            key: json!(5),
            checksum: Some(9),
        };
        let line = record.to_line().unwrap();
        assert!(line.starts_with(r#"{"type":"del","timestamp":1,"key":5"#));
    }

    #[test]
    fn delete_checksum_ignores_payload() {
        let record = Record::Del {
            timestamp: 1,
            key: json!("k"),
            checksum: None,
        };
        assert_eq!(
            record.compute_checksum(b"ignored").unwrap(),
            record.compute_checksum(&[]).unwrap()
        );
    }
}
