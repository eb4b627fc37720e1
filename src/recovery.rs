//! Crash recovery: truncate both logs back to the last intact entry.

use crate::error::Result;
use crate::logs::{self, KEY_LOG, KEY_LOG_TMP, Record, VALUE_LOG, VALUE_LOG_TMP};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Rewrites `db.klog`/`db.vlog` so that only the longest prefix of intact
/// entries survives.
///
/// An entry is intact when its line parses, its payload reads back fully at
/// the recorded offset and size, and its recorded checksum matches the
/// recomputed one. Accepted lines and payloads are copied verbatim, so their
/// checksums keep verifying on later runs. Everything past the first failure
/// is dropped; that truncation is the defined behavior, not an error.
pub fn run(dir: &Path) -> Result<()> {
    let klog_path = dir.join(KEY_LOG);
    if !klog_path.exists() {
        return Ok(());
    }

    let reader = BufReader::new(File::open(&klog_path)?);
    let mut vlog = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(dir.join(VALUE_LOG))?;
    let vlog_len = vlog.metadata()?.len();
    let (mut tmp_klog, mut tmp_vlog) = logs::create_temps(dir)?;

    let mut accepted = 0usize;
    let mut truncated = false;

    for line in reader.lines() {
        let Ok(line) = line else {
            truncated = true;
            break;
        };
        let Ok(record) = serde_json::from_str::<Record>(&line) else {
            truncated = true;
            break;
        };

        let payload = match &record {
            Record::Set { offset, size, .. } => {
                let in_bounds = offset
                    .checked_add(*size)
                    .is_some_and(|end| end <= vlog_len);
                if !in_bounds {
                    truncated = true;
                    break;
                }
                match read_payload(&mut vlog, *offset, *size) {
                    Ok(payload) => Some(payload),
                    Err(_) => {
                        truncated = true;
                        break;
                    }
                }
            }
            Record::Del { .. } => None,
        };

        let digest = match record.compute_checksum(payload.as_deref().unwrap_or(&[])) {
            Ok(digest) => digest,
            Err(_) => {
                truncated = true;
                break;
            }
        };
        if record.checksum() != Some(digest) {
            truncated = true;
            break;
        }

        tmp_klog.write_all(line.as_bytes())?;
        tmp_klog.write_all(b"\n")?;
        if let Some(payload) = payload {
            tmp_vlog.write_all(&payload)?;
        }
        accepted += 1;
    }

    tmp_klog.flush()?;
    tmp_klog.get_ref().sync_data()?;
    tmp_vlog.sync_data()?;
    drop(tmp_klog);
    drop(tmp_vlog);
    drop(vlog);

    fs::rename(dir.join(KEY_LOG_TMP), dir.join(KEY_LOG))?;
    fs::rename(dir.join(VALUE_LOG_TMP), dir.join(VALUE_LOG))?;

    if truncated {
        log::warn!(
            "dropped key-log entries past the last intact record in {}",
            dir.display()
        );
    }
    log::info!("recovery kept {accepted} entries in {}", dir.display());
    Ok(())
}

fn read_payload(vlog: &mut File, offset: u64, size: u64) -> std::io::Result<Vec<u8>> {
    vlog.seek(SeekFrom::Start(offset))?;
    let mut payload = vec![0u8; size as usize];
    vlog.read_exact(&mut payload)?;
    Ok(payload)
}
