//! CRC32 integrity digests for key-log records.

use crc32fast::Hasher;

/// Computes the digest over the canonical record text, joined to the payload
/// bytes by a single `:` when a payload is present. Delete records carry no
/// payload and are digested over the canonical text alone.
pub fn record_checksum(canonical: &[u8], payload: Option<&[u8]>) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(canonical);
    if let Some(payload) = payload {
        hasher.update(b":");
        hasher.update(payload);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::record_checksum;

    #[test]
    fn digest_is_stable() {
        let canonical = br#"{"type":"del","timestamp":2,"key":"alpha"}"#;
        assert_eq!(
            record_checksum(canonical, None),
            record_checksum(canonical, None)
        );
    }

    #[test]
    fn payload_changes_digest() {
        let canonical = br#"{"type":"set","timestamp":1,"key":"alpha"}"#;
        let one = record_checksum(canonical, Some(b"one".as_slice()));
        assert_ne!(one, record_checksum(canonical, Some(b"two".as_slice())));
        assert_ne!(one, record_checksum(canonical, None));
    }

    #[test]
    fn empty_payload_differs_from_no_payload() {
        let canonical = b"{}";
        assert_ne!(
            record_checksum(canonical, Some(b"".as_slice())),
            record_checksum(canonical, None)
        );
    }
}
