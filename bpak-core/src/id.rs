//! C1: name -> id hashing
//!
//! Parts, meta entries, and meta keys are addressed by a 32-bit id computed
//! from a human-readable name. The core never stores the name itself, only
//! this id, so callers must re-hash the same name to look an entry back up.

use crate::error::BpakError;

/// Hash a UTF-8 name into its 32-bit id.
///
/// Uses the reflected CRC-32 (CRC-32/ISO-HDLC, the same polynomial zlib and
/// most archive formats use) over the name's raw bytes.
///
/// # Errors
///
/// Returns [`BpakError::InvalidArgument`] if `name` is empty.
pub fn id_from_name(name: &str) -> Result<u32, BpakError> {
    if name.is_empty() {
        return Err(BpakError::InvalidArgument(
            "name must not be empty".into(),
        ));
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(name.as_bytes());
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            id_from_name(""),
            Err(BpakError::InvalidArgument(_))
        ));
    }

    #[test]
    fn same_name_hashes_the_same() {
        let a = id_from_name("bpak-package").unwrap();
        let b = id_from_name("bpak-package").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_names_usually_differ() {
        let a = id_from_name("bpak-package").unwrap();
        let b = id_from_name("bpak-package-uid").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn transport_algorithm_names_round_trip_through_id() {
        use crate::constants::TransportAlgorithm;

        let id = id_from_name(TransportAlgorithm::Heatshrink.name()).unwrap();
        assert_eq!(TransportAlgorithm::from_id(id), Some(TransportAlgorithm::Heatshrink));
    }
}
