use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine as _};
use quarry_rig_world::{
    persistence::{decode_rig, encode_rig, PersistenceError},
    RigState,
};
use thiserror::Error;

const SNAPSHOT_DOMAIN: &str = "rig";
const SNAPSHOT_VERSION: &str = "v1";

/// Identifier prefix emitted before the encoded snapshot payload.
pub(crate) const SNAPSHOT_HEADER: &str = "rig:v1";
/// Delimiter used to separate the prefix, version and payload.
const FIELD_DELIMITER: char = ':';

/// Encodes a rig into a single-line string suitable for clipboard transfer.
pub(crate) fn encode(rig: &RigState) -> Result<String, SnapshotTransferError> {
    let bytes = encode_rig(rig).map_err(SnapshotTransferError::Encode)?;
    Ok(format!("{SNAPSHOT_HEADER}:{}", STANDARD_NO_PAD.encode(bytes)))
}

/// Decodes a rig from a string produced by [`encode`].
pub(crate) fn decode(value: &str) -> Result<RigState, SnapshotTransferError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SnapshotTransferError::EmptyPayload);
    }

    let mut parts = trimmed.splitn(3, FIELD_DELIMITER);
    let domain = parts.next().ok_or(SnapshotTransferError::MissingPrefix)?;
    let version = parts.next().ok_or(SnapshotTransferError::MissingVersion)?;
    let payload = parts.next().ok_or(SnapshotTransferError::MissingPayload)?;

    if domain != SNAPSHOT_DOMAIN {
        return Err(SnapshotTransferError::InvalidPrefix(domain.to_owned()));
    }
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotTransferError::UnsupportedVersion(version.to_owned()));
    }

    let bytes = STANDARD_NO_PAD
        .decode(payload.as_bytes())
        .map_err(SnapshotTransferError::InvalidEncoding)?;
    decode_rig(&bytes).map_err(SnapshotTransferError::InvalidPayload)
}

/// Errors that can occur while moving rig snapshots through text.
#[derive(Debug, Error)]
pub(crate) enum SnapshotTransferError {
    /// The provided string was empty or contained only whitespace.
    #[error("snapshot string was empty")]
    EmptyPayload,
    /// The prefix segment was missing from the encoded snapshot.
    #[error("snapshot string is missing the prefix")]
    MissingPrefix,
    /// The encoded snapshot did not contain a version segment.
    #[error("snapshot string is missing the version")]
    MissingVersion,
    /// The encoded snapshot did not include the payload segment.
    #[error("snapshot string is missing the payload")]
    MissingPayload,
    /// The encoded snapshot used an unexpected prefix segment.
    #[error("snapshot prefix '{0}' is not supported")]
    InvalidPrefix(String),
    /// The encoded snapshot used an unsupported version identifier.
    #[error("snapshot version '{0}' is not supported")]
    UnsupportedVersion(String),
    /// The base64 payload could not be decoded.
    #[error("could not decode snapshot payload")]
    InvalidEncoding(#[source] base64::DecodeError),
    /// The decoded payload does not hold a rig.
    #[error("could not parse snapshot payload")]
    InvalidPayload(#[source] PersistenceError),
    /// The rig could not be serialised.
    #[error("could not encode rig snapshot")]
    Encode(#[source] PersistenceError),
}

#[cfg(test)]
mod tests {
    use quarry_rig_core::{envelope_bounds, BlockPos, EnvelopeSize, Facing, RigId};
    use quarry_rig_world::Placement;

    use super::*;

    fn rig() -> RigState {
        let anchor = BlockPos::new(-6, 40, 12);
        let facing = Facing::South;
        let size = EnvelopeSize::new(9, 9, 10);
        RigState::new(
            RigId::new(42),
            Placement {
                anchor,
                facing,
                size,
                lowest_layer_y: 12,
                bounds: envelope_bounds(anchor, facing, size, 2).expect("bounds"),
            },
        )
    }

    #[test]
    fn round_trip_fresh_rig() {
        let encoded = encode(&rig()).expect("snapshot encodes");
        assert!(encoded.starts_with(&format!("{SNAPSHOT_HEADER}:")));

        let decoded = decode(&encoded).expect("snapshot decodes");
        assert_eq!(decoded.id(), RigId::new(42));
        assert_eq!(decoded.placement(), rig().placement());
        assert_eq!(decoded.mining(), rig().mining());
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let encoded = format!("  {}\n", encode(&rig()).expect("snapshot encodes"));
        assert!(decode(&encoded).is_ok());
    }

    #[test]
    fn rejects_foreign_prefix_and_version() {
        assert!(matches!(
            decode("pit:v1:AAAA"),
            Err(SnapshotTransferError::InvalidPrefix(prefix)) if prefix == "pit"
        ));
        assert!(matches!(
            decode("rig:v2:AAAA"),
            Err(SnapshotTransferError::UnsupportedVersion(version)) if version == "v2"
        ));
        assert!(matches!(
            decode("rig:v1"),
            Err(SnapshotTransferError::MissingPayload)
        ));
        assert!(matches!(decode("   "), Err(SnapshotTransferError::EmptyPayload)));
    }

    #[test]
    fn rejects_corrupt_payload() {
        assert!(matches!(
            decode("rig:v1:%%%"),
            Err(SnapshotTransferError::InvalidEncoding(_))
        ));
        assert!(matches!(
            decode("rig:v1:AAAA"),
            Err(SnapshotTransferError::InvalidPayload(_))
        ));
    }
}
