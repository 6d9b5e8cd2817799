//! Binary encoding of a single rig's state.
//!
//! A snapshot is a `u16` format version followed by the bincode encoding of
//! [`RigState`]. Scheduler state is world-wide and never part of a snapshot.

use serde::Serialize;
use thiserror::Error;

use crate::RigState;

/// Version written in front of every snapshot.
pub const FORMAT_VERSION: u16 = 1;

/// Failures while encoding or decoding a rig snapshot.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The rig state could not be serialised.
    #[error("failed to encode rig state")]
    Encode(#[source] bincode::Error),
    /// The bytes do not hold a valid rig state.
    #[error("failed to decode rig state")]
    Decode(#[source] bincode::Error),
    /// The snapshot was written by an incompatible format version.
    #[error("unsupported rig snapshot version {found}")]
    Version {
        /// Version found in the snapshot header.
        found: u16,
    },
}

#[derive(Serialize)]
struct Snapshot<'a> {
    version: u16,
    rig: &'a RigState,
}

/// Encodes `rig` into a versioned snapshot.
pub fn encode_rig(rig: &RigState) -> Result<Vec<u8>, PersistenceError> {
    bincode::serialize(&Snapshot {
        version: FORMAT_VERSION,
        rig,
    })
    .map_err(PersistenceError::Encode)
}

/// Decodes a snapshot produced by [`encode_rig`].
pub fn decode_rig(bytes: &[u8]) -> Result<RigState, PersistenceError> {
    let version: u16 = bincode::deserialize(bytes).map_err(PersistenceError::Decode)?;
    if version != FORMAT_VERSION {
        return Err(PersistenceError::Version { found: version });
    }
    let (_, rig): (u16, RigState) =
        bincode::deserialize(bytes).map_err(PersistenceError::Decode)?;
    Ok(rig)
}
