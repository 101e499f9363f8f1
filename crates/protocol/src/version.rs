/// A client and server disagree on the protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("script version mismatch: expected {expected}, but server requires {actual}")]
pub struct VersionMismatch {
    /// Version embedded in the client.
    pub expected: u32,
    /// Version announced by the server.
    pub actual: i64,
}

/// Checks a server-announced version against the client's own.
///
/// Only an exact match is compatible.
pub fn check_script_version(expected: u32, actual: i64) -> Result<(), VersionMismatch> {
    if i64::from(expected) == actual {
        Ok(())
    } else {
        Err(VersionMismatch { expected, actual })
    }
}
