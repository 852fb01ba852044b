//! Data types stored in the archive header.

/// Descriptive metadata stored in the archive header.
///
/// None of it affects playback; it exists so tooling and logs can tell
/// archives apart.
///
/// # Examples
///
/// ```
/// use rewind_archive::ArchiveMetadata;
///
/// let meta = ArchiveMetadata {
///     server_name: "lobby-1".into(),
///     protocol_version: 47,
///     recorded_at_ms: 1_700_000_000_000,
///     duration_ms: 90_000,
///     generator: "rewind 0.1.0".into(),
/// };
///
/// assert_eq!(meta.protocol_version, 47);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ArchiveMetadata {
    /// Name of the server the session was recorded on.
    pub server_name: String,
    /// Protocol version of the recorded packets.
    pub protocol_version: u32,
    /// Unix time in milliseconds when recording started.
    pub recorded_at_ms: u64,
    /// Timestamp of the last record, in milliseconds.
    pub duration_ms: u32,
    /// Tool that produced the archive.
    pub generator: String,
}
