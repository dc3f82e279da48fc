//! Engine-wide size limits and layout constants.

/// Maximum number of simultaneously-live guest IR temporaries tracked by a
/// single instrumented block. Mirrors the original's `MAX_TEMPS`.
pub const MAX_TEMPS: usize = 2048;

/// Number of float-sized (4-byte) blocks a shadow temp can hold. A guest
/// temp is at most a 128-bit SIMD value, i.e. four 32-bit float lanes.
pub const MAX_TEMP_BLOCKS: usize = 4;

/// Byte width of one shadow-register-file slot. Floats are always
/// 4-byte-aligned at the slot granularity the engine tracks.
pub const TS_SLOT_BYTES: usize = 4;

/// Size, in bytes, of the modeled guest register file. Generous enough to
/// hold a typical ISA's general-purpose, vector, and flag registers.
pub const TS_SIZE_BYTES: usize = 8192;

/// Stable pool of single-letter names used when rendering generalized
/// expressions with abstracted variables.
pub const VARIABLE_NAMES: [&str; 8] = ["x", "y", "z", "w", "a", "b", "c", "d"];

/// Two-character request tag every `ClientRequest` must carry to be
/// recognized as belonging to this tool, per `spec.md` section 6.
pub const TOOL_TAG: [u8; 2] = *b"HS";

static_assertions::const_assert!(TS_SIZE_BYTES % TS_SLOT_BYTES == 0);
