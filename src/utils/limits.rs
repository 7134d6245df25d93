/// Maximum size of a single chunk entry (1 MiB)
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Long-edge target for re-encoded photos, in pixels
pub const MAX_LONG_EDGE: u32 = 800;

/// JPEG quality used by the re-encoding codec (0.7 on a 0..1 scale)
pub const JPEG_QUALITY: u8 = 70;

/// Default per-entry ceiling of the local store
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 2 * CHUNK_SIZE;

/// Chunk fetches kept in flight while reassembling one object
pub const CHUNK_READ_CONCURRENCY: usize = 8;
