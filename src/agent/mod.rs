pub mod cold_storage;
pub mod compressor;
pub mod instance;
pub mod prompt;
pub mod transcript;

pub use cold_storage::{ChunkRecord, ChunkRef, ColdStorage};
pub use compressor::{compress_session, CompressionOutcome};
pub use instance::AgentInstance;
pub use transcript::format_chunk_transcript;
