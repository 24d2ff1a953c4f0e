pub mod chunker;
pub mod loader;
pub mod normalizer;
pub mod repair;
pub mod rewrite;

pub use chunker::{Chunk, HeaderContext, SectionChunker};
pub use loader::{CandidateDocument, DocumentLoader, NormalizedDocument, RawDocument, SourceKind};
pub use normalizer::MarkupNormalizer;
pub use repair::repair_table_structure;
pub use rewrite::{apply_passes, RewritePass, POST_PASSES};
