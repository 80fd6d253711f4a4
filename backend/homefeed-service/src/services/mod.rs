pub mod assembler;
pub mod blocks;
pub mod embedding;
pub mod keywords;
pub mod neighbors;
pub mod preferences;
pub mod recommendation;
pub mod signals;

pub use assembler::HomeFeedAssembler;
pub use blocks::BlockProvider;
pub use embedding::{EmbeddingGenerator, EmbeddingIndexer, HttpEmbeddingGenerator, IndexOutcome};
pub use keywords::KeywordNormalizer;
pub use neighbors::{PresentationNeighborRecomputeService, RecomputeOutcome};
pub use preferences::{PreferenceLearner, PreferenceService};
pub use recommendation::{RecommendationEngine, RecommendationResult};
pub use signals::{CategorySignals, ViewerSignalProvider, ViewerSignals};
