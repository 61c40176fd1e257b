pub mod candidates;
pub mod clock;
pub mod preferences;
pub mod providers;
pub mod recommendations;
pub mod rerank;
pub mod scoring;
pub mod sessions;
pub mod tracker;

pub use clock::{Clock, SystemClock};
pub use providers::{CompletionError, CompletionProvider, OpenAiProvider, UnconfiguredProvider};
pub use recommendations::{PersonalizedRecommendations, RankingStrategy, RecommendationEngine};
pub use sessions::{FlushTaskHandle, SessionRegistry, SessionView, SharedTracker};
pub use tracker::BehaviorTracker;
