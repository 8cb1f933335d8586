pub mod aggregator;
pub mod feed_generator;
pub mod ranking;
pub mod retry;
pub mod sampling;

pub use aggregator::{BatchOutcome, PreferenceAggregator};
pub use feed_generator::{assemble_feed, CandidatePools, FeedGenerator, FeedSettings};
pub use retry::RetryPolicy;
