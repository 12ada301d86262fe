pub mod config;
pub mod dedup;
pub mod neighbor_selector;
pub mod population;
pub mod quality_filter;
pub mod quota_sampler;
pub mod selection;
pub mod sequence_filter;
pub mod stats;

pub use config::Config;
pub use neighbor_selector::NeighborSelector;
pub use quota_sampler::QuotaSampler;
pub use sequence_filter::SequenceFilter;
