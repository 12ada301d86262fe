pub mod fasta;
pub mod metadata;
pub mod sequence;
pub mod tree;

pub use metadata::{LineageReport, MetadataTable};
pub use sequence::Sequence;
pub use tree::PhyloTree;
