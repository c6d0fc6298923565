// Re-export all public modules
pub mod shared;
pub mod as_graph;
pub mod path_diversity;
pub mod report;
pub mod as_graph_generators;
pub mod prefix_to_as;
pub mod traceroute;

// Re-export commonly used types at the crate root
pub use as_graph::{AS, ASGraph, ASN};
pub use as_graph_generators::{ASGraphGenerator, CAIDAASGraphGenerator, FileASGraphGenerator};
pub use path_diversity::{classify_targets, diversity_query, DiversityReport, PathDiversity};
pub use prefix_to_as::PrefixToAs;
pub use report::{DiversityRun, NeighborSummary};
pub use shared::{EdgeOrientation, RelCode, Relationship, RelationshipRecord};
