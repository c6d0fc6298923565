pub mod caida;
pub mod random;

use std::path::PathBuf;

use crate::as_graph::ASGraph;
use crate::shared::EdgeOrientation;

pub use random::RandomASGraphGenerator;

pub trait ASGraphGenerator {
    fn generate(&self) -> Result<ASGraph, Box<dyn std::error::Error>>;
}

/// Loads a graph from a relationship file already on disk.
pub struct FileASGraphGenerator {
    pub path: PathBuf,
    pub orientation: EdgeOrientation,
}

impl FileASGraphGenerator {
    pub fn new(path: PathBuf) -> Self {
        FileASGraphGenerator {
            path,
            orientation: EdgeOrientation::default(),
        }
    }

    pub fn with_orientation(mut self, orientation: EdgeOrientation) -> Self {
        self.orientation = orientation;
        self
    }
}

impl ASGraphGenerator for FileASGraphGenerator {
    fn generate(&self) -> Result<ASGraph, Box<dyn std::error::Error>> {
        let (records, metadata) = caida::read_relationship_file(&self.path)?;
        let as_graph = ASGraph::from_records_with(&records, self.orientation)
            .with_metadata(metadata.tier_1_asns, metadata.ixp_asns);
        Ok(as_graph)
    }
}

pub struct CAIDAASGraphGenerator {
    pub days_ago: u32,
    pub cache_dir: PathBuf,
    pub orientation: EdgeOrientation,
}

impl CAIDAASGraphGenerator {
    pub fn new() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pathdiversity");

        CAIDAASGraphGenerator {
            days_ago: 10,
            cache_dir,
            orientation: EdgeOrientation::default(),
        }
    }

    pub fn with_days_ago(mut self, days: u32) -> Self {
        self.days_ago = days;
        self
    }

    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = dir;
        self
    }

    pub fn with_orientation(mut self, orientation: EdgeOrientation) -> Self {
        self.orientation = orientation;
        self
    }
}

impl Default for CAIDAASGraphGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl ASGraphGenerator for CAIDAASGraphGenerator {
    fn generate(&self) -> Result<ASGraph, Box<dyn std::error::Error>> {
        let collector = caida::CAIDAASGraphCollector::new(self.days_ago, &self.cache_dir);
        let cached_path = collector.run()?;

        FileASGraphGenerator::new(cached_path)
            .with_orientation(self.orientation)
            .generate()
    }
}
