use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use log::info;

use crate::as_graph::ASGraph;
use crate::path_diversity::DiversityReport;
use crate::shared::{GraphError, ASN};

/// Degree and neighbour summary of one AS.
#[derive(Debug, Clone)]
pub struct NeighborSummary {
    pub asn: ASN,
    pub in_degree: usize,
    pub out_degree: usize,
    pub providers: BTreeSet<ASN>,
    pub peers: BTreeSet<ASN>,
    pub customers: BTreeSet<ASN>,
    /// Neighbours with at most `threshold` predecessors that link back.
    pub low_degree_neighbors: Vec<ASN>,
    pub other_neighbors: Vec<ASN>,
    /// Node count of the subgraph around the AS and `other_neighbors`.
    pub subgraph_nodes: usize,
}

impl NeighborSummary {
    pub fn new(as_graph: &ASGraph, asn: ASN, threshold: usize) -> Result<Self, GraphError> {
        let as_obj = as_graph.get_as(asn).ok_or(GraphError::UnknownAs(asn))?;
        as_graph.neighbor_consistency(asn)?;

        let mut low_degree_neighbors = Vec::new();
        let mut other_neighbors = Vec::new();
        for neighbor in as_graph.successors(asn) {
            let links_back = as_graph.graph.contains_edge(neighbor, asn);
            if as_graph.in_degree(neighbor) <= threshold && links_back {
                low_degree_neighbors.push(neighbor);
            } else {
                other_neighbors.push(neighbor);
            }
        }

        let subgraph_nodes = as_graph.subgraph(asn, &other_neighbors).node_count();

        Ok(NeighborSummary {
            asn,
            in_degree: as_graph.in_degree(asn),
            out_degree: as_graph.out_degree(asn),
            providers: as_obj.providers,
            peers: as_obj.peers,
            customers: as_obj.customers,
            low_degree_neighbors,
            other_neighbors,
            subgraph_nodes,
        })
    }

    pub fn text_lines(&self) -> Vec<String> {
        vec![
            format!("In-Degree of AS {} is {}", self.asn, self.in_degree),
            format!("Out-Degree of AS {} is {}", self.asn, self.out_degree),
            format!(
                "AS {} has {} neighbours",
                self.asn,
                self.low_degree_neighbors.len() + self.other_neighbors.len()
            ),
            format!("Providers ({}): {}", self.providers.len(), join_asns(&self.providers)),
            format!("Peers ({}): {}", self.peers.len(), join_asns(&self.peers)),
            format!("Customers ({}): {}", self.customers.len(), join_asns(&self.customers)),
            format!(
                "The number of nodes in subgraph around AS {} is {}",
                self.asn, self.subgraph_nodes
            ),
        ]
    }
}

fn join_asns<'a, I>(asns: I) -> String
where
    I: IntoIterator<Item = &'a ASN>,
{
    asns.into_iter()
        .map(|asn| asn.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn join_path(path: &[ASN]) -> String {
    format!("({})", join_asns(path))
}

impl DiversityReport {
    pub fn text_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "AS {} has {} providers and {} peers",
                self.source,
                self.providers.len(),
                self.peers.len()
            ),
        ];

        for finding in &self.targets {
            if !finding.is_improvable() {
                lines.push(format!("AS {}: no path diversity via providers or peers", finding.target));
                continue;
            }
            for (label, found) in [("provider", &finding.via_providers), ("peer", &finding.via_peers)] {
                for (candidate, diversity) in found {
                    lines.push(format!(
                        "AS {} reachable via {} AS {} through {}",
                        finding.target,
                        label,
                        candidate,
                        join_asns(&diversity.intermediates)
                    ));
                    for path in &diversity.paths {
                        lines.push(format!("       {}", join_path(path)));
                    }
                }
            }
        }

        lines.push(format!(
            "Improvable via providers: {}",
            join_asns(&self.improvable_via_providers())
        ));
        lines.push(format!("Improvable via peers: {}", join_asns(&self.improvable_via_peers())));
        lines.push(format!("Not improvable: {}", join_asns(&self.not_improvable())));
        lines
    }

    pub fn save_paths_json(&self, file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(&self.paths_by_target())?;
        fs::write(file_path, json)?;
        Ok(())
    }

    pub fn save_summary_json(&self, file_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let data = serde_json::json!({
            "source": self.source,
            "providers": self.providers,
            "peers": self.peers,
            "num_targets": self.targets.len(),
            "improvable_via_providers": self.improvable_via_providers(),
            "improvable_via_peers": self.improvable_via_peers(),
            "not_improvable": self.not_improvable(),
            "targets": self.targets,
        });
        fs::write(file_path, serde_json::to_string_pretty(&data)?)?;
        Ok(())
    }
}

/// One diversity analysis: a source AS against a list of targets.
pub struct DiversityRun<'a> {
    pub as_graph: &'a ASGraph,
    pub source: ASN,
    pub targets: Vec<ASN>,
    /// Directory the JSON outputs are written to.
    pub output_dir: PathBuf,
    pub show_progress: bool,
}

impl<'a> DiversityRun<'a> {
    pub fn new(as_graph: &'a ASGraph, source: ASN, targets: Vec<ASN>) -> Self {
        let output_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pathdiversity_output");

        DiversityRun {
            as_graph,
            source,
            targets,
            output_dir,
            show_progress: true,
        }
    }

    pub fn with_output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = dir;
        self
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn paths_file(&self) -> PathBuf {
        self.output_dir.join(format!("AS{}_paths.json", self.source))
    }

    pub fn summary_file(&self) -> PathBuf {
        self.output_dir.join(format!("AS{}_summary.json", self.source))
    }

    /// Classifies every target without writing anything.
    pub fn classify(&self) -> Result<DiversityReport, Box<dyn std::error::Error>> {
        let mut report = DiversityReport::for_source(self.as_graph, self.source)?;
        info!(
            "AS {}: {} providers, {} peers, {} targets",
            self.source,
            report.providers.len(),
            report.peers.len(),
            self.targets.len()
        );

        let pb = if self.show_progress {
            ProgressBar::new(self.targets.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40} {pos}/{len} targets")?
                .progress_chars("##-"),
        );

        for &target in &self.targets {
            report.assess(self.as_graph, target);
            pb.inc(1);
        }
        pb.finish();

        Ok(report)
    }

    /// Classifies and stores the path dump and summary in `output_dir`.
    pub fn run(&self) -> Result<DiversityReport, Box<dyn std::error::Error>> {
        fs::create_dir_all(&self.output_dir)?;
        let report = self.classify()?;

        report.save_paths_json(&self.paths_file())?;
        report.save_summary_json(&self.summary_file())?;
        info!("Results written to {:?}", self.output_dir);

        Ok(report)
    }
}
