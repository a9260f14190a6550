//! Graph partitioning
//!
//! Clustering (triangles into clusters) and grouping (clusters into groups)
//! both reduce to k-way graph partitioning. The [`Partitioner`] trait takes a
//! graph and returns one part id per vertex; two backends exist:
//!
//! - [`MultilevelPartitioner`]: in-process multilevel recursive bisection.
//! - [`SubprocessPartitioner`]: external METIS-compatible executables driven
//!   through the text file protocol in [`metis_file`].
//!
//! Author: Moroya Sakamoto

mod graph;
pub mod metis_file;
mod multilevel;
mod subprocess;

pub use graph::Graph;
pub use multilevel::MultilevelPartitioner;
pub use subprocess::SubprocessPartitioner;

use crate::config::PartitionerKind;
use thiserror::Error;

/// Partitioner failures
#[derive(Error, Debug)]
pub enum PartitionError {
    /// The external program could not be started or exited with an error
    #[error("partitioner process failed: {0}")]
    Process(String),

    /// The external program reported an error on its output streams
    #[error("partitioner reported an error: {0}")]
    ErrorSignature(String),

    /// The partition file is missing lines or holds bad ids
    #[error("malformed partitioner output: {0}")]
    MalformedOutput(String),

    /// Exchange file I/O error
    #[error("partitioner I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input graph is not a valid undirected graph
    #[error("invalid graph: {0}")]
    InvalidGraph(String),
}

/// Partitioning knobs shared by both backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionOptions {
    /// Ask for connected parts
    pub contiguous: bool,
    /// Allowed load imbalance in 1/1000 of the target part weight
    pub imbalance: u32,
}

impl Default for PartitionOptions {
    fn default() -> Self {
        PartitionOptions {
            contiguous: true,
            imbalance: 0,
        }
    }
}

impl PartitionOptions {
    /// Options for the single retry after a failure
    pub fn relaxed(&self) -> Self {
        PartitionOptions {
            contiguous: false,
            imbalance: self.imbalance.max(100),
        }
    }
}

/// k-way partitioning backend
pub trait Partitioner: Send + Sync {
    /// Partition the vertices of `graph` into `parts` parts.
    ///
    /// Returns one part id in `0..parts` per vertex.
    fn partition_graph(
        &self,
        graph: &Graph,
        parts: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<u32>, PartitionError>;

    /// Partition triangles through their dual graph (edge-sharing triangles
    /// are adjacent). Returns one part id per element.
    fn partition_mesh_dual(
        &self,
        elements: &[[u32; 3]],
        node_count: usize,
        parts: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<u32>, PartitionError> {
        let dual = Graph::dual(elements, node_count, 2)?;
        self.partition_graph(&dual, parts, options)
    }

    /// Backend name for log output
    fn name(&self) -> &'static str;
}

/// Instantiate the backend named by a configuration
pub fn from_kind(kind: &PartitionerKind) -> Box<dyn Partitioner> {
    match kind {
        PartitionerKind::InProcess => Box::new(MultilevelPartitioner::default()),
        PartitionerKind::Subprocess {
            graph_program,
            mesh_program,
            work_dir,
            extra_args,
        } => Box::new(SubprocessPartitioner {
            graph_program: graph_program.clone(),
            mesh_program: mesh_program.clone(),
            work_dir: work_dir.clone(),
            extra_args: extra_args.clone(),
        }),
    }
}

/// Run `attempt` with `options`; on failure, log and retry once relaxed.
///
/// Returns the second error when both attempts fail.
pub fn with_relaxed_retry<T>(
    options: &PartitionOptions,
    what: &str,
    mut attempt: impl FnMut(&PartitionOptions) -> Result<T, PartitionError>,
) -> Result<T, PartitionError> {
    match attempt(options) {
        Ok(v) => Ok(v),
        Err(first) => {
            log::warn!("{} partitioning failed ({}), retrying with relaxed options", what, first);
            attempt(&options.relaxed())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaxed_drops_contiguity() {
        let relaxed = PartitionOptions::default().relaxed();
        assert!(!relaxed.contiguous);
        assert_eq!(relaxed.imbalance, 100);
    }

    #[test]
    fn test_retry_once() {
        let mut calls = 0;
        let result = with_relaxed_retry(&PartitionOptions::default(), "test", |opts| {
            calls += 1;
            if opts.contiguous {
                Err(PartitionError::ErrorSignature("***".to_string()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_retry_gives_up_after_second_failure() {
        let mut calls = 0;
        let result: Result<(), _> = with_relaxed_retry(&PartitionOptions::default(), "test", |_| {
            calls += 1;
            Err(PartitionError::Process("exit 1".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_dual_partition_default_method() {
        let p = MultilevelPartitioner::default();
        // strip of 8 triangles
        let elements: Vec<[u32; 3]> = (0..8u32)
            .map(|i| if i % 2 == 0 { [i, i + 1, i + 2] } else { [i + 1, i, i + 2] })
            .collect();
        let parts = p
            .partition_mesh_dual(&elements, 10, 2, &PartitionOptions::default())
            .unwrap();
        assert_eq!(parts.iter().filter(|&&p| p == 0).count(), 4);
    }
}
