//! External partitioner adapter
//!
//! Drives `gpmetis`/`mpmetis`-compatible programs: the graph or mesh is
//! written to a uniquely named file, the program is run as
//! `<program> [args] <file> <k>`, and the sidecar partition file is read
//! back. Exchange files are removed afterwards.
//!
//! Author: Moroya Sakamoto

use super::{metis_file, Graph, PartitionError, PartitionOptions, Partitioner};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

static EXCHANGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Partitioner backed by external executables
#[derive(Debug, Clone)]
pub struct SubprocessPartitioner {
    /// Weighted graph partitioner (`gpmetis` style)
    pub graph_program: PathBuf,
    /// Dual-graph mesh partitioner (`mpmetis` style)
    pub mesh_program: PathBuf,
    /// Exchange directory (system temp dir when `None`)
    pub work_dir: Option<PathBuf>,
    /// Extra arguments placed before the file name
    pub extra_args: Vec<String>,
}

impl SubprocessPartitioner {
    /// Adapter using the given programs and the system temp dir
    pub fn new(graph_program: impl Into<PathBuf>, mesh_program: impl Into<PathBuf>) -> Self {
        Self {
            graph_program: graph_program.into(),
            mesh_program: mesh_program.into(),
            work_dir: None,
            extra_args: Vec::new(),
        }
    }

    fn exchange_path(&self, ext: &str) -> PathBuf {
        let dir = self.work_dir.clone().unwrap_or_else(std::env::temp_dir);
        let n = EXCHANGE_COUNTER.fetch_add(1, Ordering::Relaxed);
        dir.join(format!("alice-nanite-{}-{}.{}", std::process::id(), n, ext))
    }

    fn option_args(options: &PartitionOptions, graph: bool) -> Vec<String> {
        let mut args = Vec::new();
        if options.contiguous && graph {
            args.push("-contig".to_string());
        }
        if options.imbalance > 0 {
            args.push(format!("-ufactor={}", options.imbalance));
        }
        if !graph {
            args.push("-ncommon=2".to_string());
        }
        args
    }

    fn run(
        &self,
        program: &Path,
        input: &Path,
        parts: usize,
        args: &[String],
    ) -> Result<(), PartitionError> {
        log::debug!("running {} on {} ({} parts)", program.display(), input.display(), parts);
        let output = Command::new(program)
            .args(&self.extra_args)
            .args(args)
            .arg(input)
            .arg(parts.to_string())
            .output()
            .map_err(|e| PartitionError::Process(format!("{}: {}", program.display(), e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(PartitionError::Process(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }
        if let Some(line) = error_signature(&stdout).or_else(|| error_signature(&stderr)) {
            return Err(PartitionError::ErrorSignature(line.to_string()));
        }
        Ok(())
    }
}

/// First output line carrying a METIS error marker
fn error_signature(text: &str) -> Option<&str> {
    text.lines()
        .find(|l| l.contains("Error") || l.contains("***"))
        .map(str::trim)
}

fn sidecar(input: &Path, kind: &str, parts: usize) -> PathBuf {
    let mut name = input.as_os_str().to_owned();
    name.push(format!(".{}.{}", kind, parts));
    PathBuf::from(name)
}

fn remove_quietly(paths: &[&Path]) {
    for p in paths {
        if let Err(e) = std::fs::remove_file(p) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("could not remove {}: {}", p.display(), e);
            }
        }
    }
}

impl Partitioner for SubprocessPartitioner {
    fn partition_graph(
        &self,
        graph: &Graph,
        parts: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<u32>, PartitionError> {
        graph.validate()?;
        let n = graph.vertex_count();
        if parts <= 1 || n <= 1 {
            return Ok(vec![0; n]);
        }
        let input = self.exchange_path("graph");
        let output = sidecar(&input, "part", parts);
        let result = (|| {
            metis_file::write_graph(graph, BufWriter::new(File::create(&input)?))?;
            self.run(&self.graph_program, &input, parts, &Self::option_args(options, true))?;
            metis_file::read_partition(BufReader::new(File::open(&output)?), n, parts)
        })();
        remove_quietly(&[&input, &output]);
        result
    }

    fn partition_mesh_dual(
        &self,
        elements: &[[u32; 3]],
        node_count: usize,
        parts: usize,
        options: &PartitionOptions,
    ) -> Result<Vec<u32>, PartitionError> {
        if let Some(bad) = elements.iter().flatten().find(|&&n| n as usize >= node_count) {
            return Err(PartitionError::InvalidGraph(format!("node {} out of range", bad)));
        }
        let ne = elements.len();
        if parts <= 1 || ne <= 1 {
            return Ok(vec![0; ne]);
        }
        let input = self.exchange_path("mesh");
        let epart = sidecar(&input, "epart", parts);
        let npart = sidecar(&input, "npart", parts);
        let result = (|| {
            metis_file::write_mesh(elements, BufWriter::new(File::create(&input)?))?;
            self.run(&self.mesh_program, &input, parts, &Self::option_args(options, false))?;
            metis_file::read_partition(BufReader::new(File::open(&epart)?), ne, parts)
        })();
        remove_quietly(&[&input, &epart, &npart]);
        result
    }

    fn name(&self) -> &'static str {
        "subprocess"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_signature() {
        assert_eq!(error_signature("ok\n***Cannot bisect\n"), Some("***Cannot bisect"));
        assert_eq!(error_signature("Input Error: bad"), Some("Input Error: bad"));
        assert_eq!(error_signature("Partitioning done"), None);
    }

    #[test]
    fn test_option_args() {
        let strict = SubprocessPartitioner::option_args(&PartitionOptions::default(), true);
        assert_eq!(strict, vec!["-contig".to_string()]);
        let relaxed = SubprocessPartitioner::option_args(&PartitionOptions::default().relaxed(), true);
        assert_eq!(relaxed, vec!["-ufactor=100".to_string()]);
        let mesh = SubprocessPartitioner::option_args(&PartitionOptions::default(), false);
        assert_eq!(mesh, vec!["-ncommon=2".to_string()]);
    }

    #[test]
    fn test_sidecar_name() {
        let p = sidecar(Path::new("/tmp/a.graph"), "part", 4);
        assert_eq!(p, PathBuf::from("/tmp/a.graph.part.4"));
    }

    #[test]
    fn test_missing_program_is_process_error() {
        let dir = tempfile::tempdir().unwrap();
        let partitioner = SubprocessPartitioner {
            work_dir: Some(dir.path().to_path_buf()),
            ..SubprocessPartitioner::new("/nonexistent/gpmetis", "/nonexistent/mpmetis")
        };
        let graph = Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1), (2, 3, 1)]).unwrap();
        let err = partitioner
            .partition_graph(&graph, 2, &PartitionOptions::default())
            .unwrap_err();
        assert!(matches!(err, PartitionError::Process(_)));
        // exchange file cleaned up
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_script_partitioner_round_trip() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        // fake gpmetis: alternate parts 0/1 per vertex line
        let script = dir.path().join("fake-gpmetis");
        std::fs::write(
            &script,
            "#!/bin/sh\nfile=\"$2\"\nk=\"$3\"\nn=$(head -n 1 \"$file\" | cut -d' ' -f1)\ni=0\n: > \"$file.part.$k\"\nwhile [ $i -lt $n ]; do echo $((i % 2)) >> \"$file.part.$k\"; i=$((i+1)); done\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let partitioner = SubprocessPartitioner {
            work_dir: Some(dir.path().to_path_buf()),
            ..SubprocessPartitioner::new(&script, &script)
        };
        let graph = Graph::from_edges(4, &[(0, 1, 1), (1, 2, 1), (2, 3, 1)]).unwrap();
        let parts = partitioner
            .partition_graph(&graph, 2, &PartitionOptions::default())
            .unwrap();
        assert_eq!(parts, vec![0, 1, 0, 1]);
    }
}
