//! Edge-list input files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::protocol::Graph;

/// Number of distinct sample files the client cycles through.
pub const SAMPLE_COUNT: usize = 10;

/// Path of the sample input used for the `n`-th request.
pub fn sample_input_path(dir: &Path, n: usize) -> PathBuf {
    dir.join(format!("sample_input_{}.txt", n % SAMPLE_COUNT))
}

/// Parse `a b` edge lines; any line without exactly two fields is skipped.
pub fn parse_edge_list(text: &str) -> Graph {
    Graph::from_edges(text.lines().filter_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(from), Some(to), None) => Some((from, to)),
            _ => None,
        }
    }))
}

pub fn read_edge_list(path: &Path) -> io::Result<Graph> {
    Ok(parse_edge_list(&fs::read_to_string(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_edges_and_skips_noise() {
        let graph = parse_edge_list("1 2\n# comment line here\n2 3\n\n  3 1  \nlonely\n");
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.neighbors("1").unwrap(), ["2"]);
        assert_eq!(graph.neighbors("3").unwrap(), ["1"]);
    }

    #[test]
    fn sink_vertices_become_keys() {
        let graph = parse_edge_list("A B\n");
        assert!(graph.neighbors("B").unwrap().is_empty());
    }

    #[test]
    fn cycles_through_samples() {
        let dir = Path::new("inputs");
        assert_eq!(sample_input_path(dir, 3), dir.join("sample_input_3.txt"));
        assert_eq!(sample_input_path(dir, 10), dir.join("sample_input_0.txt"));
    }

    #[test]
    fn reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.txt");
        fs::write(&path, "x y\ny z\n").unwrap();
        assert_eq!(read_edge_list(&path).unwrap().vertex_count(), 3);
        assert!(read_edge_list(&dir.path().join("missing.txt")).is_err());
    }
}
