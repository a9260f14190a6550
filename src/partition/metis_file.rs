//! METIS text exchange format
//!
//! Graph file: header `"<n> <m> [fmt]"`, then one line per vertex with
//! `[vwgt] neighbour [weight] ...` using 1-based neighbour ids. `fmt` is
//! `001` for edge weights and `011` for vertex plus edge weights.
//!
//! Mesh file: header `"<ne>"`, then one line per element with its 1-based
//! node ids.
//!
//! Partition file: one zero-based part id per line, one line per vertex or
//! element, written next to the input as `<file>.part.<k>` or
//! `<file>.epart.<k>`.
//!
//! Author: Moroya Sakamoto

use super::{Graph, PartitionError};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// Write a graph in METIS format
pub fn write_graph<W: Write>(graph: &Graph, mut w: W) -> Result<(), PartitionError> {
    let vertex_weights = graph.has_vertex_weights();
    let edge_weights = graph.has_edge_weights();
    write!(w, "{} {}", graph.vertex_count(), graph.edge_count())?;
    match (vertex_weights, edge_weights) {
        (true, _) => writeln!(w, " 011")?,
        (false, true) => writeln!(w, " 001")?,
        (false, false) => writeln!(w)?,
    }
    for v in 0..graph.vertex_count() {
        let mut first = true;
        if vertex_weights {
            write!(w, "{}", graph.vwgt[v])?;
            first = false;
        }
        for (u, wt) in graph.neighbors(v) {
            if !first {
                write!(w, " ")?;
            }
            first = false;
            write!(w, "{}", u + 1)?;
            if vertex_weights || edge_weights {
                write!(w, " {}", wt)?;
            }
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a graph in METIS format (comment lines starting with `%` skipped)
pub fn read_graph<R: BufRead>(r: R) -> Result<Graph, PartitionError> {
    let mut lines = r.lines().filter(|l| match l {
        Ok(s) => !s.trim_start().starts_with('%'),
        Err(_) => true,
    });
    let header = lines
        .next()
        .ok_or_else(|| PartitionError::MalformedOutput("empty graph file".to_string()))??;
    let fields: Vec<&str> = header.split_whitespace().collect();
    if fields.len() < 2 {
        return Err(PartitionError::MalformedOutput(format!("bad graph header '{}'", header)));
    }
    let n: usize = parse(fields[0])?;
    let m: usize = parse(fields[1])?;
    let fmt = fields.get(2).copied().unwrap_or("0");
    let fmt = format!("{:0>3}", fmt);
    let vertex_weights = fmt.as_bytes()[1] == b'1';
    let edge_weights = fmt.as_bytes()[2] == b'1';

    let mut lists: Vec<BTreeMap<u32, u32>> = Vec::with_capacity(n);
    let mut vwgt = Vec::with_capacity(n);
    for v in 0..n {
        let line = lines
            .next()
            .ok_or_else(|| PartitionError::MalformedOutput(format!("missing line for vertex {}", v + 1)))??;
        let mut values = line.split_whitespace().map(parse::<u32>);
        let weight = if vertex_weights {
            values
                .next()
                .ok_or_else(|| PartitionError::MalformedOutput(format!("vertex {} lacks a weight", v + 1)))??
        } else {
            1
        };
        vwgt.push(weight);
        let mut list = BTreeMap::new();
        while let Some(u) = values.next() {
            let u = u?;
            if u == 0 || u as usize > n {
                return Err(PartitionError::MalformedOutput(format!("neighbour {} out of range", u)));
            }
            let wt = if edge_weights {
                values
                    .next()
                    .ok_or_else(|| PartitionError::MalformedOutput("missing edge weight".to_string()))??
            } else {
                1
            };
            list.insert(u - 1, wt);
        }
        lists.push(list);
    }

    let mut graph = Graph::default();
    graph.xadj.push(0);
    for list in &lists {
        for (&u, &wt) in list {
            graph.adjncy.push(u);
            graph.adjwgt.push(wt);
        }
        graph.xadj.push(graph.adjncy.len() as u32);
    }
    graph.vwgt = vwgt;
    if graph.edge_count() != m {
        return Err(PartitionError::MalformedOutput(format!(
            "header declares {} edges, found {}",
            m,
            graph.edge_count()
        )));
    }
    graph.validate()?;
    Ok(graph)
}

/// Write a triangle mesh in METIS mesh format
pub fn write_mesh<W: Write>(elements: &[[u32; 3]], mut w: W) -> Result<(), PartitionError> {
    writeln!(w, "{}", elements.len())?;
    for [a, b, c] in elements {
        writeln!(w, "{} {} {}", a + 1, b + 1, c + 1)?;
    }
    w.flush()?;
    Ok(())
}

/// Read a partition file, checking the line count and the id range
pub fn read_partition<R: BufRead>(r: R, expected: usize, parts: usize) -> Result<Vec<u32>, PartitionError> {
    let mut out = Vec::with_capacity(expected);
    for line in r.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id: u32 = parse(line)?;
        if id as usize >= parts {
            return Err(PartitionError::MalformedOutput(format!(
                "part id {} on line {} exceeds {} parts",
                id,
                out.len() + 1,
                parts
            )));
        }
        out.push(id);
    }
    if out.len() != expected {
        return Err(PartitionError::MalformedOutput(format!(
            "expected {} part ids, read {}",
            expected,
            out.len()
        )));
    }
    Ok(out)
}

fn parse<T: std::str::FromStr>(s: &str) -> Result<T, PartitionError> {
    s.parse()
        .map_err(|_| PartitionError::MalformedOutput(format!("'{}' is not a number", s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_write_unweighted() {
        let g = Graph::from_edges(3, &[(0, 1, 1), (1, 2, 1)]).unwrap();
        let mut buf = Vec::new();
        write_graph(&g, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "3 2\n2\n1 3\n2\n");
    }

    #[test]
    fn test_write_edge_weighted() {
        let g = Graph::from_edges(2, &[(0, 1, 7)]).unwrap();
        let mut buf = Vec::new();
        write_graph(&g, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "2 1 001\n2 7\n1 7\n");
    }

    #[test]
    fn test_read_back_weighted_graph() {
        let mut g = Graph::from_edges(4, &[(0, 1, 3), (1, 2, 1), (2, 3, 4), (3, 0, 2)]).unwrap();
        g.vwgt = vec![1, 2, 1, 3];
        let mut buf = Vec::new();
        write_graph(&g, &mut buf).unwrap();
        let back = read_graph(Cursor::new(buf)).unwrap();
        assert_eq!(back, g);
    }

    #[test]
    fn test_read_rejects_wrong_edge_count() {
        let text = "2 5\n2\n1\n";
        assert!(matches!(
            read_graph(Cursor::new(text)),
            Err(PartitionError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_write_mesh_is_one_based() {
        let mut buf = Vec::new();
        write_mesh(&[[0, 1, 2], [2, 1, 3]], &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "2\n1 2 3\n3 2 4\n");
    }

    #[test]
    fn test_read_partition() {
        let ids = read_partition(Cursor::new("0\n1\n1\n\n"), 3, 2).unwrap();
        assert_eq!(ids, vec![0, 1, 1]);
        assert!(read_partition(Cursor::new("0\n2\n"), 2, 2).is_err());
        assert!(read_partition(Cursor::new("0\n"), 2, 2).is_err());
        assert!(read_partition(Cursor::new("x\n"), 1, 2).is_err());
    }
}
