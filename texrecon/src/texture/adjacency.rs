use crate::mesh::{Mesh, VertexInfos};

// Face adjacency graph; node i is face i. Each node carries the label chosen
// by view selection (None is the invalid label).
#[derive(Clone, Debug, Default)]
pub struct Graph {
    adj_lists: Vec<Vec<usize>>,
    labels: Vec<Option<usize>>,
    num_edges: usize,
}

impl Graph {
    pub fn new(num_nodes: usize) -> Graph {
        Graph {
            adj_lists: vec![vec![]; num_nodes],
            labels: vec![None; num_nodes],
            num_edges: 0,
        }
    }

    // Faces sharing two vertices become neighbours. Non-manifold edges
    // connect all of their faces pairwise.
    pub fn build(mesh: &Mesh, vertex_infos: &VertexInfos) -> Graph {
        let mut graph = Graph::new(mesh.faces.len());
        for (f_idx, &[v0, v1, v2]) in mesh.faces.iter().enumerate() {
            for [a, b] in [[v0, v1], [v0, v2], [v1, v2]] {
                for other in vertex_infos.faces_around_edge(a, b) {
                    if other > f_idx {
                        graph.add_edge(f_idx, other);
                    }
                }
            }
        }
        graph
    }

    pub fn add_edge(&mut self, n1: usize, n2: usize) {
        if n1 == n2 || self.has_edge(n1, n2) {
            return;
        }
        for (a, b) in [(n1, n2), (n2, n1)] {
            let list = &mut self.adj_lists[a];
            let pos = list.partition_point(|&n| n < b);
            list.insert(pos, b);
        }
        self.num_edges += 1;
    }

    pub fn has_edge(&self, n1: usize, n2: usize) -> bool {
        self.adj_lists[n1].binary_search(&n2).is_ok()
    }

    pub fn num_nodes(&self) -> usize {
        self.adj_lists.len()
    }

    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    // Sorted ascending.
    pub fn adj_nodes(&self, node: usize) -> &[usize] {
        &self.adj_lists[node]
    }

    pub fn set_label(&mut self, node: usize, label: Option<usize>) {
        self.labels[node] = label;
    }

    pub fn get_label(&self, node: usize) -> Option<usize> {
        self.labels[node]
    }

    pub fn labels(&self) -> &[Option<usize>] {
        &self.labels
    }

    pub fn num_labeled(&self) -> usize {
        self.labels.iter().filter(|l| l.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Point3;
    use crate::test_util::unit_cube;

    #[test]
    fn test_cube_graph() {
        let mesh = unit_cube();
        let graph = Graph::build(&mesh, &VertexInfos::new(&mesh));

        assert_eq!(graph.num_nodes(), mesh.faces.len());
        assert_eq!(graph.num_edges(), 18);
        for n in 0..graph.num_nodes() {
            assert_eq!(graph.adj_nodes(n).len(), 3);
            for &m in graph.adj_nodes(n) {
                assert!(graph.adj_nodes(m).contains(&n));
            }
            assert_eq!(graph.get_label(n), None);
        }
    }

    #[test]
    fn test_non_manifold_edge() {
        // Three triangles sharing the edge 0-1.
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, -1.0, 0.0),
            Point3::new(0.5, 0.0, 1.0),
        ];
        let faces = vec![[0, 1, 2], [1, 0, 3], [0, 1, 4]];
        let mesh = Mesh::new(vertices, faces).unwrap();
        let graph = Graph::build(&mesh, &VertexInfos::new(&mesh));

        assert_eq!(graph.num_edges(), 3);
        assert_eq!(graph.adj_nodes(0), &[1, 2]);
        assert_eq!(graph.adj_nodes(1), &[0, 2]);
        assert_eq!(graph.adj_nodes(2), &[0, 1]);
    }

    #[test]
    fn test_edges_independent_of_insertion_order() {
        let mut g1 = Graph::new(4);
        let mut g2 = Graph::new(4);
        for (a, b) in [(0, 3), (2, 1), (0, 1), (3, 2)] {
            g1.add_edge(a, b);
        }
        for (a, b) in [(1, 0), (2, 3), (1, 2), (3, 0), (0, 3)] {
            g2.add_edge(a, b);
        }
        for n in 0..4 {
            assert_eq!(g1.adj_nodes(n), g2.adj_nodes(n));
        }
        assert_eq!(g1.num_edges(), 4);
        assert_eq!(g2.num_edges(), 4);
    }

    #[test]
    fn test_labels() {
        let mut graph = Graph::new(3);
        graph.set_label(1, Some(4));
        assert_eq!(graph.labels(), &[None, Some(4), None]);
        assert_eq!(graph.num_labeled(), 1);
        graph.set_label(1, None);
        assert_eq!(graph.num_labeled(), 0);
    }
}
