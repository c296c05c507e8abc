use std::collections::VecDeque;

const EPS: f64 = 1e-12;
const UNVISITED: usize = usize::MAX;

// Two-terminal flow network solved with Dinic's algorithm. Edges are stored
// in pairs: edge e and its reverse e ^ 1.
pub struct FlowGraph {
    adj: Vec<Vec<usize>>,
    to: Vec<usize>,
    cap: Vec<f64>,
    source: usize,
    sink: usize,
}

impl FlowGraph {
    pub fn new(num_nodes: usize) -> FlowGraph {
        FlowGraph {
            adj: vec![vec![]; num_nodes + 2],
            to: vec![],
            cap: vec![],
            source: num_nodes,
            sink: num_nodes + 1,
        }
    }

    fn push_edge_pair(&mut self, u: usize, v: usize, cap_uv: f64, cap_vu: f64) {
        self.adj[u].push(self.to.len());
        self.to.push(v);
        self.cap.push(cap_uv);
        self.adj[v].push(self.to.len());
        self.to.push(u);
        self.cap.push(cap_vu);
    }

    // Capacity of cutting 'node' off the source and off the sink respectively.
    pub fn add_terminal_weights(&mut self, node: usize, source_cap: f64, sink_cap: f64) {
        if source_cap > 0.0 {
            self.push_edge_pair(self.source, node, source_cap, 0.0);
        }
        if sink_cap > 0.0 {
            self.push_edge_pair(node, self.sink, sink_cap, 0.0);
        }
    }

    pub fn add_edge(&mut self, u: usize, v: usize, cap_uv: f64, cap_vu: f64) {
        if cap_uv > 0.0 || cap_vu > 0.0 {
            self.push_edge_pair(u, v, cap_uv.max(0.0), cap_vu.max(0.0));
        }
    }

    fn build_levels(&self) -> Vec<usize> {
        let mut level = vec![UNVISITED; self.adj.len()];
        let mut queue = VecDeque::new();
        level[self.source] = 0;
        queue.push_back(self.source);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adj[u] {
                let v = self.to[e];
                if self.cap[e] > EPS && level[v] == UNVISITED {
                    level[v] = level[u] + 1;
                    queue.push_back(v);
                }
            }
        }
        level
    }

    // Finds and saturates one shortest augmenting path, advancing the
    // per-node edge cursors past dead ends.
    fn augment(&mut self, level: &[usize], cursor: &mut [usize]) -> f64 {
        let mut path: Vec<usize> = vec![];
        let mut u = self.source;
        loop {
            if u == self.sink {
                let flow = path
                    .iter()
                    .map(|&e| self.cap[e])
                    .fold(f64::INFINITY, f64::min);
                for &e in &path {
                    self.cap[e] -= flow;
                    self.cap[e ^ 1] += flow;
                }
                return flow;
            }

            let mut advanced = false;
            while cursor[u] < self.adj[u].len() {
                let e = self.adj[u][cursor[u]];
                let v = self.to[e];
                if self.cap[e] > EPS && level[v] == level[u] + 1 {
                    path.push(e);
                    u = v;
                    advanced = true;
                    break;
                }
                cursor[u] += 1;
            }

            if !advanced {
                match path.pop() {
                    Some(e) => {
                        u = self.to[e ^ 1];
                        cursor[u] += 1;
                    }
                    None => return 0.0,
                }
            }
        }
    }

    pub fn max_flow(&mut self) -> f64 {
        let mut total = 0.0;
        loop {
            let level = self.build_levels();
            if level[self.sink] == UNVISITED {
                return total;
            }
            let mut cursor = vec![0; self.adj.len()];
            loop {
                let flow = self.augment(&level, &mut cursor);
                if flow <= 0.0 {
                    break;
                }
                total += flow;
            }
        }
    }

    // After max_flow: whether the node can still reach the sink in the
    // residual network. This is the smallest sink side of a minimum cut.
    pub fn sink_segment(&self) -> Vec<bool> {
        let mut reaches = vec![false; self.adj.len()];
        let mut queue = VecDeque::new();
        reaches[self.sink] = true;
        queue.push_back(self.sink);
        while let Some(v) = queue.pop_front() {
            for &e in &self.adj[v] {
                let u = self.to[e];
                if self.cap[e ^ 1] > EPS && !reaches[u] {
                    reaches[u] = true;
                    queue.push_back(u);
                }
            }
        }
        reaches
    }
}
