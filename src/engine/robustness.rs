//! Sequential-consistency check of a finished execution.
//!
//! The memory accesses of an execution are the nodes of a graph whose edges are
//! program order, reads-from, coherence (the order in which stores reach memory)
//! and from-read (a read precedes the store that overwrites the value it read).
//! The execution is explainable under SC iff that graph is acyclic.

use std::collections::HashMap;
use std::fmt::Write;

#[derive(Debug, Clone)]
struct Node {
    thread: usize,
    addr: u64,
    /// For reads: the store read from, `None` for the initial value.
    source: Option<Option<usize>>,
    writes: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MemoryGraph {
    nodes: Vec<Node>,
    program_order: Vec<(usize, usize)>,
    last_of_thread: HashMap<usize, usize>,
    coherence: HashMap<u64, Vec<usize>>,
    last_store: HashMap<u64, usize>,
}

impl MemoryGraph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> usize {
        let id = self.nodes.len();
        if let Some(prev) = self.last_of_thread.insert(node.thread, id) {
            self.program_order.push((prev, id));
        }
        self.nodes.push(node);
        id
    }

    /// A read of `addr`, either from the own store `forwarded` or from memory.
    pub(crate) fn read(&mut self, thread: usize, addr: u64, forwarded: Option<usize>) -> usize {
        let source = forwarded.or_else(|| self.last_store.get(&addr).copied());
        self.push(Node {
            thread,
            addr,
            source: Some(source),
            writes: false,
        })
    }

    /// A store issued by `thread`; it becomes visible on [`commit`][Self::commit].
    pub(crate) fn write(&mut self, thread: usize, addr: u64) -> usize {
        self.push(Node {
            thread,
            addr,
            source: None,
            writes: true,
        })
    }

    /// An atomic read-modify-write, visible immediately.
    pub(crate) fn update(&mut self, thread: usize, addr: u64) -> usize {
        let source = self.last_store.get(&addr).copied();
        let id = self.push(Node {
            thread,
            addr,
            source: Some(source),
            writes: true,
        });
        self.commit(id);
        id
    }

    pub(crate) fn commit(&mut self, store: usize) {
        let addr = self.nodes[store].addr;
        self.coherence.entry(addr).or_default().push(store);
        self.last_store.insert(addr, store);
    }

    fn edges(&self) -> Vec<Vec<usize>> {
        let mut succ = vec![Vec::new(); self.nodes.len()];
        for &(a, b) in &self.program_order {
            succ[a].push(b);
        }
        for order in self.coherence.values() {
            for w in order.windows(2) {
                succ[w[0]].push(w[1]);
            }
        }
        for (r, node) in self.nodes.iter().enumerate() {
            let Some(source) = node.source else {
                continue;
            };
            if let Some(w) = source {
                if w != r {
                    succ[w].push(r);
                }
            }
            // From-read: to the store overwriting the value read.
            let order = self.coherence.get(&node.addr).map(Vec::as_slice).unwrap_or(&[]);
            let next = match source {
                Some(w) => order
                    .iter()
                    .position(|&x| x == w)
                    .and_then(|i| order.get(i + 1)),
                None => order.first(),
            };
            if let Some(&next) = next {
                if next != r {
                    succ[r].push(next);
                }
            }
        }
        succ
    }

    /// Find a cycle, returned as the list of nodes along it.
    pub(crate) fn find_cycle(&self) -> Option<Vec<usize>> {
        const WHITE: u8 = 0;
        const GREY: u8 = 1;
        const BLACK: u8 = 2;

        let succ = self.edges();
        let mut color = vec![WHITE; self.nodes.len()];
        for root in 0..self.nodes.len() {
            if color[root] != WHITE {
                continue;
            }
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
            color[root] = GREY;
            while let Some(top) = stack.last_mut() {
                let node = top.0;
                if let Some(&child) = succ[node].get(top.1) {
                    top.1 += 1;
                    match color[child] {
                        WHITE => {
                            color[child] = GREY;
                            stack.push((child, 0));
                        }
                        GREY => {
                            let start = stack.iter().position(|&(n, _)| n == child).unwrap_or(0);
                            return Some(stack[start..].iter().map(|&(n, _)| n).collect());
                        }
                        _ => {}
                    }
                } else {
                    color[node] = BLACK;
                    stack.pop();
                }
            }
        }
        None
    }

    pub(crate) fn describe(&self, cycle: &[usize]) -> String {
        let mut s = String::new();
        for (i, &n) in cycle.iter().enumerate() {
            let node = &self.nodes[n];
            if i > 0 {
                s.push_str(" -> ");
            }
            let op = match (node.source.is_some(), node.writes) {
                (true, true) => "update",
                (true, false) => "read",
                _ => "write",
            };
            let _ = write!(s, "T{} {} #{}", node.thread, op, node.addr);
        }
        s
    }
}
