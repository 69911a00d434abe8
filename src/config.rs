use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Memory consistency model under which the program is explored.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryModel {
    /// Sequential consistency: every store is immediately visible to all threads.
    SequentialConsistency,
    /// Total store order: stores go through a per-thread FIFO store buffer.
    TotalStoreOrder,
    /// Partial store order. Recognized, but no engine implements it.
    PartialStoreOrder,
}

impl Display for MemoryModel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryModel::SequentialConsistency => "sc",
            MemoryModel::TotalStoreOrder => "tso",
            MemoryModel::PartialStoreOrder => "pso",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MemoryModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sc" => Ok(MemoryModel::SequentialConsistency),
            "tso" => Ok(MemoryModel::TotalStoreOrder),
            "pso" => Ok(MemoryModel::PartialStoreOrder),
            _ => Err(format!("unknown memory model `{}`", s)),
        }
    }
}

/// Run parameters of an exploration. Read-only once a driver is built.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub memory_model: MemoryModel,
    /// Check that every execution is robust, i.e. explainable under SC.
    pub check_robustness: bool,
    /// Keep exploring after the first erroneous execution.
    pub explore_all_traces: bool,
    /// Retain the trace of every execution, not only the erroneous one.
    pub debug_collect_all_traces: bool,
    /// Rebuild the module every that many executions (`None` disables recycling).
    pub recycle_interval: Option<usize>,
    /// Maximum number of scheduling decisions in one execution.
    pub max_search_depth: Option<usize>,
    /// Maximum number of consecutive thread-local instructions.
    pub max_local_steps: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            memory_model: MemoryModel::SequentialConsistency,
            check_robustness: false,
            explore_all_traces: false,
            debug_collect_all_traces: false,
            recycle_interval: Some(1000),
            max_search_depth: None,
            max_local_steps: 100_000,
        }
    }
}

impl Configuration {
    pub fn new(memory_model: MemoryModel) -> Self {
        Self {
            memory_model,
            ..Default::default()
        }
    }

    pub fn with_memory_model(mut self, memory_model: MemoryModel) -> Self {
        self.memory_model = memory_model;
        self
    }
    pub fn with_check_robustness(mut self, check_robustness: bool) -> Self {
        self.check_robustness = check_robustness;
        self
    }
    pub fn with_explore_all_traces(mut self, explore_all_traces: bool) -> Self {
        self.explore_all_traces = explore_all_traces;
        self
    }
    pub fn with_debug_collect_all_traces(mut self, debug_collect_all_traces: bool) -> Self {
        self.debug_collect_all_traces = debug_collect_all_traces;
        self
    }
    pub fn with_recycle_interval(mut self, recycle_interval: Option<usize>) -> Self {
        self.recycle_interval = recycle_interval;
        self
    }
    pub fn with_max_search_depth(mut self, max_search_depth: Option<usize>) -> Self {
        self.max_search_depth = max_search_depth;
        self
    }
    pub fn with_max_local_steps(mut self, max_local_steps: usize) -> Self {
        self.max_local_steps = max_local_steps;
        self
    }
}
