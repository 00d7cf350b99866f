//! SLURM scheduler topology, logged once per rank at startup.
//!
//! | Field | Variable | Description |
//! |-------|----------|-------------|
//! | `job_id` | `SLURM_JOB_ID` | Unique job identifier |
//! | `node_name` | `SLURMD_NODENAME` / `SLURM_NODENAME` | Compute node of this process |
//! | `local_rank` | `SLURM_LOCALID` | Task ID relative to this node |
//! | `num_nodes` | `SLURM_NNODES` | Total number of nodes |
//! | `tasks_per_node` | `SLURM_NTASKS_PER_NODE` / `SLURM_TASKS_PER_NODE` | Tasks on this node |

use std::env;
use std::fmt;

/// Where this process sits inside a SLURM allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobTopology {
    /// `SLURM_JOB_ID`
    pub job_id: Option<String>,
    /// Compute node name
    pub node_name: Option<String>,
    /// Intra-node task index
    pub local_rank: Option<u32>,
    /// Nodes in the allocation
    pub num_nodes: Option<u32>,
    /// Tasks on this node
    pub tasks_per_node: Option<u32>,
}

impl JobTopology {
    /// Read the topology from the environment. Every field is `None` outside SLURM.
    pub fn detect() -> Self {
        JobTopology {
            job_id: env::var("SLURM_JOB_ID").ok(),
            node_name: env::var("SLURMD_NODENAME")
                .or_else(|_| env::var("SLURM_NODENAME"))
                .ok(),
            local_rank: parsed("SLURM_LOCALID"),
            num_nodes: parsed("SLURM_NNODES"),
            tasks_per_node: parsed("SLURM_NTASKS_PER_NODE").or_else(|| {
                // SLURM_TASKS_PER_NODE looks like "4(x2)"
                env::var("SLURM_TASKS_PER_NODE")
                    .ok()
                    .and_then(|s| s.split('(').next().and_then(|n| n.parse().ok()))
            }),
        }
    }

    /// Whether this process runs inside a SLURM job.
    pub fn is_slurm_job(&self) -> bool {
        self.job_id.is_some()
    }
}

fn parsed(var: &str) -> Option<u32> {
    env::var(var).ok().and_then(|s| s.trim().parse().ok())
}

impl fmt::Display for JobTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(job) = &self.job_id else {
            return f.write_str("not a SLURM job");
        };
        write!(f, "SLURM job {job}")?;
        if let Some(node) = &self.node_name {
            write!(f, " on {node}")?;
        }
        if let (Some(local), Some(per_node)) = (self.local_rank, self.tasks_per_node) {
            write!(f, " (local task {local}/{per_node})")?;
        }
        if let Some(nodes) = self.num_nodes {
            write!(f, ", {nodes} nodes")?;
        }
        Ok(())
    }
}
