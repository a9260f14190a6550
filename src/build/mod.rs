//! Offline hierarchy builder
//!
//! - **Clusterer** (`clusterer`): dual-graph partition into bounded clusters.
//! - **Balancer** (`balance`): component split, greedy re-split, move and
//!   merge passes enforcing the triangle budget.
//! - **Grouper** (`grouper`): boundary-weighted cluster adjacency and group
//!   partitioning.
//! - **Simplifier** (`simplify`): QEM edge collapse with boundary locking.
//! - **Arena** (`arena`): growable byte arenas addressed by offset ranges.
//! - **Assembler** (`hierarchy`): the per-LOD loop producing a
//!   [`VirtualMesh`](crate::virtual_mesh::VirtualMesh).
//! - **Kernels** (`kernels`) and **pool** (`pool`): batch geometry queries
//!   and the worker pool used by the parallel phases.
//!
//! Author: Moroya Sakamoto

pub mod arena;
pub mod balance;
pub mod clusterer;
pub mod grouper;
pub mod hierarchy;
pub mod kernels;
pub mod pool;
pub mod quadric;
pub mod simplify;

pub use arena::{ArenaRange, ByteArena, GeometryArena, GeometryRanges};
pub use balance::{BalanceReport, TrianglePartition};
pub use clusterer::TriangleClusterer;
pub use grouper::{ClusterBoundary, ClusterGrouper};
pub use hierarchy::HierarchyAssembler;
pub use kernels::{CollapseQuery, CpuKernels, GeometryKernels, NearestHit};
pub use pool::WorkerPool;
pub use quadric::Quadric;
pub use simplify::{GroupSimplifier, SimplifyResult};
