//! Mesh data and geometry helpers
//!
//! - **Stream** (`stream`): non-unified indexed triangle stream, validation
//!   and degenerate cleanup, tolerance-based extraction and welding.
//! - **Bounds** (`bounds`): AABB, normal cone and per-cluster bounds.
//! - **Spatial hash** (`spatial`): quantized-position lookup replacing
//!   approximate-position linear scans.
//! - **Topology** (`topology`): edge adjacency, connected components,
//!   boundary vertices.
//! - **Shapes** (`shapes`): procedural box, sphere and grid inputs.
//!
//! Author: Moroya Sakamoto

pub mod bounds;
pub mod shapes;
pub mod spatial;
pub mod stream;
pub mod topology;

pub use bounds::{Aabb, ClusterBounds, NormalCone};
pub use shapes::{grid, subdivided_box, uv_sphere};
pub use spatial::{index_points, SpatialHash};
pub use stream::{is_degenerate, Corner, MeshStream, StreamError};
pub use topology::{
    boundary_vertices, connected_components, edge_triangles, triangle_adjacency,
    triangle_edges, vertex_triangles, EdgeKey,
};
