use anyhow::Error;

mod macros;

pub mod bipartition;
pub mod bitmask;
pub mod community;
pub mod distance_matrix;
pub mod io;
pub mod taxa;
pub mod tree;

type Result<T> = std::result::Result<T, Error>;
