mod graph_error;
mod skeleton_error;
mod solver_error;

pub use graph_error::*;
pub use skeleton_error::*;
pub use solver_error::*;
