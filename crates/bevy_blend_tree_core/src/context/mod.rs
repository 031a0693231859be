pub mod node_context;
pub mod spec_context;
