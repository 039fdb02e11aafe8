pub mod clone;
pub mod data_core;
pub mod error;
pub mod finder;
pub mod guard;
pub mod ids;
pub mod modifiable;
pub mod node;
pub mod performance;
pub mod persist;
pub mod shadow_tree;
pub mod stats;
pub mod sync;
pub mod transforms;
pub mod tree;
pub mod walker;
