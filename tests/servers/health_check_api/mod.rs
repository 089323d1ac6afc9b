pub mod contract;
pub mod environment;

pub use environment::Environment;
