pub mod adapter;
pub mod gate;

pub use adapter::EngineAdapter;
pub use gate::{EngineGate, EngineState};
