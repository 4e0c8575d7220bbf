pub mod bookkeeping;
pub mod engine;
pub mod event_bus;
pub mod graph;
pub mod loop_control;
pub mod recorder;
pub mod state;
