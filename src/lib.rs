pub mod audit;
pub mod cli;
pub mod digest;
pub mod gate;
pub mod hash;
pub mod solve;
pub mod telemetry;
