// Application layer: instrument protocols, session wiring and console output.

pub mod console;
pub mod protocols;
pub mod runner;
