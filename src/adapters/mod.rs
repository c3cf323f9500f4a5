// Adapters layer: concrete implementations of the domain ports (serial hardware, CSV log,
// simulated instrument).

pub mod csv_sink;
pub mod serial;
pub mod simulator;

pub use csv_sink::CsvReadingSink;
pub use serial::{SerialOpener, SerialPortEnumerator};
pub use simulator::{SimulatedEnumerator, SimulatedOpener, SIMULATED_PORT};
