// Domain layer: measurement models, rules and ports (interfaces). No I/O here.

pub mod decimal;
pub mod model;
pub mod ports;
pub mod rules;
