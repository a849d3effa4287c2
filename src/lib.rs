//! Logistics Simulation Library
//!
//! Construction-site demand boards and autonomous haulers that reserve,
//! carry and deliver resources to satisfy them.

pub mod simulation;
