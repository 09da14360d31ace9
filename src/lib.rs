//! VANET Simulation Library
//!
//! A discrete-event simulator for vehicles flooding safety messages over a
//! road network.

pub mod simulation;
