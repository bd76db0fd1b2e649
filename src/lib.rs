//! Coupled hydrodynamic and aerodynamic loads on slender offshore structures,
//! integrated in time with a multibody dynamics engine.

pub mod body;
pub mod components;
pub mod config;
pub mod constraints;
pub mod coordinator;
pub mod elements;
pub mod engine;
pub mod error;
pub mod frame;
pub mod hydro;
pub mod interp;
pub mod loads;
pub mod modal;
pub mod model;
pub mod node;
pub mod output_writer;
pub mod potential;
pub mod quaternion;
pub mod solver;
pub mod state;
pub mod sweep;
pub mod util;
