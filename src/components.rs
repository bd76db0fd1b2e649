pub mod aero;
pub mod drivetrain;
pub mod inflow;
pub mod motor;
