pub mod coverage;
pub mod roster;
