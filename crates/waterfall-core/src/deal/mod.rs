pub mod state;
pub mod tranche;
