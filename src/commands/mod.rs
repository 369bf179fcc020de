pub mod converge;
pub mod inventory;
