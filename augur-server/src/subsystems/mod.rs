pub mod predict;
pub mod records;
