//! Pure transformation logic, free of any store handle.

pub mod transform;
