pub mod aggregate;
pub mod scalar;
