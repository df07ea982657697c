pub mod arrow;
pub mod digest;
pub mod paths;
