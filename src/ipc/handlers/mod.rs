pub mod core;
pub mod curriculum;
pub mod lessons;
pub mod plans;
pub mod sync;
