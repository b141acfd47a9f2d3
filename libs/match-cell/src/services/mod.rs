pub mod assignment;
pub mod proximity;
pub mod ranking;
pub mod rejection;
pub mod selector;
