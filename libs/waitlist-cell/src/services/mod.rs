pub mod grading;
pub mod scoring;
pub mod waitlist;
