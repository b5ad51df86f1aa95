pub mod proc_stat;

pub use proc_stat::{LoadSampler, SampleError, PROC_STAT};
