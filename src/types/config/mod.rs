pub mod chain;
pub mod pipeline;
pub mod storage;
