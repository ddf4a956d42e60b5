pub mod codec;
pub mod model_cache;
pub mod progress;
pub mod registry;
pub mod separator;
pub mod status;
pub mod storage;
pub mod submission;
pub mod worker;
