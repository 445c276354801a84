pub mod batch;
pub mod recommender;
pub mod stream;

pub use batch::{BatchExecutor, BatchOptions, BatchSizeConfig, RunMetrics, RunReport};
pub use recommender::{BatchSizeRecommender, RecommenderState, TierAdjustment};
pub use stream::{
    stream_read, stream_write, CursorDirection, Entry, KeyRange, KeyValueStore, MemoryStore,
    ReadOptions, StoreCursor, StreamIoProcessor, WriteOptions,
};
