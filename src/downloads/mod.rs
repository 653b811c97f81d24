pub mod scheduler;
pub mod store;

pub use scheduler::{
    DownloadScheduler,
    WakeOutcome,
};
pub use store::{
    ChunkKey,
    DownloadQueue,
    StateStore,
};
