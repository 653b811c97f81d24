use std::fmt;

use log::info;
use uuid::Uuid;

pub mod executor;
pub mod planner;
pub mod service;

pub use executor::{
    ExecutionSummary,
    Executor,
};
pub use planner::{
    Planner,
    SyncPlan,
};
pub use service::{
    SyncAck,
    SyncOutcome,
    SyncService,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStage {
    Idle,
    Verifying,
    Provisioning,
    Fetching,
    Planning,
    Adding,
    Updating,
    Deleting,
    DeletingMedia,
    SchedulingDownloads,
    Done,
    Failed(String),
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStage::Idle => f.write_str("idle"),
            SyncStage::Verifying => f.write_str("verifying"),
            SyncStage::Provisioning => f.write_str("provisioning"),
            SyncStage::Fetching => f.write_str("fetching"),
            SyncStage::Planning => f.write_str("planning"),
            SyncStage::Adding => f.write_str("adding"),
            SyncStage::Updating => f.write_str("updating"),
            SyncStage::Deleting => f.write_str("deleting"),
            SyncStage::DeletingMedia => f.write_str("deleting media"),
            SyncStage::SchedulingDownloads => f.write_str("scheduling downloads"),
            SyncStage::Done => f.write_str("done"),
            SyncStage::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Stage history of one sync invocation.
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub id: Uuid,
    pub stages: Vec<SyncStage>,
}

impl SyncRun {
    pub fn new() -> Self {
        Self { id: Uuid::new_v4(), stages: vec![SyncStage::Idle] }
    }

    pub fn enter(&mut self, stage: SyncStage) {
        info!("[Sync {}] {}", self.id, stage);
        self.stages.push(stage);
    }

    pub fn current(&self) -> &SyncStage {
        self.stages.last().unwrap_or(&SyncStage::Idle)
    }
}

impl Default for SyncRun {
    fn default() -> Self {
        Self::new()
    }
}
