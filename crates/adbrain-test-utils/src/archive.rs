use std::sync::Mutex;

use futures::future::BoxFuture;

use adbrain_core::error::{AdbrainError, Result};
use adbrain_core::traits::CampaignArchive;
use adbrain_core::types::ArchivedCampaign;

/// Keeps archived campaigns in memory.
#[derive(Default)]
pub struct MemoryArchive {
    campaigns: Mutex<Vec<ArchivedCampaign>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn campaigns(&self) -> Vec<ArchivedCampaign> {
        self.campaigns.lock().unwrap().clone()
    }
}

impl CampaignArchive for MemoryArchive {
    fn archive(&self, campaign: ArchivedCampaign) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let mut campaigns = self.campaigns.lock().unwrap();
            campaigns.push(campaign);
            Ok(format!("mem-{}", campaigns.len()))
        })
    }
}

/// Rejects every campaign.
pub struct FailingArchive;

impl CampaignArchive for FailingArchive {
    fn archive(&self, _campaign: ArchivedCampaign) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move { Err(AdbrainError::Database("disk full".into())) })
    }
}
