//! services/bot/src/adapters/maintenance.rs
//!
//! Background poller that mirrors the similarity-report provider's
//! maintenance window into the `services` table.

use std::sync::Arc;
use std::time::Duration;

use originality_core::catalog::ServiceKind;
use originality_core::ports::{DatabaseService, PortError, PortResult};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAINTENANCE_NOTE: &str = "service is in maintenance";

#[derive(Debug, Deserialize)]
struct MaintenanceStatus {
    is_maintenance: bool,
}

/// The availability flag and note stored for a given maintenance state.
fn availability(is_maintenance: bool) -> (bool, &'static str) {
    if is_maintenance {
        (false, MAINTENANCE_NOTE)
    } else {
        (true, "")
    }
}

pub struct MaintenancePoller {
    client: reqwest::Client,
    status_url: String,
    interval: Duration,
    db: Arc<dyn DatabaseService>,
}

impl MaintenancePoller {
    pub fn new(
        status_url: String,
        interval: Duration,
        timeout: Duration,
        db: Arc<dyn DatabaseService>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            status_url,
            interval,
            db,
        })
    }

    /// Runs one check immediately, then one per interval, until cancelled.
    /// A failed check is logged and leaves the stored flag untouched.
    pub async fn run(self, cancellation_token: CancellationToken) {
        info!(url = %self.status_url, interval_secs = self.interval.as_secs(), "Maintenance poller started.");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    info!("Maintenance poller stopped.");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.check_once().await {
                        error!(error = %e, "Failed to check maintenance status");
                    }
                }
            }
        }
    }

    pub async fn check_once(&self) -> PortResult<()> {
        debug!("Checking maintenance status...");
        let resp = self
            .client
            .get(&self.status_url)
            .send()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PortError::Unexpected(format!(
                "maintenance endpoint returned {}",
                status.as_u16()
            )));
        }
        let body: MaintenanceStatus = resp
            .json()
            .await
            .map_err(|e| PortError::Unexpected(format!("invalid maintenance status: {}", e)))?;

        let (available, note) = availability(body.is_maintenance);
        match self
            .db
            .set_service_availability(ServiceKind::Turnitin, available, note)
            .await?
        {
            Some(service) => info!(
                is_maintenance = body.is_maintenance,
                service_name = service.kind.as_str(),
                service_status = service.available,
                "Maintenance status updated"
            ),
            None => warn!(
                is_maintenance = body.is_maintenance,
                "Service \"turnitin\" not found in database"
            ),
        }
        Ok(())
    }
}
