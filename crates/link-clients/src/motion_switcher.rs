//! # Motion Switcher Client
//!
//! Selects the remote's high-level operating mode (`normal`, `advanced`) and
//! its silent-boot flag on `rt/api/motion_switcher/request`.

use link_rpc::CallOutcome;
use link_types::LinkResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use crate::api::motion_switcher as api;
use crate::service::{Ack, ServiceClient};

/// Mode switches answer faster than sport motions.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Reply to `GetMode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeInfo {
    #[serde(default)]
    pub form: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
struct SetModeParam<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct ReleaseParam {
    sample: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SilentParam {
    #[serde(default)]
    silent: u8,
}

#[derive(Clone)]
pub struct MotionSwitcherClient {
    service: ServiceClient,
}

impl MotionSwitcherClient {
    /// Wrap `service`, applying [`DEFAULT_TIMEOUT`] unless it already has one.
    pub fn new(service: ServiceClient) -> Self {
        let service = match service.timeout() {
            Some(_) => service,
            None => service.with_timeout(DEFAULT_TIMEOUT),
        };
        Self { service }
    }

    pub fn service(&self) -> &ServiceClient {
        &self.service
    }

    #[instrument(skip(self))]
    pub async fn get_mode(&self) -> LinkResult<ModeInfo> {
        let mode: ModeInfo = self.service.request_data::<(), _>(api::GET_MODE, None).await?;
        info!(form = ?mode.form, name = ?mode.name, "Retrieved motion mode");
        Ok(mode)
    }

    #[instrument(skip(self))]
    pub async fn set_mode(&self, name: &str) -> LinkResult<CallOutcome> {
        self.service
            .command(api::SET_MODE, Some(&SetModeParam { name }), Ack::Wait)
            .await
    }

    /// Release the active mode. `immediate` drops at once instead of
    /// standing down first.
    #[instrument(skip(self))]
    pub async fn release_mode(&self, immediate: bool) -> LinkResult<CallOutcome> {
        let param = ReleaseParam {
            sample: u8::from(immediate),
        };
        self.service
            .command(api::RELEASE_MODE, Some(&param), Ack::Wait)
            .await
    }

    /// With silent set, no sport service starts at boot.
    #[instrument(skip(self))]
    pub async fn set_silent(&self, silent: bool, ack: Ack) -> LinkResult<CallOutcome> {
        let param = SilentParam {
            silent: u8::from(silent),
        };
        self.service.command(api::SET_SILENT, Some(&param), ack).await
    }

    #[instrument(skip(self))]
    pub async fn get_silent(&self) -> LinkResult<bool> {
        let param: SilentParam = self
            .service
            .request_data::<(), _>(api::GET_SILENT, None)
            .await?;
        Ok(param.silent != 0)
    }
}
