//! ---
//! pc_section: "02-power-pipeline"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Platform gate, validation, translation and execution of power actions."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::action::{PowerActionKind, PowerActionRequest, PowerActionResult};
use crate::command::translate;
use crate::error::PowerActionError;
use crate::executor::PowerCommandExecutor;

/// Whether the host can run the platform power utility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformSupport {
    Supported,
    Unsupported,
}

impl PlatformSupport {
    /// Power control is only wired up for Windows hosts.
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            PlatformSupport::Supported
        } else {
            PlatformSupport::Unsupported
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, PlatformSupport::Supported)
    }
}

/// Ties delay parsing, command translation and execution together.
///
/// Requests share nothing but the executor, so concurrent calls to
/// [`PowerController::perform`] are independent and never serialised.
#[derive(Clone)]
pub struct PowerController {
    executor: Arc<dyn PowerCommandExecutor>,
    platform: PlatformSupport,
}

impl PowerController {
    pub fn new(executor: Arc<dyn PowerCommandExecutor>, platform: PlatformSupport) -> Self {
        Self { executor, platform }
    }

    pub fn platform(&self) -> PlatformSupport {
        self.platform
    }

    /// Run the full pipeline for one request and produce its result.
    pub async fn perform(&self, kind: PowerActionKind, body: &[u8]) -> PowerActionResult {
        match self.try_perform(kind, body).await {
            Ok(message) => PowerActionResult::success(message),
            Err(err) => PowerActionResult::from_error(&err),
        }
    }

    /// Like [`PowerController::perform`] but keeps the typed error.
    pub async fn try_perform(
        &self,
        kind: PowerActionKind,
        body: &[u8],
    ) -> Result<String, PowerActionError> {
        if !self.platform.is_supported() {
            debug!(action = %kind, "power action refused on unsupported platform");
            return Err(PowerActionError::PlatformUnsupported);
        }

        let request = PowerActionRequest::from_body(kind, body).map_err(|err| {
            debug!(action = %kind, error = %err, "power action request rejected");
            err
        })?;

        let args = translate(request.kind, request.delay);
        if let Err(err) = self.executor.execute(&args).await {
            warn!(
                action = %kind,
                program = %err.program(),
                args = ?err.args(),
                error = %err,
                "power command failed"
            );
            return Err(PowerActionError::CommandFailed(err));
        }

        info!(action = %kind, delay_seconds = request.delay.get(), "power command staged");
        Ok(request.success_message())
    }
}

impl fmt::Debug for PowerController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerController")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}
