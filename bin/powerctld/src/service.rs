//! ---
//! pc_section: "05-daemon"
//! pc_subsection: "module"
//! pc_type: "source"
//! pc_scope: "code"
//! pc_description: "Bridge between the host service manager and the supervised run."
//! pc_version: "v0.1.0"
//! pc_owner: "tbd"
//! ---
use anyhow::Result;

use crate::Startup;

/// Run under the service manager; fails when the process was not started by one.
#[cfg(windows)]
pub fn run(startup: Startup) -> Result<()> {
    windows::run(startup)
}

/// Run under the service manager when started by it, in the foreground otherwise.
#[cfg(windows)]
pub fn run_or_foreground(startup: Startup) -> Result<()> {
    windows::run_or_foreground(startup)
}

#[cfg(not(windows))]
pub fn run(startup: Startup) -> Result<()> {
    let _ = startup;
    anyhow::bail!("supervised mode is only available on Windows hosts; use `powerctld run`")
}

#[cfg(not(windows))]
pub fn run_or_foreground(startup: Startup) -> Result<()> {
    crate::run_foreground(startup)
}

#[cfg(windows)]
mod windows {
    use std::ffi::OsString;
    use std::io;
    use std::time::Duration;

    use anyhow::{anyhow, Context, Result};
    use once_cell::sync::OnceCell;
    use powerctl_lifecycle::{
        control_channel, run_supervised, ControlRequest, LifecycleState, ServiceStatus,
        StatusReporter,
    };
    use tracing::{error, info};
    use windows_service::service::{
        ServiceControl, ServiceControlAccept, ServiceExitCode, ServiceState,
        ServiceStatus as ScmStatus, ServiceType,
    };
    use windows_service::service_control_handler::{
        self, ServiceControlHandlerResult, ServiceStatusHandle,
    };
    use windows_service::{define_windows_service, service_dispatcher};

    use crate::{build_runtime, run_foreground, supervisor_for, Launch, Startup};

    /// `StartServiceCtrlDispatcher` fails with this when the process was not
    /// launched by the service control manager.
    const ERROR_FAILED_SERVICE_CONTROLLER_CONNECT: i32 = 1063;

    // The dispatcher calls `service_main` without any arguments of ours.
    static STARTUP: OnceCell<Startup> = OnceCell::new();

    define_windows_service!(ffi_service_main, service_main);

    pub(super) fn run(startup: Startup) -> Result<()> {
        let name = startup.service_name().to_owned();
        dispatch(startup).with_context(|| format!("failed to start service dispatcher for {name}"))
    }

    pub(super) fn run_or_foreground(startup: Startup) -> Result<()> {
        let name = startup.service_name().to_owned();
        match dispatch(startup) {
            Ok(()) => Ok(()),
            Err(err) if started_outside_service_manager(&err) => {
                let startup = STARTUP
                    .get()
                    .cloned()
                    .ok_or_else(|| anyhow!("startup context missing"))?;
                run_foreground(startup)
            }
            Err(err) => Err(err)
                .with_context(|| format!("failed to start service dispatcher for {name}")),
        }
    }

    fn dispatch(startup: Startup) -> windows_service::Result<()> {
        let name = startup.service_name().to_owned();
        // A second dispatch in one process is impossible, so a set context is never stale.
        let _ = STARTUP.set(startup);
        // Blocks until the service has stopped.
        service_dispatcher::start(&name, ffi_service_main)
    }

    fn started_outside_service_manager(err: &windows_service::Error) -> bool {
        matches!(
            err,
            windows_service::Error::Winapi(source)
                if source.raw_os_error() == Some(ERROR_FAILED_SERVICE_CONTROLLER_CONNECT)
        )
    }

    fn service_main(_arguments: Vec<OsString>) {
        if let Err(err) = run_service() {
            error!(error = %err, "service terminated with error");
        }
    }

    fn run_service() -> Result<()> {
        let startup = STARTUP
            .get()
            .cloned()
            .ok_or_else(|| anyhow!("startup context missing"))?;
        let service_name = startup.service_name().to_owned();
        let (config, controller) = startup.prepare(Launch::ServiceManager)?;

        let (controls, control_rx) = control_channel();
        let handler = move |event| match control_request(event) {
            Some(request) => {
                controls.send(request);
                ServiceControlHandlerResult::NoError
            }
            None => ServiceControlHandlerResult::NotImplemented,
        };
        let status_handle = service_control_handler::register(&service_name, handler)
            .context("failed to register service control handler")?;
        let reporter = ScmReporter {
            handle: status_handle,
            wait_hint: config.server.grace_period,
        };

        let runtime = build_runtime()?;
        let router = powerctl_api::router(controller);
        let supervisor = supervisor_for(&config);
        let outcome = runtime.block_on(run_supervised(supervisor, router, control_rx, &reporter))?;
        info!(?outcome, "service stopped");
        Ok(())
    }

    fn control_request(event: ServiceControl) -> Option<ControlRequest> {
        match event {
            ServiceControl::Interrogate => Some(ControlRequest::Interrogate),
            ServiceControl::Stop => Some(ControlRequest::Stop),
            ServiceControl::Shutdown => Some(ControlRequest::Shutdown),
            _ => None,
        }
    }

    struct ScmReporter {
        handle: ServiceStatusHandle,
        wait_hint: Duration,
    }

    impl StatusReporter for ScmReporter {
        fn report(&self, status: ServiceStatus) -> io::Result<()> {
            let current_state = match status.state {
                LifecycleState::Starting => ServiceState::StartPending,
                LifecycleState::Running => ServiceState::Running,
                LifecycleState::StopPending => ServiceState::StopPending,
                LifecycleState::Stopped => ServiceState::Stopped,
            };
            let controls_accepted = if status.accepts_stop {
                ServiceControlAccept::STOP | ServiceControlAccept::SHUTDOWN
            } else {
                ServiceControlAccept::empty()
            };
            let wait_hint = match status.state {
                LifecycleState::Starting | LifecycleState::StopPending => self.wait_hint,
                _ => Duration::default(),
            };
            self.handle
                .set_service_status(ScmStatus {
                    service_type: ServiceType::OWN_PROCESS,
                    current_state,
                    controls_accepted,
                    exit_code: ServiceExitCode::Win32(status.exit_code),
                    checkpoint: 0,
                    wait_hint,
                    process_id: None,
                })
                .map_err(io::Error::other)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn console_launch_is_recognised() {
            let err = windows_service::Error::Winapi(io::Error::from_raw_os_error(
                ERROR_FAILED_SERVICE_CONTROLLER_CONNECT,
            ));
            assert!(started_outside_service_manager(&err));

            let denied = windows_service::Error::Winapi(io::Error::from_raw_os_error(5));
            assert!(!started_outside_service_manager(&denied));
        }

        #[test]
        fn only_stop_controls_are_forwarded() {
            assert_eq!(
                control_request(ServiceControl::Interrogate),
                Some(ControlRequest::Interrogate)
            );
            assert_eq!(control_request(ServiceControl::Stop), Some(ControlRequest::Stop));
            assert_eq!(
                control_request(ServiceControl::Shutdown),
                Some(ControlRequest::Shutdown)
            );
            assert_eq!(control_request(ServiceControl::Pause), None);
        }
    }
}
