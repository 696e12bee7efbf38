//! One supervised invocation, from launch to shutdown

use runbound_api::{Invocation, RunOutcome};
use runbound_host_api::{Launched, ProcessHost};
use runbound_util::{Result, duration_millis};
use tracing::info;

use crate::{Console, SupervisorConfig, SupervisorRun, TimeoutSupervisor};

/// Launch the child described by `invocation` on `host`, relay its I/O
/// through `console`, and return once it has exited or been killed and the
/// run has been shut down.
///
/// A launch failure returns before any relay or pump task exists.
pub async fn run<H: ProcessHost>(
    host: &H,
    invocation: Invocation,
    config: &SupervisorConfig,
    console: Console,
) -> Result<RunOutcome> {
    let Invocation { spec, credential } = invocation;

    let Launched { child, stdio } = host.launch(&spec, credential).await?;
    let run = SupervisorRun::start(child, stdio, console);

    let outcome = TimeoutSupervisor::new(spec.timeout(), config.clone())
        .supervise(run)
        .await?;

    info!(
        state = %outcome.state,
        exit_status = ?outcome.exit_status,
        elapsed_ms = duration_millis(outcome.elapsed),
        "Run finished"
    );

    Ok(outcome)
}
