//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGHUP, SIGINT, SIGTERM and SIGQUIT
//! - Log which signal arrived
//! - Terminate the process with [`SIGNAL_EXIT_CODE`]
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Handlers are attached before serving, so a failure to attach is a
//!   startup error rather than a silent gap

/// Process exit status after a termination signal.
pub const SIGNAL_EXIT_CODE: i32 = 5;

/// Attach the termination signals and spawn a task that exits the process
/// when any of them arrives. Must be called inside a Tokio runtime.
#[cfg(unix)]
pub fn exit_on_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = hangup.recv() => "SIGHUP",
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
        };
        tracing::info!(signal = name, "Received signal, exiting");
        std::process::exit(SIGNAL_EXIT_CODE);
    });
    Ok(())
}

#[cfg(not(unix))]
pub fn exit_on_signal() -> std::io::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(signal = "ctrl-c", "Received signal, exiting");
            std::process::exit(SIGNAL_EXIT_CODE);
        }
    });
    Ok(())
}
