use log::info;
use tokio::io;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancels `token` on the first SIGTERM, SIGINT, SIGHUP or SIGQUIT. Loops that
/// observe the token finish their current unit of work and exit.
pub fn cancel_on_shutdown_signal(token: CancellationToken) -> io::Result<JoinHandle<()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::spawn(async move {
        let received = tokio::select! {
            _ = term.recv() => "terminate",
            _ = int.recv() => "interrupt",
            _ = hup.recv() => "hangup",
            _ = quit.recv() => "quit",
        };
        info!("Received {received} signal, stopping after the current cycle");
        token.cancel();
    }))
}
