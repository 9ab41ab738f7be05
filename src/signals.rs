use signal_hook::{
    consts::{SIGINT, SIGTERM},
    iterator::Signals,
};
use tokio::sync::mpsc::Sender;

/// Translate SIGINT/SIGTERM into one cancellation message for the supervisor.
/// The supervisor reacts at its next suspension point and cleans up the
/// sensor container itself, so nothing is torn down here.
pub fn handle_shutdown(cancel_tx: Sender<()>) {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).expect("No signals :(. This really should never happen");

    std::thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            let _ = sd_notify::notify(true, &[sd_notify::NotifyState::Stopping]);
            log::info!("Received signal {signal}, shutting down");
            let _ = cancel_tx.blocking_send(());
        }
    });
}
