use crate::config::Config;
use crate::console::Command;
use crate::error::ClientError;
use crate::inbound::InboundEvent;
use crate::views::{DashboardModel, MiningModel};

pub enum ClientEvent {
    /// The readiness coordinator settled successfully.
    DaemonReady,
    /// The readiness coordinator settled with an error (block or timeout).
    DaemonFailed(ClientError),
    /// A line was entered on the console.
    Command(Command),
    Dashboard(DashboardModel),
    Mining(MiningModel),
    /// Live history shows more unspent outputs than the previous live look.
    Inbound(InboundEvent),
    /// A guarded action finished running in the background.
    ActionFinished { action: &'static str, result: Result<String, ClientError> },
    /// The wallet was loaded or unlocked with this password.
    Unlocked(String),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C or `quit`; the client should stop polling and exit.
    Shutdown,
}
