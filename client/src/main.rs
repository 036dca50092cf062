mod actions;
mod api;
mod config;
mod console;
mod contacts;
mod error;
mod event;
mod format;
mod guard;
mod inbound;
mod paths;
mod process;
mod readiness;
mod rpc;
mod scheduler;
mod series;
mod snapshot;
mod status;
#[cfg(test)]
mod testutil;
mod types;
mod views;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::actions::{ResetChainData, RevealSeed, SendFunds, SendRequest};
use crate::console::Command;
use crate::contacts::AddressBook;
use crate::error::ClientError;
use crate::event::ClientEvent;
use crate::guard::{ArmGuard, GuardOutcome, GuardedAction};
use crate::paths::AppPaths;
use crate::process::{DaemonControl, ProcessLauncher};
use crate::readiness::ReadinessCoordinator;
use crate::rpc::{Gateway, HttpGateway};
use crate::scheduler::PollScheduler;
use crate::snapshot::SnapshotCache;
use crate::status::{ClientStatus, DaemonPhase};
use crate::views::{DashboardModel, MiningModel, NetworkModel, PollState, View};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── App data directory ────────────────────────────────────────────────────
    let paths = AppPaths::discover()?;
    std::fs::create_dir_all(&paths.root)
        .with_context(|| format!("Failed to create app data directory {}", paths.root.display()))?;

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = paths.config_file();
    let config = config::load_or_default(&config_path).unwrap_or_else(|e| {
        warn!("config error (using defaults): {e:#}");
        config::Config::default()
    });

    // ── Initial status ────────────────────────────────────────────────────────
    let status_path = paths.status_file();
    let mut current_status = ClientStatus::new(config.ui.view);
    status::write_status(&status_path, &current_status);

    let mut address_book = AddressBook::load(paths.address_book_file());

    // ── Core components ───────────────────────────────────────────────────────
    let gateway: Arc<dyn Gateway> =
        Arc::new(HttpGateway::new(&config.daemon.api_addr, paths.cookie_file()));
    let launcher: Arc<dyn DaemonControl> = Arc::new(ProcessLauncher::new(&config, paths.clone()));
    let readiness = ReadinessCoordinator::new(launcher.clone(), &config.readiness);

    let (event_tx, mut event_rx) = mpsc::channel::<ClientEvent>(64);
    let (view_tx, view_rx) = watch::channel(config.ui.view);

    let mut scheduler = PollScheduler::new(
        gateway.clone(),
        PollState::new(&config, SnapshotCache::new(paths.tx_cache_file())),
        config.poll.tick(),
        event_tx.clone(),
    );

    let arm = config.guard.arm_window();
    let send_guard = Arc::new(ArmGuard::new("send", SendFunds::new(gateway.clone()), arm));
    let seed_guard = Arc::new(ArmGuard::new("seed", RevealSeed::new(gateway.clone()), arm));
    let reset_guard = Arc::new(ArmGuard::new(
        "reset-chain",
        ResetChainData::new(
            launcher.clone(),
            readiness.clone(),
            gateway.clone(),
            Duration::from_millis(config.daemon.stop_settle_ms),
        ),
        arm,
    ));

    // ── Background tasks ──────────────────────────────────────────────────────
    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    tokio::spawn(console::run(event_tx.clone()));
    spawn_ensure_ready(&readiness, &event_tx);

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(ClientEvent::Shutdown).await;
            }
        });
    }

    println!("wallet-client v{} started", env!("CARGO_PKG_VERSION"));
    println!("{}", console::HELP);
    current_status.daemon = DaemonPhase::from(&readiness.state());
    status::write_status(&status_path, &current_status);

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut session_password: Option<String> = None;
    let mut last_dashboard_height: Option<u64> = None;
    let mut last_difficulty_height: Option<u64> = None;

    while let Some(evt) = event_rx.recv().await {
        match evt {
            ClientEvent::DaemonReady => {
                current_status.daemon = DaemonPhase::Ready;
                current_status.error = None;
                if actions::is_unlocked(gateway.as_ref()).await {
                    info!("wallet already unlocked");
                    current_status.unlocked = true;
                    scheduler.start(view_rx.clone());
                } else {
                    println!("Node ready. Unlock with `unlock <password>`.");
                }
            }

            ClientEvent::DaemonFailed(e) => {
                error!("daemon unavailable: {e}");
                current_status.daemon = DaemonPhase::from(&readiness.state());
                current_status.error = Some(actions::describe(&e));
                println!("{}", actions::describe(&e));
            }

            ClientEvent::Command(cmd) => match cmd {
                Command::View(view) => {
                    view_tx.send_replace(view);
                    current_status.view = view;
                    println!("Viewing {view}");
                    if view == View::History && current_status.unlocked {
                        let snapshot = scheduler.load_history().await;
                        current_status.history_from_cache = !snapshot.is_live;
                        print_history(&snapshot);
                    }
                    if view == View::Receive && current_status.unlocked {
                        match api::receive_address(gateway.as_ref()).await {
                            Ok(address) => println!("Receive address: {address}"),
                            Err(e) => report_error(&mut current_status, &e),
                        }
                    }
                    if view == View::Network && current_status.daemon == DaemonPhase::Ready {
                        match views::load_network(gateway.as_ref()).await {
                            Ok(network) => print_network(&network),
                            Err(e) => report_error(&mut current_status, &e),
                        }
                    }
                }
                Command::Send { address, amount } => {
                    let address = address_book.resolve(&address).to_string();
                    run_guarded(&send_guard, SendRequest { address, amount }, &event_tx, |r| {
                        let txid: String = r.txid.chars().take(16).collect();
                        format!("Sent. txid {txid}... fee {}", format::format_coins(r.fee))
                    });
                }
                Command::Seed => {
                    run_guarded(&seed_guard, session_password.clone(), &event_tx, |m| {
                        format!("Recovery seed: {m}")
                    });
                }
                Command::ResetChain => {
                    run_guarded(&reset_guard, session_password.clone(), &event_tx, |()| {
                        "Chain data reset. Resyncing from scratch.".to_string()
                    });
                }
                Command::Disarm => {
                    send_guard.disarm();
                    seed_guard.disarm();
                    reset_guard.disarm();
                    println!("Pending confirmations cleared");
                }
                Command::Unlock(password) => {
                    let readiness = readiness.clone();
                    let gateway = gateway.clone();
                    let tx = event_tx.clone();
                    tokio::spawn(async move {
                        match actions::unlock(&readiness, gateway.as_ref(), &password).await {
                            Ok(()) => {
                                let _ = tx.send(ClientEvent::Unlocked(password)).await;
                            }
                            Err(e) => {
                                warn!("unlock failed: {e}");
                                println!("{}", actions::unlock_message(&e));
                            }
                        }
                    });
                }
                Command::Lock => {
                    if let Err(e) = actions::lock(gateway.as_ref()).await {
                        warn!("lock failed: {e}");
                    }
                    scheduler.stop();
                    scheduler.reset_tracking().await;
                    session_password = None;
                    last_dashboard_height = None;
                    current_status.clear_wallet();
                    println!("Wallet locked");
                }
                Command::Mining(running) => match actions::set_mining(gateway.as_ref(), running).await {
                    Ok(()) => println!("Mining {}", if running { "started" } else { "stopped" }),
                    Err(e) => report_error(&mut current_status, &e),
                },
                Command::Threads(n) => match actions::set_mining_threads(gateway.as_ref(), n).await {
                    Ok(applied) => println!("Mining threads set to {applied}"),
                    Err(e) => report_error(&mut current_status, &e),
                },
                Command::Contacts(filter) => {
                    let matches: Vec<_> = match filter.as_deref() {
                        Some(query) => address_book.search(query),
                        None => address_book.entries().iter().collect(),
                    };
                    if matches.is_empty() {
                        println!("No saved contacts");
                    }
                    for (i, c) in address_book.entries().iter().enumerate() {
                        if matches.contains(&c) {
                            println!("  {:>2}. {:<20} {}", i + 1, c.name, c.address);
                        }
                    }
                }
                Command::ContactAdd { name, address } => {
                    match address_book.save_contact(&name, &address) {
                        Ok(()) => println!("Contact saved"),
                        Err(e) => report_error(&mut current_status, &e),
                    }
                }
                Command::ContactRename { index, name } => match address_book.rename(index, &name) {
                    Ok(()) => println!("Contact renamed"),
                    Err(e) => report_error(&mut current_status, &e),
                },
                Command::ContactRemove(index) => match address_book.remove(index) {
                    Ok(c) => println!("Removed {}", c.name),
                    Err(e) => report_error(&mut current_status, &e),
                },
                Command::Retry => {
                    readiness.reset();
                    current_status.daemon = DaemonPhase::from(&readiness.state());
                    spawn_ensure_ready(&readiness, &event_tx);
                }
                Command::Status => {
                    print_status(&current_status);
                    println!("polling = {}", scheduler.is_running());
                    print_armed(send_guard.name(), &send_guard.state());
                    print_armed(seed_guard.name(), &seed_guard.state());
                    print_armed(reset_guard.name(), &reset_guard.state());
                }
                Command::Quit => {
                    let _ = event_tx.try_send(ClientEvent::Shutdown);
                }
            },

            ClientEvent::Dashboard(model) => {
                debug!(tick = model.tick, "dashboard refreshed");
                apply_dashboard(&mut current_status, &model);
                let height = model.status.as_ref().map(|s| s.chain_height);
                if model.recent.is_some() && height != last_dashboard_height {
                    last_dashboard_height = height;
                    print_dashboard(&model);
                }
            }

            ClientEvent::Mining(model) => {
                debug!(tick = model.tick, "mining refreshed");
                let latest = model.difficulty.as_ref().and_then(|w| w.last_height());
                if latest != last_difficulty_height {
                    last_difficulty_height = latest;
                    print_mining(&model);
                }
            }

            ClientEvent::Inbound(ev) => {
                info!(previous = ev.previous, current = ev.current, "inbound funds");
                println!("Incoming funds: {} new output(s)", ev.current - ev.previous);
                current_status.last_inbound_at = Some(chrono::Local::now().to_rfc3339());
            }

            ClientEvent::ActionFinished { action, result } => match result {
                Ok(message) => {
                    println!("{message}");
                    current_status.error = None;
                    if action == "reset-chain" {
                        scheduler.reset_tracking().await;
                        last_dashboard_height = None;
                        last_difficulty_height = None;
                    }
                }
                Err(e) => {
                    warn!(action, "action failed: {e}");
                    report_error(&mut current_status, &e);
                }
            },

            ClientEvent::Unlocked(password) => {
                info!("wallet unlocked");
                println!("Wallet unlocked");
                session_password = Some(password);
                current_status.unlocked = true;
                current_status.daemon = DaemonPhase::from(&readiness.state());
                current_status.error = None;
                scheduler.start(view_rx.clone());
            }

            ClientEvent::ConfigReloaded(new_config) => {
                info!("config reloaded");
                view_tx.send_replace(new_config.ui.view);
                current_status.view = new_config.ui.view;
            }

            ClientEvent::Shutdown => {
                println!("Shutting down");
                scheduler.stop();
                current_status.error = None;
                status::write_status(&status_path, &current_status);
                break;
            }
        }
        status::write_status(&status_path, &current_status);
    }

    Ok(())
}

fn spawn_ensure_ready(readiness: &ReadinessCoordinator, tx: &mpsc::Sender<ClientEvent>) {
    let readiness = readiness.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let evt = match readiness.ensure_ready().await {
            Ok(()) => ClientEvent::DaemonReady,
            Err(e) => ClientEvent::DaemonFailed(e),
        };
        let _ = tx.send(evt).await;
    });
}

/// Triggers `guard` off the event loop. Prompts and validation errors are
/// printed directly; completed actions come back as `ActionFinished`.
fn run_guarded<A>(
    guard: &Arc<ArmGuard<A>>,
    input: A::Input,
    tx: &mpsc::Sender<ClientEvent>,
    render: fn(A::Output) -> String,
) where
    A: GuardedAction,
{
    let guard = guard.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        match guard.trigger(input).await {
            GuardOutcome::Invalid(e) => println!("{e}"),
            GuardOutcome::Armed { prompt, expires_in } => {
                println!("{prompt} Run again within {}s to confirm.", expires_in.as_secs())
            }
            GuardOutcome::Busy => println!("{} is already running", guard.name()),
            GuardOutcome::Completed(result) => {
                let _ = tx
                    .send(ClientEvent::ActionFinished {
                        action: guard.name(),
                        result: result.map(render),
                    })
                    .await;
            }
        }
    });
}

fn report_error(status: &mut ClientStatus, e: &ClientError) {
    let message = actions::describe(e);
    println!("{message}");
    status.error = Some(message);
}

fn apply_dashboard(status: &mut ClientStatus, model: &DashboardModel) {
    if let Some(chain) = &model.status {
        status.apply_chain(chain);
    }
    if let Some(balance) = &model.balance {
        status.apply_balance(balance);
    }
    if let Some(recent) = &model.recent {
        status.history_from_cache = recent.from_cache;
    }
}

fn print_dashboard(model: &DashboardModel) {
    if let Some(chain) = &model.status {
        println!(
            "Height {} | {} peers | mempool {}{}",
            chain.chain_height,
            chain.peers,
            chain.mempool_size,
            if chain.syncing { " | syncing" } else { "" }
        );
    }
    if let Some(balance) = &model.balance {
        println!(
            "Balance {} (pending {})",
            format::format_coins_short(balance.spendable),
            format::format_coins_short(balance.pending)
        );
    }
    if let Some(recent) = &model.recent {
        if let (Some(first), Some(last)) = (recent.balance_trend.first(), recent.balance_trend.last()) {
            println!(
                "{} unspent outputs | balance trend {}..{} over blocks {}..{}",
                recent.unspent, first.1, last.1, first.0, last.0
            );
        }
        if recent.from_cache {
            println!(
                "Recent activity (cached {})",
                recent.cached_at.as_deref().unwrap_or("earlier")
            );
        }
        for o in &recent.outputs {
            println!(
                "  {:>8}  {:<13} {}",
                o.block_height,
                o.kind_label(),
                format::format_coins_short(o.amount)
            );
        }
    }
}

fn print_mining(model: &MiningModel) {
    if let Some(m) = &model.status {
        println!(
            "Mining {} | {} threads | {:.1} H/s | {} blocks found",
            if m.running { "on" } else { "off" },
            m.threads,
            m.hashrate,
            m.blocks_found
        );
    }
    if let Some(w) = &model.difficulty {
        if let (Some(latest), Some((lo, hi))) = (w.latest(), w.value_range()) {
            println!(
                "Difficulty {:.0} at {} ({} blocks, range {:.0}..{:.0})",
                latest.value,
                latest.height,
                w.len(),
                lo,
                hi
            );
        }
    }
    match &model.mempool {
        Some(p) => println!(
            "Mempool {} tx, {} | fees {}/{:.0}/{}",
            p.count,
            format::format_bytes(p.size_bytes),
            p.min_fee,
            p.avg_fee,
            p.max_fee
        ),
        None => println!("Mempool unavailable"),
    }
}

fn print_network(network: &NetworkModel) {
    println!("{} peers connected", network.peers.count);
    if network.peers.peers.is_empty() {
        println!("  No peers connected");
    }
    for p in &network.peers.peers {
        println!("  {p}");
    }
    println!("{} banned", network.banned.count);
    if network.banned.banned.is_empty() {
        println!("  No banned peers");
    }
    for b in &network.banned.banned {
        let id: String = b.peer_id.chars().take(24).collect();
        println!("  {id}...  {}", b.reason);
    }
}

fn print_history(snapshot: &snapshot::Snapshot) {
    if !snapshot.is_live {
        println!("(showing cached history)");
    }
    if snapshot.data.is_empty() {
        println!("No transactions yet");
    }
    for o in snapshot::newest_first(&snapshot.data) {
        println!(
            "  {:>8}  {:<13} {}  {}",
            o.block_height,
            o.kind_label(),
            format::format_coins(o.amount),
            o.id
        );
    }
}

fn print_armed(name: &str, state: &guard::ArmState) {
    if let (true, Some(at)) = (state.armed, state.armed_at) {
        let left = state.ttl.saturating_sub(at.elapsed());
        println!("{name} armed, {}s left to confirm", left.as_secs());
    }
}

fn print_status(status: &ClientStatus) {
    match toml::to_string_pretty(status) {
        Ok(s) => println!("{s}"),
        Err(e) => warn!("failed to render status: {e}"),
    }
}
