//! The heavy-load controller.
//!
//! A background thread samples each logger every scan interval:
//!
//! 1. if process memory is past the watermark while disk writes are
//!    pending, it forces a full storage drain (at most one in flight);
//! 2. if the append rate passed the threshold, the heavy-load flag goes
//!    up and synchronous emission and direct persistence are deferred;
//! 3. after enough consecutive quiet scans the flag comes down and a
//!    partial alignment pass (at most one in flight) catches the sink
//!    and the chunk files up.
//!
//! The hysteresis in step 3 keeps the flag from oscillating at rate
//! boundaries. On shutdown the controller performs a final full drain and
//! acknowledges over the channel it was handed, so `close()` returns only
//! once everything is emitted and persisted.
//!
//! The thread holds only a weak reference to its node; when the last
//! handle disappears, the next tick notices and the thread exits on its
//! own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use sysinfo::{ProcessesToUpdate, System};

use crate::config::MonitorOptions;
use crate::logger::{Backend, Node};

type ShutdownSender = Sender<Sender<()>>;

/// Spawns the controller thread for `node`.
pub(crate) fn spawn(
    node: Weak<Node>,
    opts: MonitorOptions,
) -> (ShutdownSender, JoinHandle<()>) {
    let (shutdown_tx, shutdown_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("strata-load-monitor".to_string())
        .spawn(move || monitor_loop(&node, &opts, &shutdown_rx))
        .expect("failed to spawn heavy-load monitor thread");

    (shutdown_tx, handle)
}

fn monitor_loop(node: &Weak<Node>, opts: &MonitorOptions, shutdown_rx: &Receiver<Sender<()>>) {
    let mut system = System::new();
    let mut release_counter = 0usize;
    let forced_drain_running = Arc::new(AtomicBool::new(false));
    let partial_align_running = Arc::new(AtomicBool::new(false));

    loop {
        match shutdown_rx.recv_timeout(opts.scan_interval) {
            Ok(ack) => {
                if let Some(node) = node.upgrade() {
                    if let Err(e) = node.drain_all(opts.max_logs_per_scan) {
                        tracing::error!(error = %e, "final drain failed during shutdown");
                    }
                }
                let _ = ack.send(());
                return;
            }
            Err(RecvTimeoutError::Timeout) => {
                let Some(node) = node.upgrade() else { return };
                tick(
                    &node,
                    opts,
                    &mut system,
                    &mut release_counter,
                    &forced_drain_running,
                    &partial_align_running,
                );
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn tick(
    node: &Arc<Node>,
    opts: &MonitorOptions,
    system: &mut System,
    release_counter: &mut usize,
    forced_drain_running: &Arc<AtomicBool>,
    partial_align_running: &Arc<AtomicBool>,
) {
    // Memory watchdog: force the pending buffers to disk when the process
    // is past the watermark, regardless of the heavy-load state.
    if let Backend::Tiered(storage) = &node.backend {
        if storage.has_pending()
            && process_memory_bytes(system) > opts.max_mem_usage
            && !forced_drain_running.swap(true, Ordering::SeqCst)
        {
            let node = Arc::clone(node);
            let running = Arc::clone(forced_drain_running);
            let spawned = thread::Builder::new()
                .name("strata-forced-drain".to_string())
                .spawn(move || {
                    if let Backend::Tiered(storage) = &node.backend {
                        if let Err(e) = storage.align_storage(true) {
                            tracing::error!(error = %e, "forced storage drain failed");
                        }
                    }
                    running.store(false, Ordering::SeqCst);
                });
            if spawned.is_err() {
                forced_drain_running.store(false, Ordering::SeqCst);
            }
        }
    }

    let appended = node.counter.swap(0, Ordering::Relaxed);

    if appended > opts.max_logs_per_scan {
        *release_counter = 0;
        node.set_heavy(true);
        return;
    }

    *release_counter += 1;
    if *release_counter <= opts.negative_scans_before_align {
        return;
    }

    node.set_heavy(false);

    if !partial_align_running.swap(true, Ordering::SeqCst) {
        let node = Arc::clone(node);
        let running = Arc::clone(partial_align_running);
        let batch = opts.max_logs_per_scan;
        let spawned = thread::Builder::new()
            .name("strata-align".to_string())
            .spawn(move || {
                run_partial_align(&node, batch);
                running.store(false, Ordering::SeqCst);
            });
        if spawned.is_err() {
            partial_align_running.store(false, Ordering::SeqCst);
        }
    }
}

/// One partial alignment pass: sink first, then the chunk files. Both
/// sides stop early if heavy load returns mid-pass.
fn run_partial_align(node: &Node, batch: usize) {
    if let Err(e) = node.align_output(false, batch) {
        tracing::error!(error = %e, "sink alignment failed");
    }
    if let Backend::Tiered(storage) = &node.backend {
        if let Err(e) = storage.align_storage(false) {
            tracing::error!(error = %e, "storage alignment failed");
        }
    }
}

fn process_memory_bytes(system: &mut System) -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), false);
    system.process(pid).map_or(0, sysinfo::Process::memory)
}
