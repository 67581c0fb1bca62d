use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use tracing::warn;

use stockhold_events::{EventBus, Subscription};

/// Handle to control and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Generic bus consumer loop.
///
/// - Subscribes before the thread starts, so nothing published after `spawn` returns is missed
/// - Applies the handler to each message in publish order
/// - Stops on shutdown or when every publisher is gone
#[derive(Debug)]
pub struct EventWorker;

impl EventWorker {
    /// Spawn a worker thread that processes messages from the bus.
    ///
    /// `handler` must tolerate duplicates (at-least-once delivery).
    pub fn spawn<M, B, H, E>(name: &str, bus: &B, mut handler: H) -> std::io::Result<WorkerHandle>
    where
        M: Send + 'static,
        B: EventBus<M>,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Debug + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();
        let worker_name = name.to_string();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(&worker_name, sub, shutdown_rx, &mut handler))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(name: &str, sub: Subscription<M>, shutdown_rx: mpsc::Receiver<()>, handler: &mut H)
where
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Debug,
{
    let tick = Duration::from_millis(250);

    loop {
        if shutdown_rx.try_recv().is_ok() {
            // Drain what is already buffered before stopping.
            for msg in sub.drain() {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "event worker handler failed");
                }
            }
            break;
        }

        match sub.recv_timeout(tick) {
            Ok(msg) => {
                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = ?err, "event worker handler failed");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
