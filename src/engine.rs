use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SweepError};
use crate::icmp::IpVersion;
use crate::receiver::PingReceiver;
use crate::request_map::RequestMap;
use crate::result::{ping_result_channel, PingResult, PingResultReceiver, PingResultSender};
use crate::socket::{RawSocketFactory, SocketFactory};
use crate::target::PingTarget;
use crate::timeout::PingTimeoutMonitor;
use crate::transmitter::PingTransmitter;

// Read sockets time out quickly so the receiver observes a stop request
// even with no traffic.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(1);
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// State shared between the engine handle and its three workers.
pub(crate) struct EngineShared {
    pub(crate) version: IpVersion,
    pub(crate) socket_factory: Arc<dyn SocketFactory>,
    pub(crate) requests: RequestMap,
    pub(crate) targets: Mutex<Vec<Arc<PingTarget>>>,
    interval_ms: AtomicU64,
    timeout_ms: AtomicU64,
    epoch: Mutex<SystemTime>,
}

impl EngineShared {
    pub(crate) fn new(
        version: IpVersion,
        socket_factory: Arc<dyn SocketFactory>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        EngineShared {
            version,
            socket_factory,
            requests: RequestMap::new(),
            targets: Mutex::new(Vec::new()),
            interval_ms: AtomicU64::new(as_millis(interval)),
            timeout_ms: AtomicU64::new(as_millis(timeout)),
            epoch: Mutex::new(SystemTime::now()),
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn set_interval(&self, interval: Duration) {
        self.interval_ms.store(as_millis(interval), Ordering::Relaxed);
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    pub(crate) fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(as_millis(timeout), Ordering::Relaxed);
    }

    pub(crate) fn epoch(&self) -> SystemTime {
        *self.epoch.lock()
    }

    pub(crate) fn set_epoch(&self, epoch: SystemTime) {
        *self.epoch.lock() = epoch;
    }
}

fn as_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EngineState {
    New,
    Running,
    Halted,
}

struct WorkerHandle {
    name: &'static str,
    halt_tx: mpsc::Sender<()>,
    stopped_rx: mpsc::Receiver<()>,
    handle: thread::JoinHandle<()>,
}

fn spawn_worker<F>(name: &'static str, work: F) -> Result<WorkerHandle>
where
    F: FnOnce(mpsc::Receiver<()>) + Send + 'static,
{
    let (halt_tx, halt_rx) = mpsc::channel::<()>();
    let (stopped_tx, stopped_rx) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name(format!("ping-sweep-{name}"))
        .spawn(move || {
            work(halt_rx);
            let _ = stopped_tx.send(());
        })?;
    Ok(WorkerHandle {
        name,
        halt_tx,
        stopped_rx,
        handle,
    })
}

/// The probing engine: owns the transmitter, receiver and timeout workers,
/// the shared request table and the target list, and funnels every resolved
/// probe into one result channel.
///
/// Workers run only between [`start`](PingEngine::start) and
/// [`stop`](PingEngine::stop); a halted engine stays halted. Dropping the
/// engine stops it.
pub struct PingEngine {
    shared: Arc<EngineShared>,
    payload_size: usize,
    state: EngineState,
    workers: Vec<WorkerHandle>,
    results_tx: Option<PingResultSender>,
    results_rx: PingResultReceiver,
}

impl PingEngine {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_socket_factory(config, Arc::new(RawSocketFactory::new(config.socket_type)))
    }

    /// Build an engine on a caller-supplied socket factory, e.g. one that
    /// hands several engines the same read socket, or a test transport.
    #[must_use]
    pub fn with_socket_factory(config: Config, socket_factory: Arc<dyn SocketFactory>) -> Self {
        let (results_tx, results_rx) = ping_result_channel(config.channel_size);
        PingEngine {
            shared: Arc::new(EngineShared::new(
                config.version,
                socket_factory,
                config.interval,
                config.timeout,
            )),
            payload_size: config.payload_size,
            state: EngineState::New,
            workers: Vec::new(),
            results_tx: Some(results_tx),
            results_rx,
        }
    }

    /// Register a destination. The transmitter picks it up on its next
    /// cycle, so this is safe before and during a run.
    pub fn add_target(&self, host_address: IpAddr) -> Result<Arc<PingTarget>> {
        self.add_target_with_ttl(host_address, 0)
    }

    /// Register a TTL-limited destination for traceroute-style probing.
    pub fn add_target_with_ttl(&self, host_address: IpAddr, ttl: u8) -> Result<Arc<PingTarget>> {
        let family_matches = matches!(
            (host_address, self.shared.version),
            (IpAddr::V4(_), IpVersion::V4) | (IpAddr::V6(_), IpVersion::V6)
        );
        if !family_matches {
            return Err(SweepError::AddressFamily {
                address: host_address,
                version: self.shared.version,
            });
        }

        let target = Arc::new(PingTarget::new(host_address, ttl));
        self.shared.targets.lock().push(Arc::clone(&target));
        Ok(target)
    }

    /// Deregister a target so no further probes are sent to it. Probes
    /// already in flight still resolve normally. Returns whether the target
    /// was registered.
    pub fn remove_target(&self, target: &Arc<PingTarget>) -> bool {
        let mut targets = self.shared.targets.lock();
        let before = targets.len();
        targets.retain(|registered| !Arc::ptr_eq(registered, target));
        targets.len() != before
    }

    #[must_use]
    pub fn targets(&self) -> Vec<Arc<PingTarget>> {
        self.shared.targets.lock().clone()
    }

    /// Takes effect at the top of the transmitter's next cycle.
    pub fn set_interval(&self, interval: Duration) {
        self.shared.set_interval(interval);
    }

    /// Takes effect at the timeout monitor's next sweep.
    pub fn set_timeout(&self, timeout: Duration) {
        self.shared.set_timeout(timeout);
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval()
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.shared.timeout()
    }

    #[must_use]
    pub fn version(&self) -> IpVersion {
        self.shared.version
    }

    /// Wall-clock reference point, rewritten when transmission begins.
    /// Consumers use it to anchor monotonic timings on an absolute timeline.
    #[must_use]
    pub fn epoch(&self) -> SystemTime {
        self.shared.epoch()
    }

    /// Spawn the transmitter, receiver and timeout workers. Fails without
    /// side effects if the read socket cannot be created.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            EngineState::Running => return Err(SweepError::AlreadyRunning),
            EngineState::Halted => return Err(SweepError::AlreadyHalted),
            EngineState::New => {}
        }

        // a read socket that cannot be opened must fail loudly here rather
        // than surface as eternal silence on the result channel
        let read_socket = self
            .shared
            .socket_factory
            .read_socket(self.shared.version, RECEIVE_TIMEOUT)?;

        let results_tx = self
            .results_tx
            .take()
            .expect("results sender present before start");

        let transmitter = PingTransmitter::new(
            Arc::clone(&self.shared),
            results_tx.clone(),
            self.payload_size,
        );
        let receiver = PingReceiver::new(Arc::clone(&self.shared), read_socket, results_tx.clone());
        let timeout_monitor = PingTimeoutMonitor::new(Arc::clone(&self.shared), results_tx);

        let spawned: Result<()> = (|| {
            self.workers.push(spawn_worker("transmitter", move |halt_rx| {
                transmitter.run(&halt_rx);
            })?);
            self.workers.push(spawn_worker("receiver", move |halt_rx| {
                receiver.run(&halt_rx);
            })?);
            self.workers.push(spawn_worker("timeout", move |halt_rx| {
                timeout_monitor.run(&halt_rx);
            })?);
            Ok(())
        })();

        if let Err(e) = spawned {
            let _ = self.halt_workers();
            self.state = EngineState::Halted;
            return Err(e);
        }

        self.state = EngineState::Running;
        Ok(())
    }

    /// Signal all workers to stop and wait up to the grace period for each.
    /// After `stop` returns no further results are emitted. A worker that
    /// misses the grace period is detached as a last resort and reported as
    /// [`SweepError::ShutdownTimeout`].
    pub fn stop(&mut self) -> Result<()> {
        if self.state == EngineState::Halted {
            return Ok(());
        }
        self.state = EngineState::Halted;

        let result = self.halt_workers();
        let orphaned = self.shared.requests.len();
        if orphaned > 0 {
            tracing::trace!(orphaned, "dropping unresolved probes at teardown");
        }
        self.shared.requests.clear();
        result
    }

    fn halt_workers(&mut self) -> Result<()> {
        for worker in &self.workers {
            // send fails only if the worker is already gone
            let _ = worker.halt_tx.send(());
        }

        let mut first_error = None;
        for worker in self.workers.drain(..) {
            match worker.stopped_rx.recv_timeout(TERMINATE_GRACE) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    if worker.handle.join().is_err() {
                        tracing::error!(worker = worker.name, "worker panicked");
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    tracing::error!(
                        worker = worker.name,
                        "worker did not stop within grace period, detaching"
                    );
                    if first_error.is_none() {
                        first_error = Some(SweepError::ShutdownTimeout {
                            worker: worker.name,
                        });
                    }
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Block until the next result. Returns [`SweepError::Stopped`] once the
    /// engine is stopped and the channel has drained.
    pub fn next_result(&self) -> Result<PingResult> {
        self.results_rx.recv().map_err(|_| SweepError::Stopped)
    }

    pub fn try_next_result(&self) -> Option<PingResult> {
        self.results_rx.try_recv().ok()
    }
}

impl Drop for PingEngine {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
