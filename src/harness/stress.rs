//! Stress orchestrator and the single-stream round-trip check.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;

use super::driver::{compare, drive_connection, join_all, Workload};
use super::echo;
use super::error::{HarnessError, HarnessResult, SetupStage};
use super::rate_limiter::RateLimiter;
use super::sink::{collect, ErrorSink};
use super::types::{HarnessConfig, Options, RunStats, StressReport, SIMPLE_WRITE_SIZE};
use crate::metrics::recorder::{self, ScenarioTimer};
use crate::payload::{PayloadPool, DEFAULT_POOL_SIZE};
use crate::transport::{MuxConn, MuxConnPtr, Network, Role, TcpNetwork, Transport};

/// Runs workloads against one transport implementation.
#[derive(Clone)]
pub struct Harness {
    transport: Arc<dyn Transport>,
    network: Arc<dyn Network>,
    config: HarnessConfig,
    pool: PayloadPool,
}

impl Harness {
    pub fn new<T: Transport>(transport: T) -> Self {
        Self::with_config(transport, HarnessConfig::default())
    }

    pub fn with_config<T: Transport>(transport: T, config: HarnessConfig) -> Self {
        let pool = if config.pool_size == DEFAULT_POOL_SIZE {
            PayloadPool::global().clone()
        } else {
            PayloadPool::new(config.pool_size)
        };
        Self {
            transport: Arc::new(transport),
            network: Arc::new(TcpNetwork::new(config.bind_addr)),
            config,
            pool,
        }
    }

    /// Replace the raw network the harness listens and dials on.
    pub fn with_network<N: Network>(mut self, network: N) -> Self {
        self.network = Arc::new(network);
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn pool(&self) -> &PayloadPool {
        &self.pool
    }

    /// Dial a fresh echo server once, write one message on one stream, and
    /// check the echo byte for byte.
    pub async fn simple_write(&self) -> StressReport {
        self.simple_write_sized(SIMPLE_WRITE_SIZE).await
    }

    pub async fn simple_write_sized(&self, size: usize) -> StressReport {
        let options = Options::new(1, 1, 1, size);
        let timer = ScenarioTimer::start("simple_write");
        let stats = Arc::new(RunStats::new());
        let (sink, rx) = ErrorSink::channel();

        let run = {
            let this = self.clone();
            let stats = stats.clone();
            tokio::spawn(async move {
                if let Err(e) = this.round_trip(size, &stats, &sink).await {
                    sink.report(e);
                }
            })
        };

        let mut errors = collect(rx).await;
        if let Err(e) = run.await {
            errors.push(e.into());
        }
        let elapsed = timer.finish(errors.len());
        StressReport::new(options, errors, &stats, 1, elapsed)
    }

    async fn round_trip(
        &self,
        size: usize,
        stats: &RunStats,
        sink: &ErrorSink,
    ) -> HarnessResult<()> {
        let msg = self.pool.message(size)?;

        let (server, addr) = self.start_server(sink).await?;
        tracing::debug!("dialing {}", addr);
        let result = match self.dial(addr).await {
            Ok(conn) => {
                stats.connection_opened();
                let result = exchange(conn.as_ref(), &msg, stats, sink).await;
                // Closed whether or not the exchange succeeded.
                if let Err(e) = conn.close().await {
                    tracing::warn!("connection close failed: {}", e);
                }
                result
            }
            Err(e) => Err(e),
        };

        server.abort();
        let _ = server.await;
        result
    }

    /// Run `options.conn_num` connection workloads concurrently and collect
    /// every error any of them reported.
    pub async fn run_stress(&self, options: Options) -> StressReport {
        self.run_stress_named("stress", options).await
    }

    pub(crate) async fn run_stress_named(&self, name: &str, options: Options) -> StressReport {
        let timer = ScenarioTimer::start(name);
        let stats = Arc::new(RunStats::new());
        let limiter = RateLimiter::new(self.config.rate_limit);
        let (sink, rx) = ErrorSink::channel();

        tracing::info!(
            "{}: {} conns x {} streams x {} msgs ({}..={} bytes)",
            name,
            options.conn_num,
            options.stream_num,
            options.msg_num,
            options.msg_min,
            options.msg_max
        );

        let run = match self.check(&options) {
            Ok(()) => {
                let work = Workload {
                    options,
                    pool: self.pool.clone(),
                    limiter: limiter.clone(),
                    sink,
                    stats: stats.clone(),
                };
                Some(tokio::spawn(self.clone().open_conns_and_rw(work)))
            }
            Err(e) => {
                sink.report(e);
                drop(sink);
                None
            }
        };

        // Every sink is gone once this returns: no more errors can arrive.
        let mut errors = collect(rx).await;
        if let Some(run) = run {
            if let Err(e) = run.await {
                errors.push(e.into());
            }
        }

        let elapsed = timer.finish(errors.len());
        let report = StressReport::new(options, errors, &stats, limiter.peak(), elapsed);
        tracing::info!("{}: {}", name, report.summary());
        report
    }

    fn check(&self, options: &Options) -> HarnessResult<()> {
        options.validate(self.pool.len())?;
        // A connection unit holds its permit while its streams wait for theirs.
        if options.conn_num >= self.config.rate_limit {
            return Err(HarnessError::InvalidOptions(format!(
                "rate limit {} leaves no room for streams of {} connections",
                self.config.rate_limit, options.conn_num
            )));
        }
        Ok(())
    }

    async fn open_conns_and_rw(self, work: Workload) {
        tracing::debug!("opening {} conns", work.options.conn_num);

        let mut tasks = JoinSet::new();
        for _ in 0..work.options.conn_num {
            if work.sink.is_aborted() {
                break;
            }
            let this = self.clone();
            let work = work.clone();
            tasks.spawn(async move {
                work.limiter.run(this.open_conn_and_rw(&work)).await;
            });
        }
        join_all(tasks, &work.sink).await;
    }

    async fn open_conn_and_rw(&self, work: &Workload) {
        let (server, addr) = match self.start_server(&work.sink).await {
            Ok(started) => started,
            Err(e) => {
                work.sink.report(e);
                return;
            }
        };

        match self.dial(addr).await {
            Ok(conn) => {
                work.stats.connection_opened();
                recorder::record_connection_opened();
                drive_connection(conn, work).await;
            }
            Err(e) => work.sink.report(e),
        }

        server.abort();
        let _ = server.await;
    }

    /// Bind a fresh listener and run the echo server loop on it.
    async fn start_server(
        &self,
        sink: &ErrorSink,
    ) -> HarnessResult<(tokio::task::JoinHandle<()>, SocketAddr)> {
        let listener = self
            .network
            .listen()
            .await
            .map_err(|e| HarnessError::setup(SetupStage::Listen, e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| HarnessError::setup(SetupStage::Listen, e))?;
        tracing::debug!("listening at {}", addr);

        let server = tokio::spawn(echo::serve(
            self.transport.clone(),
            listener,
            sink.clone(),
        ));
        Ok((server, addr))
    }

    async fn dial(&self, addr: SocketAddr) -> HarnessResult<MuxConnPtr> {
        let raw = self
            .network
            .dial(addr)
            .await
            .map_err(|e| HarnessError::setup(SetupStage::Dial, e))?;
        self.transport
            .new_conn(raw, Role::Dialer)
            .await
            .map_err(|e| HarnessError::setup(SetupStage::WrapDialer, e))
    }
}

/// Write `msg` on a fresh stream of `conn` and check the echo.
async fn exchange(
    conn: &dyn MuxConn,
    msg: &[u8],
    stats: &RunStats,
    sink: &ErrorSink,
) -> HarnessResult<()> {
    tracing::debug!("creating stream");
    let mut stream = conn.open_stream().await.map_err(HarnessError::OpenStream)?;
    stats.stream_opened();

    tracing::debug!("writing {} bytes to stream", msg.len());
    stream
        .write_all(msg)
        .await
        .map_err(|source| HarnessError::Write { index: 0, source })?;
    stream
        .flush()
        .await
        .map_err(|source| HarnessError::Write { index: 0, source })?;
    stats.message_written();

    tracing::debug!("reading {} bytes from stream (echoed)", msg.len());
    let mut echoed = vec![0u8; msg.len()];
    stream
        .read_exact(&mut echoed)
        .await
        .map_err(|source| HarnessError::Read {
            index: 0,
            expected_len: msg.len(),
            source,
        })?;

    match compare(0, msg, &echoed) {
        Some(err) => sink.report(err),
        None => stats.message_verified(msg.len()),
    }

    if let Err(e) = stream.shutdown().await {
        tracing::debug!("stream close: {}", e);
    }
    Ok(())
}

impl std::fmt::Debug for Harness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Harness")
            .field("config", &self.config)
            .field("pool_len", &self.pool.len())
            .finish()
    }
}
