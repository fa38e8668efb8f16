// src/server.rs
//! Connection orchestrator.
//!
//! The [`Server`] owns the listener, the store handle, the rendezvous barrier
//! and the shared result slot; there is no process-wide state. It accepts exactly
//! `agencies` connections, hands each one to its own task immediately (the
//! accept loop never waits on a worker), and joins the workers once all
//! connections are in flight.
//!
//! Each worker runs the batch protocol to completion, rendezvouses at the
//! barrier, and then writes back its own agency's winners. The draw runs
//! exactly once: after the barrier releases, every worker races a
//! compare-and-set claim on the result slot and the single winner computes
//! and publishes. A worker that fails before the rendezvous aborts the
//! barrier so its peers fail fast instead of waiting forever.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::draw::{run_draw, Winners};
use crate::metrics::Metrics;
use crate::protocol::{run_batch_phase, write_exactly};
use crate::store::Store;
use crate::sync::{Barrier, ResultSlot};

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub backlog: u32,
    pub agencies: usize,
}

pub struct Server {
    cfg: ServerConfig,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
}

impl Server {
    pub fn new(cfg: ServerConfig, store: Arc<Store>) -> Self {
        Self {
            cfg,
            store,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Bind the configured address and serve one full run.
    ///
    /// `shutdown` flips to `true` when the process should stop; it is checked
    /// at the accept loop and inside every worker's blocking section.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<()> {
        let socket = match self.cfg.bind {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket
            .bind(self.cfg.bind)
            .with_context(|| format!("bind {}", self.cfg.bind))?;
        let listener = socket.listen(self.cfg.backlog)?;
        info!(
            "listening on {} for {} agencies",
            listener.local_addr()?,
            self.cfg.agencies
        );
        self.run_with_listener(listener, shutdown).await
    }

    /// Serve one full run on an already-bound listener (used by tests, which
    /// bind port 0 and read back the local address).
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let n = self.cfg.agencies;
        let barrier = Arc::new(Barrier::new(n));
        let slot = Arc::new(ResultSlot::<Winners>::new());
        let mut workers: Vec<JoinHandle<Result<()>>> = Vec::with_capacity(n);

        for i in 0..n {
            let (stream, addr) = tokio::select! {
                accepted = listener.accept() => accepted.context("accept")?,
                _ = shutdown.changed() => {
                    info!("shutdown: stopping accept loop with {i}/{n} agencies connected");
                    barrier.abort();
                    break;
                }
            };
            stream.set_nodelay(true).ok();
            self.metrics.inc_connections();
            info!("accept: agency connection {}/{n} from {addr}", i + 1);

            workers.push(tokio::spawn(agency_worker(
                stream,
                addr,
                self.store.clone(),
                barrier.clone(),
                slot.clone(),
                self.metrics.clone(),
                shutdown.clone(),
            )));
        }
        drop(listener);

        let mut first_err = None;
        for handle in workers {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("worker failed: {e:#}");
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    error!("worker panicked: {e}");
                    first_err.get_or_insert(anyhow!(e));
                }
            }
        }

        info!("run summary: {}", self.metrics.summary());
        if *shutdown.borrow() {
            return Ok(());
        }
        match first_err {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

async fn agency_worker(
    mut stream: TcpStream,
    addr: SocketAddr,
    store: Arc<Store>,
    barrier: Arc<Barrier>,
    slot: Arc<ResultSlot<Winners>>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    tokio::select! {
        served = serve_agency(&mut stream, &store, &barrier, &slot, &metrics) => {
            served.with_context(|| format!("agency connection {addr}"))
        }
        _ = shutdown.changed() => {
            // Returning drops the stream, which closes the connection.
            barrier.abort();
            Err(anyhow!("shutdown during agency session {addr}"))
        }
    }
}

async fn serve_agency(
    stream: &mut TcpStream,
    store: &Store,
    barrier: &Barrier,
    slot: &ResultSlot<Winners>,
    metrics: &Metrics,
) -> Result<()> {
    let agency = match run_batch_phase(stream, store, metrics).await {
        Ok(agency) => agency,
        Err(e) => {
            metrics.inc_protocol_errors();
            barrier.abort();
            return Err(e).context("batch phase");
        }
    };
    info!("agency {agency}: finished submitting");

    if barrier.wait().await.is_err() {
        return Err(anyhow!("agency {agency}: draw abandoned, a peer failed"));
    }

    if slot.try_claim() {
        match run_draw(store).await {
            Ok(winners) => {
                info!("draw complete: {} winning bet(s)", winners.total());
                slot.publish(winners);
            }
            Err(e) => {
                slot.fail();
                return Err(e).context("draw");
            }
        }
    }

    let winners = slot
        .get()
        .await
        .map_err(|_| anyhow!("agency {agency}: draw result unavailable"))?;
    let docs = winners.for_agency(u32::from(agency));
    let mut payload = String::with_capacity(docs.len() * 12);
    for doc in docs {
        payload.push_str(doc);
        payload.push('\n');
    }

    let wrote = write_exactly(stream, payload.as_bytes()).await?;
    if wrote < payload.len() {
        return Err(anyhow!(
            "agency {agency}: short response write ({wrote} of {} bytes)",
            payload.len()
        ));
    }
    metrics.inc_responses();
    info!("agency {agency}: sent {} winner(s)", docs.len());

    let _ = stream.shutdown().await;
    Ok(())
}
