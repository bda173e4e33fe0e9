//! Nameserver lifecycle.
//!
//! A [`Nameserver`] moves through [`ServerState`]s:
//!
//! ```text
//! Created -> Parsing -> Listening -> Serving
//!                           \            \
//!                            `-> Failed <-'
//! ```
//!
//! Static records are parsed before the transport is bound, and the started callback fires
//! once the socket is bound. [`launch`] waits for every nameserver to get there before it
//! returns, so nothing can publish a challenge that no nameserver could answer.

use crate::bridge::ChallengeBridge;
use crate::challenge_store::{self, DynTokenStore};
use crate::config::{Shared, Transport};
use crate::dns::engine::QueryEngine;
use crate::dns::handlers::Handler;
use crate::dns::records::RecordStore;
use crate::error::Error;
use crate::notification::DynNotifier;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};
use trust_dns_server::ServerFuture;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Parsing,
    Listening,
    Serving,
    Failed,
}

type StartedFn = Box<dyn FnOnce(SocketAddr) + Send>;

pub struct Nameserver {
    config: Shared,
    transport: Transport,
    notifier: DynNotifier,
    records: RecordStore,
    tokens: DynTokenStore,
    state: watch::Sender<ServerState>,
    notify_started: Option<StartedFn>,
}

impl Nameserver {
    pub fn new(config: Shared, transport: Transport, notifier: DynNotifier) -> Self {
        let (state, _) = watch::channel(ServerState::Created);
        Nameserver {
            config,
            transport,
            notifier,
            records: RecordStore::default(),
            tokens: challenge_store::new_shared(),
            state,
            notify_started: None,
        }
    }

    /// Load the static records from the configuration. Only the first call does anything.
    ///
    /// # Errors
    ///
    /// Returns the [`RecordStore::from_config`] error for invalid record lines.
    pub fn parse_records(&mut self) -> Result<(), Error> {
        if *self.state.borrow() != ServerState::Created {
            return Ok(());
        }
        self.state.send_replace(ServerState::Parsing);
        self.records = RecordStore::from_config(&self.config)?;
        Ok(())
    }

    /// Register a callback fired once, with the bound address, when the nameserver is
    /// listening.
    pub fn set_notify_started(&mut self, f: impl FnOnce(SocketAddr) + Send + 'static) {
        self.notify_started = Some(Box::new(f));
    }

    pub fn tokens(&self) -> DynTokenStore {
        self.tokens.clone()
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind and serve until the transport fails. A failure is pushed to `errors` once and
    /// leaves the nameserver [`ServerState::Failed`]; it is never retried.
    pub async fn start(mut self, errors: mpsc::Sender<Error>) {
        let addr = self.config.dns_bind_addr();
        info!(addr = %addr, proto = %self.transport, "starting DNS listener");
        if let Err(err) = self.serve(addr).await {
            self.state.send_replace(ServerState::Failed);
            error!(addr = %addr, proto = %self.transport, error = %err, "DNS listener failed");
            let _ = errors.send(err).await;
        }
    }

    async fn serve(&mut self, addr: SocketAddr) -> Result<(), Error> {
        let records = Arc::new(std::mem::take(&mut self.records));
        let engine = QueryEngine::new(
            &self.config,
            records,
            self.tokens.clone(),
            self.notifier.clone(),
        )?;
        let mut server = ServerFuture::new(Handler::new(engine));

        let local_addr = match self.transport {
            Transport::Udp => {
                let socket = UdpSocket::bind(addr).await?;
                let local_addr = socket.local_addr()?;
                server.register_socket(socket);
                local_addr
            }
            Transport::Tcp => {
                let listener = TcpListener::bind(addr).await?;
                let local_addr = listener.local_addr()?;
                server.register_listener(listener, self.config.dns_tcp_timeout);
                local_addr
            }
        };

        self.state.send_replace(ServerState::Listening);
        info!(addr = %local_addr, proto = %self.transport, "DNS listening");
        if let Some(notify_started) = self.notify_started.take() {
            notify_started(local_addr);
        }

        self.state.send_replace(ServerState::Serving);
        server.block_until_done().await?;
        info!(addr = %local_addr, proto = %self.transport, "DNS listener stopped");
        Ok(())
    }
}

/// The running nameservers, available once all of them are listening.
pub struct Launched {
    /// Publishes challenge tokens to every nameserver.
    pub bridge: ChallengeBridge,
    /// Terminal nameserver errors. The first one is fatal.
    pub errors: mpsc::Receiver<Error>,
    /// The bound address of each nameserver.
    pub local_addrs: Vec<(Transport, SocketAddr)>,
    pub states: Vec<watch::Receiver<ServerState>>,
    handles: Vec<JoinHandle<()>>,
}

impl Launched {
    /// Wait for the first nameserver failure. Returns `None` if every nameserver stopped
    /// cleanly.
    pub async fn failure(&mut self) -> Option<Error> {
        self.errors.recv().await
    }

    pub fn shutdown(self) {
        for handle in self.handles {
            handle.abort();
        }
    }
}

/// Start one nameserver per configured transport and wait until every one of them is
/// listening.
///
/// # Errors
///
/// Returns a record parsing error, or the error of a nameserver that failed to bind.
pub async fn launch(config: Shared, notifier: DynNotifier) -> Result<Launched, Error> {
    let transports = config.transports()?;
    let (error_tx, mut error_rx) = mpsc::channel(transports.len().max(1));

    let mut stores = Vec::with_capacity(transports.len());
    let mut states = Vec::with_capacity(transports.len());
    let mut started = Vec::with_capacity(transports.len());
    let mut handles = Vec::with_capacity(transports.len());
    for transport in transports {
        let mut nameserver = Nameserver::new(config.clone(), transport, notifier.clone());
        nameserver.parse_records()?;

        let (started_tx, started_rx) = oneshot::channel();
        nameserver.set_notify_started(move |addr| {
            let _ = started_tx.send(addr);
        });
        stores.push(nameserver.tokens());
        states.push(nameserver.state());
        started.push((transport, started_rx));
        handles.push(tokio::spawn(nameserver.start(error_tx.clone())));
    }
    drop(error_tx);

    let mut local_addrs = Vec::with_capacity(started.len());
    for (transport, started_rx) in started {
        match started_rx.await {
            Ok(addr) => local_addrs.push((transport, addr)),
            Err(_) => {
                for handle in &handles {
                    handle.abort();
                }
                return Err(error_rx
                    .recv()
                    .await
                    .unwrap_or(Error::NotListening(config.dns_bind_addr())));
            }
        }
    }

    Ok(Launched {
        bridge: ChallengeBridge::new(stores),
        errors: error_rx,
        local_addrs,
        states,
        handles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::notification::NullNotifier;

    fn config(protocol: &str, port: u16) -> Shared {
        Arc::new(
            Config::try_from_str(&format!(
                r#"{{
                    "ip": "127.0.0.1",
                    "dns_port": {port},
                    "dns_protocol": "{protocol}",
                    "default_domain": "catch.test",
                    "domains": ["catch.test"],
                    "ns_name": "ns1.catch.test",
                    "ns_admin": "admin@catch.test",
                    "api_bind_addr": "127.0.0.1:3000"
                }}"#
            ))
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn states_progress_and_started_fires_after_listening() {
        let mut nameserver =
            Nameserver::new(config("udp", 0), Transport::Udp, Arc::new(NullNotifier));
        let state = nameserver.state();
        assert_eq!(*state.borrow(), ServerState::Created);

        nameserver.parse_records().unwrap();
        assert_eq!(*state.borrow(), ServerState::Parsing);

        let (tx, rx) = oneshot::channel();
        let observed = nameserver.state();
        nameserver.set_notify_started(move |addr| {
            let _ = tx.send((addr, *observed.borrow()));
        });

        let (errors, _error_rx) = mpsc::channel(1);
        let handle = tokio::spawn(nameserver.start(errors));

        let (addr, at_start) = rx.await.unwrap();
        assert_eq!(at_start, ServerState::Listening);
        assert_ne!(addr.port(), 0);

        let mut state = state;
        state
            .wait_for(|s| *s == ServerState::Serving)
            .await
            .unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn launch_waits_for_every_transport() {
        let launched = launch(config("both", 0), Arc::new(NullNotifier))
            .await
            .unwrap();
        let transports: Vec<Transport> = launched.local_addrs.iter().map(|(t, _)| *t).collect();
        assert_eq!(transports, vec![Transport::Udp, Transport::Tcp]);
        assert_eq!(launched.bridge.len(), 2);
        for state in &launched.states {
            assert!(matches!(
                *state.borrow(),
                ServerState::Listening | ServerState::Serving
            ));
        }
        launched.shutdown();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = launch(config("udp", port), Arc::new(NullNotifier)).await;
        assert!(matches!(result, Err(Error::IO(_))));
    }
}
