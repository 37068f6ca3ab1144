use crate::base::deadline::Deadline;
use crate::base::endpoint::TargetEndpoint;
use crate::base::loadstate::LoadState;
use crate::base::neterror::NetError;
use crate::http::altsvc::parse_alt_svc;
use crate::http::response::RequestResult;
use crate::http::streamfactory::{HttpStreamFactory, ResponseHead};
use crate::observer::ConnectionObserver;
use crate::socket::pool::{PoolKey, PooledStream};
use crate::socket::transport::Transport;
use http::header::ALT_SVC;
use std::time::Instant;
use tracing::debug;

/// Internal state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    CreateStream,
    SendRequest,
    ReadBody,
    Done,
}

impl State {
    /// Map internal state to public LoadState.
    fn to_load_state(self) -> LoadState {
        match self {
            State::Idle => LoadState::Idle,
            State::CreateStream => LoadState::Connecting,
            State::SendRequest => LoadState::WaitingForResponse,
            State::ReadBody => LoadState::ReadingResponse,
            State::Done => LoadState::Complete,
        }
    }
}

/// Knobs a transaction takes from its client.
#[derive(Debug, Clone)]
pub struct TransactionOptions<'a> {
    pub user_agent: &'a str,
    pub reuse_connections: bool,
    pub max_body_bytes: Option<usize>,
}

/// One GET over one transport: get a stream, send, read headers, read body.
pub struct HttpNetworkTransaction<'a> {
    factory: &'a HttpStreamFactory,
    transport: &'a Transport,
    endpoint: &'a TargetEndpoint,
    observer: &'a dyn ConnectionObserver,
    options: TransactionOptions<'a>,
    state: State,
    stream: Option<PooledStream>,
    head: Option<ResponseHead>,
    stream_reused: bool,
    /// Return streams to the pool when done.
    pooling: bool,
    started: Instant,
    result: RequestResult,
}

impl<'a> HttpNetworkTransaction<'a> {
    pub fn new(
        factory: &'a HttpStreamFactory,
        transport: &'a Transport,
        endpoint: &'a TargetEndpoint,
        observer: &'a dyn ConnectionObserver,
        options: TransactionOptions<'a>,
    ) -> Self {
        Self {
            factory,
            transport,
            endpoint,
            observer,
            options: options.clone(),
            state: State::Idle,
            stream: None,
            head: None,
            stream_reused: false,
            pooling: options.reuse_connections,
            started: Instant::now(),
            result: RequestResult::default(),
        }
    }

    /// Get the current load state (for progress reporting).
    pub fn get_load_state(&self) -> LoadState {
        self.state.to_load_state()
    }

    /// Run the transaction to completion or until `deadline` fires.
    pub async fn start(&mut self, deadline: &Deadline) -> Result<(), NetError> {
        self.started = Instant::now();
        self.state = State::CreateStream;
        let outcome = deadline.run(self.do_loop(deadline)).await;
        self.result.timing.total = self.started.elapsed();
        if let Err(e) = &outcome {
            debug!(endpoint = %self.endpoint, state = self.get_load_state().as_str(), error = %e, "transaction failed");
            self.result.error = Some(e.clone());
            self.stream = None;
            self.head = None;
        }
        self.state = State::Done;
        outcome
    }

    async fn do_loop(&mut self, deadline: &Deadline) -> Result<(), NetError> {
        loop {
            match self.state {
                State::Idle | State::Done => return Ok(()),
                State::CreateStream => {
                    let (pooled, info) = self
                        .factory
                        .request_stream(
                            self.transport,
                            self.endpoint,
                            self.observer,
                            deadline,
                            self.options.reuse_connections,
                        )
                        .await?;
                    self.result.protocol = Some(pooled.stream.protocol());
                    self.result.remote_addr = Some(pooled.remote_addr);
                    self.result.reused = info.reused;
                    self.result.timing.connect = info.connect;
                    self.stream_reused = info.reused;
                    self.stream = Some(pooled);
                    self.state = State::SendRequest;
                }
                State::SendRequest => {
                    let pooled = self.stream.as_mut().ok_or(NetError::ConnectionClosed)?;
                    let sent = pooled
                        .stream
                        .get(self.endpoint, self.options.user_agent, self.options.max_body_bytes)
                        .await;
                    match sent {
                        Ok(head) => {
                            self.result.timing.headers_received = Some(self.started.elapsed());
                            self.result.status = Some(head.status);
                            self.result.alt_svc = head
                                .headers
                                .get_all(ALT_SVC)
                                .iter()
                                .filter_map(|v| v.to_str().ok())
                                .flat_map(parse_alt_svc)
                                .collect();
                            self.head = Some(head);
                            self.state = State::ReadBody;
                        }
                        Err(e) if self.stream_reused && is_stale_connection(&e) => {
                            // The pooled connection died while idle; dial a fresh one.
                            debug!(error = %e, "pooled connection unusable, redialing");
                            self.stream = None;
                            self.stream_reused = false;
                            self.options.reuse_connections = false;
                            self.state = State::CreateStream;
                        }
                        Err(e) => return Err(e),
                    }
                }
                State::ReadBody => {
                    let head = self.head.take().ok_or(NetError::EmptyResponse)?;
                    let body = head.body.collect(self.options.max_body_bytes).await?;
                    self.result.body_len = body.len();
                    self.release_stream();
                    self.state = State::Done;
                }
            }
        }
    }

    /// Hand the stream back to the pool after a complete exchange.
    fn release_stream(&mut self) {
        let Some(pooled) = self.stream.take() else {
            return;
        };
        if !self.pooling {
            return;
        }
        let key = PoolKey::new(self.transport.variant(), self.endpoint, self.transport.tls());
        self.factory.pool().put(key, pooled);
    }

    pub fn result(&self) -> &RequestResult {
        &self.result
    }

    pub fn into_result(self) -> RequestResult {
        self.result
    }
}

fn is_stale_connection(e: &NetError) -> bool {
    matches!(
        e,
        NetError::ConnectionClosed | NetError::ConnectionReset | NetError::EmptyResponse
    )
}
