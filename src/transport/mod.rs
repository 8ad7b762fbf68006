// =============================================================================
// Deriv WebSocket transport
// =============================================================================
//
// A single duplex WebSocket connection to `wss://ws.derivws.com/websockets/v3`
// carries every request/response and subscription for the engine: no REST
// endpoint exists on this exchange. Requests are correlated to responses via
// an integer `req_id`; subscriptions (ticks, proposal_open_contract) stream
// unsolicited follow-up messages tagged with the same `subscription.id` that
// the subscribe response returned.
//
// Reconnection uses capped exponential backoff (`RECONNECT_DELAY_SECS` up to
// `MAX_RECONNECT_DELAY_SECS`, `MAX_RECONNECT_ATTEMPTS` attempts) and a health
// loop that pings on `HEALTH_CHECK_INTERVAL_SECS` and forces a reconnect after
// `MAX_MISSED_PONGS` missed pongs within `PING_TIMEOUT_SECS`.

pub mod messages;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::constants::*;
use crate::error::{AuthError, EngineError};
pub use messages::*;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsStream, Message>;

/// Deriv's wire-level response for a bad or expired API token surfaces as
/// `error.code == "InvalidToken"`, which `request()` turns into
/// `EngineError::Exchange`. Detect it here so `authorize()` can treat it as
/// fatal rather than retryable.
fn is_invalid_token_error(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<EngineError>(),
        Some(EngineError::Exchange { code, .. }) if code == "InvalidToken"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Authorizing,
    Ready,
    /// Reconnect attempts or both the primary and fallback tokens have been
    /// exhausted. `run_forever` has returned; nothing will reconnect this
    /// transport without a process restart.
    Fatal,
}

/// Deriv WebSocket client: one connection, many logical subscribers.
pub struct DerivTransport {
    app_id: String,
    req_counter: AtomicU64,
    state: RwLock<ConnectionState>,
    // `tokio::sync::Mutex` rather than `parking_lot::Mutex`: the write half is
    // held across the `.send().await` point.
    sink: tokio::sync::Mutex<Option<WsSink>>,
    pending: Mutex<HashMap<u64, (Instant, oneshot::Sender<Value>)>>,
    tick_senders: RwLock<HashMap<String, broadcast::Sender<TickMsg>>>,
    contract_senders: RwLock<HashMap<i64, broadcast::Sender<ProposalOpenContract>>>,
    balance_tx: broadcast::Sender<BalanceMsg>,
    last_pong: Mutex<std::time::Instant>,
}

impl DerivTransport {
    pub fn new(app_id: impl Into<String>) -> Arc<Self> {
        let (balance_tx, _) = broadcast::channel(32);
        Arc::new(Self {
            app_id: app_id.into(),
            req_counter: AtomicU64::new(1),
            state: RwLock::new(ConnectionState::Disconnected),
            sink: tokio::sync::Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            tick_senders: RwLock::new(HashMap::new()),
            contract_senders: RwLock::new(HashMap::new()),
            balance_tx,
            last_pong: Mutex::new(std::time::Instant::now()),
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set_state(&self, s: ConnectionState) {
        *self.state.write() = s;
    }

    fn next_req_id(&self) -> u64 {
        self.req_counter.fetch_add(1, Ordering::SeqCst)
    }

    fn ws_url(&self) -> String {
        format!("{DERIV_WS_URL_BASE}?app_id={}", self.app_id)
    }

    /// Connect and spawn the background reader loop. Call once per
    /// connection lifetime; `run_forever` drives reconnection around this.
    async fn connect(self: &Arc<Self>) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        let (ws, _resp) = connect_async(self.ws_url())
            .await
            .context("deriv websocket connect failed")?;
        let (sink, mut stream) = ws.split();

        *self.sink.lock().await = Some(sink);
        self.set_state(ConnectionState::Connected);
        *self.last_pong.lock() = std::time::Instant::now();

        let this = self.clone();
        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => this.handle_message(&text),
                    Ok(Message::Pong(_)) => {
                        *this.last_pong.lock() = std::time::Instant::now();
                    }
                    Ok(Message::Close(frame)) => {
                        warn!(?frame, "deriv websocket closed by peer");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "deriv websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
            this.set_state(ConnectionState::Disconnected);
            *this.sink.lock().await = None;
        });

        Ok(())
    }

    fn handle_message(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to parse deriv message");
                return;
            }
        };

        if let Some(req_id) = value.get("req_id").and_then(|v| v.as_u64()) {
            if let Some((_, tx)) = self.pending.lock().remove(&req_id) {
                let _ = tx.send(value.clone());
            }
        }

        match value.get("msg_type").and_then(|v| v.as_str()) {
            Some("tick") => {
                if let Some(tick) = value
                    .get("tick")
                    .and_then(|t| serde_json::from_value::<TickMsg>(t.clone()).ok())
                {
                    let senders = self.tick_senders.read();
                    if let Some(tx) = senders.get(&tick.symbol) {
                        let _ = tx.send(tick);
                    }
                }
            }
            Some("proposal_open_contract") => {
                if let Some(poc) = value
                    .get("proposal_open_contract")
                    .and_then(|t| serde_json::from_value::<ProposalOpenContract>(t.clone()).ok())
                {
                    let senders = self.contract_senders.read();
                    if let Some(tx) = senders.get(&poc.contract_id) {
                        let _ = tx.send(poc);
                    }
                }
            }
            Some("balance") => {
                if let Some(bal) = value
                    .get("balance")
                    .and_then(|t| serde_json::from_value::<BalanceMsg>(t.clone()).ok())
                {
                    let _ = self.balance_tx.send(bal);
                }
            }
            _ => {}
        }
    }

    async fn send(&self, req_id: u64, payload: Value) -> Result<()> {
        let mut payload = payload;
        payload["req_id"] = Value::from(req_id);
        let text = payload.to_string();

        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| anyhow!("deriv websocket not connected"))?;
        sink.send(Message::Text(text))
            .await
            .context("failed to send deriv websocket frame")?;
        Ok(())
    }

    /// Issue a request and await its correlated response, or time out.
    async fn request(&self, payload: Value) -> Result<Value> {
        let req_id = self.next_req_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(req_id, (Instant::now(), tx));

        self.send(req_id, payload).await?;

        match tokio::time::timeout(Duration::from_secs(PENDING_REQUEST_TIMEOUT_SECS), rx).await {
            Ok(Ok(value)) => {
                if let Some(err) = value.get("error") {
                    let code = err.get("code").and_then(|c| c.as_str()).unwrap_or("Unknown");
                    let message = err.get("message").and_then(|m| m.as_str()).unwrap_or("");
                    return Err(EngineError::Exchange {
                        code: code.to_string(),
                        message: message.to_string(),
                    }
                    .into());
                }
                Ok(value)
            }
            Ok(Err(_)) => Err(EngineError::transport("response channel closed").into()),
            Err(_) => {
                self.pending.lock().remove(&req_id);
                Err(EngineError::InternalTimeout("deriv request timed out".into()).into())
            }
        }
    }

    /// Sweep `pending` for requests whose per-call timeout future was
    /// dropped without running (e.g. the subscriber task that issued the
    /// request was cancelled) and so never reaped their own entry. Run on a
    /// fixed interval from `health_loop`, independent of each request's own
    /// `PENDING_REQUEST_TIMEOUT_SECS` deadline.
    fn reap_pending(&self) {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, (inserted_at, _)| now.duration_since(*inserted_at).as_secs() < PENDING_REQUEST_TIMEOUT_SECS);
        let reaped = before - pending.len();
        if reaped > 0 {
            debug!(reaped, "reaped stale pending deriv requests");
        }
        if pending.len() > PENDING_QUEUE_DEPTH_WARN {
            warn!(depth = pending.len(), "pending deriv request queue depth above warn threshold");
        }
    }

    /// Authorize with an API token, retrying up to `MAX_AUTH_RETRIES` times
    /// with exponential backoff. A token the exchange itself rejects
    /// (`error.code == "InvalidToken"`) is fatal and is surfaced immediately
    /// as `AuthError::InvalidToken` rather than retried — the caller
    /// (`run_forever`) decides whether an alternate token is worth trying.
    pub async fn authorize(self: &Arc<Self>, token: &str) -> Result<AuthorizeResponse> {
        self.set_state(ConnectionState::Authorizing);

        let mut last_err = None;
        let mut delay = AUTH_RETRY_DELAY_SECS;
        for attempt in 1..=MAX_AUTH_RETRIES {
            let payload = serde_json::json!({ "authorize": token });
            match tokio::time::timeout(Duration::from_secs(AUTH_TIMEOUT_SECS), self.request(payload)).await {
                Ok(Ok(value)) => {
                    let auth: AuthorizeResponse = serde_json::from_value(
                        value.get("authorize").cloned().unwrap_or(Value::Null),
                    )
                    .map_err(|e| EngineError::integrity(format!("bad authorize payload: {e}")))?;
                    self.set_state(ConnectionState::Ready);
                    info!(account_id = %auth.loginid, "deriv authorize succeeded");
                    return Ok(auth);
                }
                Ok(Err(e)) if is_invalid_token_error(&e) => {
                    warn!(attempt, "authorize rejected: invalid token, not retrying this token");
                    return Err(EngineError::Auth(AuthError::InvalidToken).into());
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "authorize attempt failed");
                    last_err = Some(e);
                }
                Err(_) => {
                    warn!(attempt, "authorize attempt timed out");
                    last_err = Some(AuthError::Timeout.into());
                }
            }
            if attempt < MAX_AUTH_RETRIES {
                info!(attempt, delay_secs = delay, "backing off before next authorize attempt");
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(MAX_AUTH_RETRY_DELAY_SECS);
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("authorize failed with no recorded error")))
    }

    /// Subscribe to a live tick stream for `symbol`.
    pub async fn subscribe_ticks(&self, symbol: &str) -> Result<broadcast::Receiver<TickMsg>> {
        let rx = {
            let mut senders = self.tick_senders.write();
            senders
                .entry(symbol.to_string())
                .or_insert_with(|| broadcast::channel(256).0)
                .subscribe()
        };

        let payload = serde_json::json!({ "ticks": symbol, "subscribe": 1 });
        self.request(payload).await?;
        Ok(rx)
    }

    /// Fetch historical ticks for `symbol`, most recent `count`.
    pub async fn ticks_history(&self, symbol: &str, count: u32) -> Result<Vec<f64>> {
        let payload = serde_json::json!({
            "ticks_history": symbol,
            "count": count,
            "end": "latest",
            "style": "ticks",
        });
        let value = self.request(payload).await?;
        let prices = value
            .get("history")
            .and_then(|h| h.get("prices"))
            .and_then(|p| p.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_f64()).collect())
            .unwrap_or_default();
        Ok(prices)
    }

    /// Place a contract purchase and return the buy confirmation.
    pub async fn buy_contract(&self, request: &BuyRequest) -> Result<BuyResponse> {
        let payload = serde_json::to_value(request).context("serialize buy request")?;
        let value = tokio::time::timeout(
            Duration::from_secs(BUY_RESPONSE_TIMEOUT_SECS),
            self.request(payload),
        )
        .await
        .map_err(|_| EngineError::InternalTimeout("buy response timed out".into()))??;

        serde_json::from_value(value.get("buy").cloned().unwrap_or(Value::Null))
            .map_err(|e| EngineError::integrity(format!("bad buy payload: {e}")).into())
    }

    /// Subscribe to ongoing-contract updates for a just-bought contract.
    pub async fn subscribe_contract(
        &self,
        contract_id: i64,
    ) -> Result<broadcast::Receiver<ProposalOpenContract>> {
        let rx = {
            let mut senders = self.contract_senders.write();
            senders
                .entry(contract_id)
                .or_insert_with(|| broadcast::channel(32).0)
                .subscribe()
        };

        let payload = serde_json::json!({
            "proposal_open_contract": 1,
            "contract_id": contract_id,
            "subscribe": 1,
        });
        self.request(payload).await?;
        Ok(rx)
    }

    pub fn subscribe_balance(&self) -> broadcast::Receiver<BalanceMsg> {
        self.balance_tx.subscribe()
    }

    pub async fn request_balance(&self) -> Result<BalanceMsg> {
        let payload = serde_json::json!({ "balance": 1, "subscribe": 1 });
        let value = self.request(payload).await?;
        serde_json::from_value(value.get("balance").cloned().unwrap_or(Value::Null))
            .map_err(|e| EngineError::integrity(format!("bad balance payload: {e}")).into())
    }

    async fn ping(&self) -> Result<()> {
        self.request(serde_json::json!({ "ping": 1 })).await?;
        Ok(())
    }

    /// Drive connect → authorize → health-check → reconnect forever, until
    /// reconnect attempts are exhausted or both `primary_token` and
    /// `fallback_token` are rejected as invalid — at which point the
    /// transport is marked `Fatal` and this returns. Logs every state
    /// transition and retry.
    pub async fn run_forever(self: Arc<Self>, primary_token: String, fallback_token: Option<String>) {
        let mut attempt = 0u32;
        let mut use_fallback = false;
        loop {
            attempt += 1;
            info!(attempt, "connecting to deriv websocket");

            if let Err(e) = self.connect().await {
                warn!(attempt, error = %e, "deriv connect failed");
                if attempt >= MAX_RECONNECT_ATTEMPTS {
                    error!("max reconnect attempts reached, giving up on deriv connection");
                    self.set_state(ConnectionState::Fatal);
                    return;
                }
                self.backoff_sleep(attempt).await;
                continue;
            }

            let token = if use_fallback { fallback_token.as_deref() } else { Some(primary_token.as_str()) };
            let Some(token) = token else {
                error!("no usable deriv api token remains, giving up");
                self.set_state(ConnectionState::Fatal);
                return;
            };

            match self.authorize(token).await {
                Ok(_) => {
                    attempt = 0;
                }
                Err(e) => {
                    let fatal = e.downcast_ref::<EngineError>().map(|e| !e.is_retryable()).unwrap_or(false);
                    if fatal {
                        if !use_fallback && fallback_token.is_some() {
                            warn!("deriv token rejected as invalid, switching to fallback token");
                            use_fallback = true;
                            continue;
                        }
                        error!(error = %e, "authorize rejected with no usable token left, giving up");
                        self.set_state(ConnectionState::Fatal);
                        return;
                    }

                    error!(error = %e, "authorize failed after connect, reconnecting");
                    if attempt >= MAX_RECONNECT_ATTEMPTS {
                        error!("max reconnect attempts reached, giving up on deriv connection");
                        self.set_state(ConnectionState::Fatal);
                        return;
                    }
                    self.backoff_sleep(attempt).await;
                    continue;
                }
            }

            self.health_loop().await;
            warn!("health loop exited, reconnecting");
        }
    }

    /// Exponential backoff doubling from `RECONNECT_DELAY_SECS`, capped at
    /// `MAX_RECONNECT_DELAY_SECS`: 5s, 10s, 20s, 40s, 60s (capped).
    async fn backoff_sleep(&self, attempt: u32) {
        let shift = attempt.saturating_sub(1).min(10);
        let delay = RECONNECT_DELAY_SECS.saturating_mul(1u64 << shift).min(MAX_RECONNECT_DELAY_SECS);
        info!(delay_secs = delay, "backing off before reconnect");
        tokio::time::sleep(Duration::from_secs(delay)).await;
    }

    async fn health_loop(&self) {
        let mut missed = 0u32;
        let mut ping_interval = tokio::time::interval(Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS));
        let mut reap_interval = tokio::time::interval(Duration::from_secs(PENDING_REQUEST_REAP_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if self.state() == ConnectionState::Disconnected {
                        return;
                    }

                    let jitter = Duration::from_millis(
                        (rand::random::<u64>() % (PING_JITTER_MAX_SECS * 1000)).max(1),
                    );
                    tokio::time::sleep(jitter).await;

                    match tokio::time::timeout(Duration::from_secs(PING_TIMEOUT_SECS), self.ping()).await {
                        Ok(Ok(())) => {
                            missed = 0;
                        }
                        _ => {
                            missed += 1;
                            warn!(missed, "deriv ping missed");
                            if missed >= MAX_MISSED_PONGS {
                                error!("max missed pongs reached, forcing reconnect");
                                tokio::time::sleep(Duration::from_secs(GRACE_PERIOD_SECS)).await;
                                return;
                            }
                        }
                    }
                }
                _ = reap_interval.tick() => {
                    self.reap_pending();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_embeds_app_id() {
        let t = DerivTransport::new("1089");
        assert_eq!(t.ws_url(), "wss://ws.derivws.com/websockets/v3?app_id=1089");
    }

    #[test]
    fn initial_state_is_disconnected() {
        let t = DerivTransport::new("1089");
        assert_eq!(t.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn req_id_counter_is_monotonic() {
        let t = DerivTransport::new("1089");
        let a = t.next_req_id();
        let b = t.next_req_id();
        assert!(b > a);
    }
}
