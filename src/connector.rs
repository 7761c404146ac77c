//! Connection lifecycle for the single printer peripheral.
//!
//! Every `connect()` call opens a new attempt identified by an
//! [`AttemptId`]. All transitions, timeouts and link-loss notifications
//! carry the attempt they belong to, and anything tagged with an attempt
//! other than the current one is ignored. Superseding an attempt also
//! cancels it, which drops its event subscription on the spot.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::DeviceIdentity;
use crate::error::{ConnectionCause, ConnectionError};
use crate::radio::{RadioCapability, RadioEvent, RadioState, ScanFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
    Disconnected,
    Failed,
}

impl ConnectionState {
    /// The only stage an attempt may move to from `self` on success.
    pub fn next_stage(self) -> Option<ConnectionState> {
        use ConnectionState::*;
        match self {
            Idle => Some(Scanning),
            Scanning => Some(Connecting),
            Connecting => Some(DiscoveringServices),
            DiscoveringServices => Some(DiscoveringCharacteristics),
            DiscoveringCharacteristics => Some(Ready),
            Ready | Disconnected | Failed => None,
        }
    }

    /// An attempt is running and has not reached `Ready` or a terminal state.
    pub fn is_in_flight(self) -> bool {
        use ConnectionState::*;
        matches!(
            self,
            Idle | Scanning | Connecting | DiscoveringServices | DiscoveringCharacteristics
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AttemptId(u64);

impl AttemptId {
    fn next(self) -> Self {
        AttemptId(self.0 + 1)
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The writable peripheral + characteristic pair. Only handed out while `Ready`.
#[derive(Debug, Clone)]
pub struct ActiveLink<P, C> {
    pub peripheral: P,
    pub characteristic: C,
    pub address: String,
}

pub type LinkOf<R> =
    ActiveLink<<R as RadioCapability>::Peripheral, <R as RadioCapability>::Characteristic>;

struct Inner<R: RadioCapability> {
    state: ConnectionState,
    attempt: AttemptId,
    cancel: CancellationToken,
    // stage the last superseded attempt was in when it was cancelled
    superseded: Option<(AttemptId, ConnectionState)>,
    peripheral: Option<R::Peripheral>,
    link: Option<LinkOf<R>>,
    link_watch: Option<JoinHandle<()>>,
}

impl<R: RadioCapability> Inner<R> {
    /// Retire the current attempt: cancel it and move on to a new id.
    fn supersede(&mut self) -> CancellationToken {
        if self.state.is_in_flight() {
            self.superseded = Some((self.attempt, self.state));
        }
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.attempt = self.attempt.next();
        self.cancel.clone()
    }
}

struct Core<R: RadioCapability> {
    inner: Mutex<Inner<R>>,
    state_tx: watch::Sender<ConnectionState>,
}

impl<R: RadioCapability> Core<R> {
    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner<R>, state: ConnectionState) {
        log::debug!(
            target: "connector",
            "attempt {}: {:?} -> {:?}",
            inner.attempt,
            inner.state,
            state
        );
        inner.state = state;
        self.state_tx.send_replace(state);
    }

    fn link_lost(&self, attempt: AttemptId) {
        let mut inner = self.lock();
        if inner.attempt != attempt || inner.state != ConnectionState::Ready {
            return;
        }
        log::warn!(target: "connector", "Printer disconnected.");
        inner.link = None;
        inner.peripheral = None;
        inner.link_watch = None;
        self.set_state(&mut inner, ConnectionState::Disconnected);
    }
}

pub struct DeviceConnector<R: RadioCapability> {
    radio: Arc<R>,
    identity: DeviceIdentity,
    timeout: Duration,
    core: Arc<Core<R>>,
}

impl<R: RadioCapability> DeviceConnector<R> {
    pub fn new(radio: Arc<R>, identity: DeviceIdentity, timeout: Duration) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            radio,
            identity,
            timeout,
            core: Arc::new(Core {
                inner: Mutex::new(Inner {
                    state: ConnectionState::Idle,
                    attempt: AttemptId::default(),
                    cancel: CancellationToken::new(),
                    superseded: None,
                    peripheral: None,
                    link: None,
                    link_watch: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn radio(&self) -> &Arc<R> {
        &self.radio
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        self.core.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    pub fn current_attempt(&self) -> AttemptId {
        self.core.lock().attempt
    }

    /// Observe state changes, e.g. to notice link loss.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.core.state_tx.subscribe()
    }

    /// A copy of the active link, present only while `Ready`.
    pub fn link(&self) -> Option<LinkOf<R>> {
        let inner = self.core.lock();
        match inner.state {
            ConnectionState::Ready => inner.link.clone(),
            _ => None,
        }
    }

    /// Drive one attempt from `Idle` to `Ready`.
    ///
    /// Resolves immediately when already `Ready`. Otherwise any previous
    /// attempt is superseded, and the new one fails with a
    /// [`ConnectionError`] if it does not reach `Ready` within the timeout.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let Some((attempt, cancel)) = self.begin_attempt() else {
            return Ok(());
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConnectionError::new(
                self.stage_of(attempt),
                ConnectionCause::Superseded,
            )),
            res = self.run(attempt) => res,
            _ = time::sleep(self.timeout) => Err(ConnectionError::new(
                self.stage_of(attempt),
                ConnectionCause::Timeout(self.timeout.as_secs()),
            )),
        };

        if let Err(e) = &result {
            log::warn!(target: "connector", "attempt {} failed: {}", attempt, e);
            self.fail_attempt(attempt).await;
        }
        result
    }

    /// Move `attempt` to `Failed` and release the scan and any half-open
    /// connection it holds.
    ///
    /// Returns false without touching anything when the attempt is not the
    /// current one or has already left the in-flight stages.
    pub async fn fail_attempt(&self, attempt: AttemptId) -> bool {
        let peripheral = {
            let mut inner = self.core.lock();
            if inner.attempt != attempt || !inner.state.is_in_flight() {
                return false;
            }
            inner.link = None;
            if let Some(watch) = inner.link_watch.take() {
                watch.abort();
            }
            self.core.set_state(&mut inner, ConnectionState::Failed);
            inner.peripheral.take()
        };

        if let Err(e) = self.radio.stop_scan().await {
            log::debug!(target: "connector", "stop scan: {}", e);
        }
        if let Some(peripheral) = peripheral {
            if let Err(e) = self.radio.disconnect(&peripheral).await {
                log::debug!(target: "connector", "disconnect after failure: {}", e);
            }
        }
        true
    }

    /// Drop the link (or the scan/connection in progress) and move to
    /// `Disconnected`. No-op when there is nothing to disconnect.
    pub async fn disconnect(&self) {
        let (was, peripheral) = {
            let mut inner = self.core.lock();
            let was = inner.state;
            let linked_or_linking =
                was == ConnectionState::Ready || (was.is_in_flight() && was != ConnectionState::Idle);
            if !linked_or_linking {
                return;
            }
            // cancels the in-flight attempt and its deadline
            inner.supersede();
            inner.link = None;
            if let Some(watch) = inner.link_watch.take() {
                watch.abort();
            }
            self.core.set_state(&mut inner, ConnectionState::Disconnected);
            (was, inner.peripheral.take())
        };

        log::info!(target: "connector", "disconnecting printer (was {:?})", was);
        if was == ConnectionState::Scanning {
            if let Err(e) = self.radio.stop_scan().await {
                log::debug!(target: "connector", "stop scan: {}", e);
            }
        }
        if let Some(peripheral) = peripheral {
            if let Err(e) = self.radio.disconnect(&peripheral).await {
                log::warn!(target: "connector", "disconnect failed: {}", e);
            }
        }
    }

    fn begin_attempt(&self) -> Option<(AttemptId, CancellationToken)> {
        let mut inner = self.core.lock();
        if inner.state == ConnectionState::Ready {
            return None;
        }
        let cancel = inner.supersede();
        inner.peripheral = None;
        inner.link = None;
        self.core.set_state(&mut inner, ConnectionState::Idle);
        Some((inner.attempt, cancel))
    }

    fn stage_of(&self, attempt: AttemptId) -> ConnectionState {
        let inner = self.core.lock();
        match inner.superseded {
            _ if inner.attempt == attempt => inner.state,
            Some((old, stage)) if old == attempt => stage,
            _ => ConnectionState::Failed,
        }
    }

    /// Refuse to touch the radio on behalf of an attempt that is no longer current.
    fn ensure_current(
        &self,
        attempt: AttemptId,
        stage: ConnectionState,
    ) -> Result<(), ConnectionError> {
        let inner = self.core.lock();
        if inner.attempt != attempt || inner.cancel.is_cancelled() {
            return Err(ConnectionError::new(stage, ConnectionCause::Superseded));
        }
        Ok(())
    }

    /// Step `attempt` from `*stage` to its successor, which must be `to`.
    fn advance(
        &self,
        attempt: AttemptId,
        stage: &mut ConnectionState,
        to: ConnectionState,
    ) -> Result<(), ConnectionError> {
        let mut inner = self.core.lock();
        if inner.attempt != attempt
            || inner.state != *stage
            || stage.next_stage() != Some(to)
        {
            return Err(ConnectionError::new(*stage, ConnectionCause::Superseded));
        }
        self.core.set_state(&mut inner, to);
        *stage = to;
        Ok(())
    }

    async fn run(&self, attempt: AttemptId) -> Result<(), ConnectionError> {
        use ConnectionState::*;

        let mut stage = Idle;
        let mut events = self
            .radio
            .subscribe()
            .await
            .map_err(|e| ConnectionError::new(stage, e))?;

        let (peripheral, address) = loop {
            let Some(event) = events.next().await else {
                return Err(ConnectionError::new(stage, ConnectionCause::RadioUnavailable));
            };
            match event {
                RadioEvent::StateChange(RadioState::PoweredOn) => {
                    if stage == Idle {
                        self.advance(attempt, &mut stage, Scanning)?;
                    }
                    self.ensure_current(attempt, stage)?;
                    log::info!(target: "connector", "Bluetooth powered on. Scanning for printer...");
                    self.radio
                        .scan(ScanFilter::default(), true)
                        .await
                        .map_err(|e| ConnectionError::new(stage, e))?;
                }
                RadioEvent::StateChange(state) => {
                    log::info!(target: "connector", "Bluetooth state changed to: {:?}", state);
                    if stage == Scanning {
                        self.ensure_current(attempt, stage)?;
                        if let Err(e) = self.radio.stop_scan().await {
                            log::debug!(target: "connector", "stop scan: {}", e);
                        }
                    }
                }
                RadioEvent::Discovered {
                    peripheral,
                    address,
                } if stage == Scanning && self.identity.matches(&address) => {
                    break (peripheral, address);
                }
                RadioEvent::Discovered { .. } | RadioEvent::Disconnected { .. } => {}
            }
        };

        self.ensure_current(attempt, stage)?;
        if let Err(e) = self.radio.stop_scan().await {
            log::debug!(target: "connector", "stop scan: {}", e);
        }
        self.advance(attempt, &mut stage, Connecting)?;
        log::info!(target: "connector", "Found printer: {}. Attempting to connect...", address);
        self.core.lock().peripheral = Some(peripheral.clone());

        self.radio
            .connect(&peripheral)
            .await
            .map_err(|e| ConnectionError::new(stage, e))?;
        self.advance(attempt, &mut stage, DiscoveringServices)?;

        log::info!(target: "connector", "Connected. Discovering services...");
        let service = self
            .radio
            .discover_services(&peripheral, &[self.identity.service()])
            .await
            .map_err(|e| ConnectionError::new(stage, e))?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::new(stage, ConnectionCause::ServiceNotFound))?;
        self.advance(attempt, &mut stage, DiscoveringCharacteristics)?;

        log::info!(target: "connector", "Found service. Discovering characteristics...");
        let characteristic = self
            .radio
            .discover_characteristics(&service, &[])
            .await
            .map_err(|e| ConnectionError::new(stage, e))?
            .into_iter()
            .next()
            .ok_or_else(|| ConnectionError::new(stage, ConnectionCause::NoCharacteristics))?;

        log::debug!(target: "connector", "Discovered characteristic: {:?}", characteristic);

        self.become_ready(
            attempt,
            stage,
            ActiveLink {
                peripheral,
                characteristic,
                address,
            },
            events,
        )
    }

    fn become_ready(
        &self,
        attempt: AttemptId,
        stage: ConnectionState,
        link: LinkOf<R>,
        events: BoxStream<'static, RadioEvent<R::Peripheral>>,
    ) -> Result<(), ConnectionError> {
        let mut inner = self.core.lock();
        if inner.attempt != attempt || inner.state != ConnectionState::DiscoveringCharacteristics {
            return Err(ConnectionError::new(stage, ConnectionCause::Superseded));
        }

        let core = Arc::clone(&self.core);
        let address = link.address.clone();
        inner.link_watch = Some(tokio::spawn(watch_link(core, attempt, address, events)));
        inner.link = Some(link);
        self.core.set_state(&mut inner, ConnectionState::Ready);

        log::info!(target: "connector", "Successfully connected to printer. Ready to print.");
        Ok(())
    }
}

impl<R: RadioCapability> Drop for DeviceConnector<R> {
    fn drop(&mut self) {
        if let Some(watch) = self.core.lock().link_watch.take() {
            watch.abort();
        }
    }
}

async fn watch_link<R: RadioCapability>(
    core: Arc<Core<R>>,
    attempt: AttemptId,
    address: String,
    mut events: BoxStream<'static, RadioEvent<R::Peripheral>>,
) {
    while let Some(event) = events.next().await {
        if let RadioEvent::Disconnected { address: lost } = event {
            if lost.eq_ignore_ascii_case(&address) {
                core.link_lost(attempt);
                return;
            }
        }
    }
    log::warn!(target: "connector", "radio event stream closed while linked");
    core.link_lost(attempt);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        use ConnectionState::*;
        let mut stage = Idle;
        let mut seen = vec![stage];
        while let Some(next) = stage.next_stage() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(
            seen,
            vec![
                Idle,
                Scanning,
                Connecting,
                DiscoveringServices,
                DiscoveringCharacteristics,
                Ready
            ]
        );
    }

    #[test]
    fn test_in_flight_states() {
        use ConnectionState::*;
        assert!(Scanning.is_in_flight());
        assert!(DiscoveringCharacteristics.is_in_flight());
        assert!(!Ready.is_in_flight());
        assert!(!Failed.is_in_flight());
        assert!(!Disconnected.is_in_flight());
    }
}
