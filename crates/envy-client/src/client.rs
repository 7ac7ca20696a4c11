// ── Connection supervisor ──
//
// Owns the transport and the canonical state, runs the listen loop, manages
// reconnection with exponential backoff, serializes outbound commands, and
// correlates `OK`/`ERROR` acknowledgements with senders in FIFO order.
//
// Concurrency model: the listen task is the only mutator of `EnvyState`.
// The ack-waiter queue and callback registry are touched from both caller
// tasks and the listen task, so both sit behind plain mutexes held only for
// non-suspending sections. The command mutex makes (enqueue waiter, send
// line) atomic with respect to other senders, which is what keeps waiter
// order equal to on-wire command order.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use envy_proto::command;
use envy_proto::{
    CommandArg, ConfigPageItem, Message, OptionItem, OptionValue, ProfileGroupItem, ProfileItem,
    SettingPageItem, build_command, parse_message,
};

use crate::adapter::{AdapterEvent, EnvySnapshot, EnvyStateAdapter, StateDelta};
use crate::error::EnvyError;
use crate::state::EnvyState;
use crate::transport::{TcpTransport, Transport};

/// Default madVR Envy control port.
pub const DEFAULT_PORT: u16 = 44077;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Lifecycle events delivered to registered callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    Connected,
    Disconnected,
    ReceivedMessage,
}

/// Handle returned by callback registration; pass back to deregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

/// Exponential backoff policy for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// First backoff delay. Default: 1s.
    pub initial_backoff: Duration,
    /// Upper bound on the backoff delay. Default: 30s.
    pub max_backoff: Duration,
    /// Jitter fraction added on top of the capped delay. Default: 0.2.
    pub jitter: f64,
    /// Whether to reconnect at all after a lost connection. Default: true.
    pub enabled: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            jitter: 0.2,
            enabled: true,
        }
    }
}

/// Connection configuration handed in by the embedding host.
#[derive(Debug, Clone)]
pub struct EnvyClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub read_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl EnvyClientConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }
}

type TransportFactory = Box<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

/// Boxed future returned by an injected sleep function.
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type SleepFn = Box<dyn Fn(Duration) -> SleepFuture + Send + Sync>;
type RandomFn = Box<dyn Fn() -> f64 + Send + Sync>;
type EventCallback = Arc<dyn Fn(ClientEvent, Option<&Message>) + Send + Sync>;

/// Builder for [`EnvyClient`].
///
/// The transport factory, sleep function, and randomness source are
/// injectable so tests can script connections and pin backoff timing.
pub struct EnvyClientBuilder {
    config: EnvyClientConfig,
    transport_factory: Option<TransportFactory>,
    sleep_fn: Option<SleepFn>,
    random_fn: Option<RandomFn>,
}

impl EnvyClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: EnvyClientConfig::new(host),
            transport_factory: None,
            sleep_fn: None,
            random_fn: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.config.reconnect = reconnect;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.reconnect.enabled = enabled;
        self
    }

    /// Replace the TCP transport with a custom factory (one call per
    /// connection attempt).
    pub fn transport_factory(
        mut self,
        factory: impl Fn() -> Arc<dyn Transport> + Send + Sync + 'static,
    ) -> Self {
        self.transport_factory = Some(Box::new(factory));
        self
    }

    /// Replace the backoff sleeper (tests record the requested delays).
    pub fn sleep_fn(
        mut self,
        sleep: impl Fn(Duration) -> SleepFuture + Send + Sync + 'static,
    ) -> Self {
        self.sleep_fn = Some(Box::new(sleep));
        self
    }

    /// Replace the jitter randomness source (`0.0..1.0`).
    pub fn random_fn(mut self, random: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.random_fn = Some(Box::new(random));
        self
    }

    pub fn build(self) -> EnvyClient {
        let config = self.config;
        let transport_factory = self.transport_factory.unwrap_or_else(|| {
            let host = config.host.clone();
            let port = config.port;
            Box::new(move || Arc::new(TcpTransport::new(host.clone(), port)) as Arc<dyn Transport>)
        });
        let sleep_fn = self
            .sleep_fn
            .unwrap_or_else(|| Box::new(|delay| -> SleepFuture { Box::pin(tokio::time::sleep(delay)) }));
        let random_fn = self.random_fn.unwrap_or_else(|| Box::new(rand::random::<f64>));

        let (synced_tx, _) = watch::channel(false);
        EnvyClient {
            inner: Arc::new(ClientInner {
                config,
                transport_factory,
                sleep_fn,
                random_fn,
                state: StdMutex::new(EnvyState::new()),
                transport: StdMutex::new(None),
                callbacks: StdMutex::new(Vec::new()),
                next_callback_id: AtomicU64::new(0),
                ack_waiters: StdMutex::new(VecDeque::new()),
                next_waiter_id: AtomicU64::new(0),
                command_lock: tokio::sync::Mutex::new(()),
                synced_tx,
                stopping: AtomicBool::new(false),
                run: StdMutex::new(RunState::default()),
            }),
        }
    }
}

struct AckWaiter {
    id: u64,
    tx: oneshot::Sender<Message>,
}

#[derive(Default)]
struct RunState {
    token: CancellationToken,
    listen: Option<JoinHandle<()>>,
}

struct ClientInner {
    config: EnvyClientConfig,
    transport_factory: TransportFactory,
    sleep_fn: SleepFn,
    random_fn: RandomFn,
    state: StdMutex<EnvyState>,
    transport: StdMutex<Option<Arc<dyn Transport>>>,
    callbacks: StdMutex<Vec<(CallbackId, EventCallback)>>,
    next_callback_id: AtomicU64,
    ack_waiters: StdMutex<VecDeque<AckWaiter>>,
    next_waiter_id: AtomicU64,
    command_lock: tokio::sync::Mutex<()>,
    synced_tx: watch::Sender<bool>,
    stopping: AtomicBool,
    run: StdMutex<RunState>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Async client for the madVR Envy IP control protocol.
///
/// Cheaply cloneable; all clones share one connection. [`start`] connects
/// and spawns the listen task; after that the client keeps the connection
/// alive (reconnecting with backoff) until [`stop`].
///
/// [`start`]: EnvyClient::start
/// [`stop`]: EnvyClient::stop
#[derive(Clone)]
pub struct EnvyClient {
    inner: Arc<ClientInner>,
}

impl EnvyClient {
    /// Build a client with default tunables against `host:44077`.
    pub fn new(host: impl Into<String>) -> Self {
        EnvyClientBuilder::new(host).build()
    }

    pub fn builder(host: impl Into<String>) -> EnvyClientBuilder {
        EnvyClientBuilder::new(host)
    }

    pub fn config(&self) -> &EnvyClientConfig {
        &self.inner.config
    }

    /// Whether a live transport is currently attached.
    pub fn connected(&self) -> bool {
        lock(&self.inner.transport).as_ref().is_some_and(|transport| transport.connected())
    }

    /// Whether a `Welcome` has been observed on the current connection.
    pub fn synced(&self) -> bool {
        lock(&self.inner.state).synced()
    }

    /// Run `f` against the canonical state under its lock.
    pub fn with_state<R>(&self, f: impl FnOnce(&EnvyState) -> R) -> R {
        f(&lock(&self.inner.state))
    }

    /// Project the current state into an immutable snapshot.
    pub fn snapshot(&self) -> EnvySnapshot {
        crate::adapter::snapshot_from_state(&lock(&self.inner.state))
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Connect and spawn the listen task. Idempotent: a second call while
    /// the listen task is alive returns immediately.
    pub async fn start(&self) -> Result<(), EnvyError> {
        if lock(&self.inner.run).listen.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        self.inner.stopping.store(false, Ordering::SeqCst);
        self.connect().await?;

        let token = CancellationToken::new();
        let client = self.clone();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            client.listen_loop(task_token).await;
        });

        let mut run = lock(&self.inner.run);
        run.token = token;
        run.listen = Some(handle);
        Ok(())
    }

    /// Cancel the listen task and drop the connection. Idempotent.
    pub async fn stop(&self) {
        self.inner.stopping.store(true, Ordering::SeqCst);

        let (token, handle) = {
            let mut run = lock(&self.inner.run);
            (run.token.clone(), run.listen.take())
        };
        token.cancel();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        self.disconnect_statefully().await;
    }

    /// Block until a `Welcome` is observed on the current connection.
    ///
    /// An unbounded wait (`timeout: None`) only returns on sync.
    pub async fn wait_synced(&self, timeout: Option<Duration>) -> Result<(), EnvyError> {
        let mut rx = self.inner.synced_tx.subscribe();
        let wait = async move {
            rx.wait_for(|synced| *synced).await.map(|_| ())
        };
        match timeout {
            None => wait.await.map_err(|_| EnvyError::NotConnected),
            Some(timeout) => match tokio::time::timeout(timeout, wait).await {
                Err(_) => Err(EnvyError::Timeout { operation: "sync", timeout }),
                Ok(result) => result.map_err(|_| EnvyError::NotConnected),
            },
        }
    }

    // ── Callbacks ────────────────────────────────────────────────────

    /// Register a callback for [`ClientEvent`]s. Invoked synchronously from
    /// the listen task; a panicking callback is logged and swallowed.
    pub fn register_callback(
        &self,
        callback: impl Fn(ClientEvent, Option<&Message>) + Send + Sync + 'static,
    ) -> CallbackId {
        let id = CallbackId(self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.callbacks).push((id, Arc::new(callback)));
        id
    }

    pub fn deregister_callback(&self, id: CallbackId) {
        lock(&self.inner.callbacks).retain(|(callback_id, _)| *callback_id != id);
    }

    /// Register a consumer of adapter output (snapshot, deltas, events).
    ///
    /// The adapter itself is a pure projection; this wrapper adds the
    /// integration policy: the first emission is seeded with a synthetic
    /// `initial` event, and later emissions with no deltas and no events
    /// are suppressed.
    pub fn register_adapter_callback(
        &self,
        adapter: EnvyStateAdapter,
        callback: impl Fn(&EnvySnapshot, &[StateDelta], &[AdapterEvent]) + Send + Sync + 'static,
    ) -> CallbackId {
        let inner = Arc::downgrade(&self.inner);
        let adapter = StdMutex::new(adapter);
        self.register_callback(move |event, message| {
            if event != ClientEvent::ReceivedMessage || message.is_none() {
                return;
            }
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut adapter = lock(&adapter);
            let initial = adapter.last_snapshot().is_none();
            let (snapshot, deltas, events) = {
                let state = lock(&inner.state);
                adapter.update(&state)
            };

            if initial {
                let mut seeded = Vec::with_capacity(events.len() + 1);
                seeded.push(AdapterEvent { kind: "initial", payload: serde_json::json!({}) });
                seeded.extend(events);
                callback(&snapshot, &deltas, &seeded);
                return;
            }
            if deltas.is_empty() && events.is_empty() {
                return;
            }
            callback(&snapshot, &deltas, &events);
        })
    }

    /// Deregister a callback returned by
    /// [`register_adapter_callback`](Self::register_adapter_callback).
    pub fn deregister_adapter_callback(&self, id: CallbackId) {
        self.deregister_callback(id);
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Build and send one command line.
    ///
    /// With `wait_for_ack`, blocks until the device's `OK`/`ERROR` for this
    /// command arrives and returns the `OK`; an `ERROR` fails with
    /// [`EnvyError::CommandRejected`]. `ack_timeout` defaults to the
    /// configured command timeout.
    pub async fn command(
        &self,
        name: &str,
        args: &[CommandArg],
        wait_for_ack: bool,
        ack_timeout: Option<Duration>,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_command(build_command(name, args), wait_for_ack, ack_timeout).await
    }

    /// Send a pre-rendered command line.
    pub async fn send_raw(
        &self,
        line: &str,
        wait_for_ack: bool,
        ack_timeout: Option<Duration>,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_command(line.to_owned(), wait_for_ack, ack_timeout).await
    }

    async fn send_command(
        &self,
        line: String,
        wait_for_ack: bool,
        ack_timeout: Option<Duration>,
    ) -> Result<Option<Message>, EnvyError> {
        let transport =
            lock(&self.inner.transport).clone().ok_or(EnvyError::NotConnected)?;

        // The (enqueue waiter, send) pair is atomic under the command lock,
        // so waiter order equals on-wire command order.
        let waiter = {
            let _guard = self.inner.command_lock.lock().await;
            let waiter = if wait_for_ack {
                let id = self.inner.next_waiter_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel();
                lock(&self.inner.ack_waiters).push_back(AckWaiter { id, tx });
                Some((id, rx))
            } else {
                None
            };

            trace!(line = %line, "sending");
            if let Err(error) = transport.send_line(&line, self.inner.config.command_timeout).await
            {
                if let Some((id, _)) = &waiter {
                    self.remove_ack_waiter(*id);
                }
                return Err(error);
            }
            waiter
        };

        let Some((id, rx)) = waiter else {
            return Ok(None);
        };

        let timeout = ack_timeout.unwrap_or(self.inner.config.command_timeout);
        let ack = match tokio::time::timeout(timeout, rx).await {
            Err(_) => {
                // The command is already on the wire; realign the queue so
                // subsequent acks match the remaining waiters.
                self.remove_ack_waiter(id);
                return Err(EnvyError::Timeout { operation: "ack", timeout });
            }
            // The waiter was dropped by a disconnect.
            Ok(Err(_)) => return Err(EnvyError::NotConnected),
            Ok(Ok(message)) => message,
        };

        match ack {
            Message::Error { error } => Err(EnvyError::CommandRejected { command: line, error }),
            message => Ok(Some(message)),
        }
    }

    fn remove_ack_waiter(&self, id: u64) {
        lock(&self.inner.ack_waiters).retain(|waiter| waiter.id != id);
    }

    // ── Typed wrappers ───────────────────────────────────────────────
    //
    // Ack defaults follow integration expectations: status queries and
    // mutations wait for their ack; heartbeat/bye are fire-and-forget.

    pub async fn heartbeat(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::heartbeat(), false, None).await
    }

    pub async fn bye(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::bye(), false, None).await
    }

    pub async fn power_off(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::power_off(), true, None).await
    }

    pub async fn standby(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::standby(), true, None).await
    }

    pub async fn restart(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::restart(), true, None).await
    }

    pub async fn reload_software(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::reload_software(), true, None).await
    }

    pub async fn open_menu(&self, menu: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::open_menu(menu), true, None).await
    }

    pub async fn close_menu(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::close_menu(), true, None).await
    }

    pub async fn key_press(&self, button: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::key_press(button), true, None).await
    }

    pub async fn key_hold(&self, button: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::key_hold(button), true, None).await
    }

    pub async fn display_message(
        &self,
        timeout_seconds: i64,
        text: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::display_message(timeout_seconds, text), true, None).await
    }

    pub async fn display_alert_window(&self, text: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::display_alert_window(text), true, None).await
    }

    pub async fn close_alert_window(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::close_alert_window(), true, None).await
    }

    pub async fn display_audio_volume(
        &self,
        min: i64,
        current: i64,
        max: i64,
        unit: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::display_audio_volume(min, current, max, unit), true, None).await
    }

    pub async fn display_audio_mute(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::display_audio_mute(), true, None).await
    }

    pub async fn close_audio_mute(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::close_audio_mute(), true, None).await
    }

    pub async fn set_aspect_ratio_mode(&self, mode: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::set_aspect_ratio_mode(mode), true, None).await
    }

    pub async fn get_incoming_signal_info(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_incoming_signal_info(), true, None).await
    }

    pub async fn get_outgoing_signal_info(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_outgoing_signal_info(), true, None).await
    }

    pub async fn get_aspect_ratio(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_aspect_ratio(), true, None).await
    }

    pub async fn get_masking_ratio(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_masking_ratio(), true, None).await
    }

    pub async fn get_temperatures(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_temperatures(), true, None).await
    }

    pub async fn get_mac_address(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_mac_address(), true, None).await
    }

    pub async fn create_profile_group(&self, name: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::create_profile_group(name), true, None).await
    }

    pub async fn rename_profile_group(
        &self,
        group_id: &str,
        name: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::rename_profile_group(group_id, name), true, None).await
    }

    pub async fn delete_profile_group(
        &self,
        group_id: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::delete_profile_group(group_id), true, None).await
    }

    pub async fn create_profile(
        &self,
        profile_group: &str,
        name: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::create_profile(profile_group, name), true, None).await
    }

    pub async fn rename_profile(
        &self,
        profile_group: &str,
        profile_index: i64,
        name: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::rename_profile(profile_group, profile_index, name), true, None)
            .await
    }

    pub async fn delete_profile(
        &self,
        profile_group: &str,
        profile_index: i64,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::delete_profile(profile_group, profile_index), true, None).await
    }

    pub async fn add_profile_to_page(
        &self,
        full_profile_id: &str,
        page_id: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::add_profile_to_page(full_profile_id, page_id), true, None).await
    }

    pub async fn remove_profile_from_page(
        &self,
        full_profile_id: &str,
        page_id: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::remove_profile_from_page(full_profile_id, page_id), true, None)
            .await
    }

    pub async fn activate_profile(
        &self,
        profile_group: &str,
        profile_index: i64,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::activate_profile(profile_group, profile_index), true, None).await
    }

    pub async fn get_active_profile(
        &self,
        profile_group: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::get_active_profile(profile_group), true, None).await
    }

    pub async fn enum_profile_groups(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::enum_profile_groups(), true, None).await
    }

    pub async fn enum_profiles(&self, profile_group: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::enum_profiles(profile_group), true, None).await
    }

    pub async fn enum_setting_pages(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::enum_setting_pages(), true, None).await
    }

    pub async fn enum_config_pages(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::enum_config_pages(), true, None).await
    }

    pub async fn enum_options(&self, page_or_path: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::enum_options(page_or_path), true, None).await
    }

    pub async fn query_option(
        &self,
        option_id_or_path: &str,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::query_option(option_id_or_path), true, None).await
    }

    pub async fn change_option(
        &self,
        option_id_path: &str,
        value: impl Into<OptionValue>,
    ) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::change_option(option_id_path, value), true, None).await
    }

    pub async fn toggle_option(&self, option_name: &str) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::toggle_option(option_name), true, None).await
    }

    pub async fn tone_map_on(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::tone_map_on(), true, None).await
    }

    pub async fn tone_map_off(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::tone_map_off(), true, None).await
    }

    pub async fn hotplug(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::hotplug(), true, None).await
    }

    pub async fn refresh_license_info(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::refresh_license_info(), true, None).await
    }

    pub async fn force_1080p60_output(&self) -> Result<Option<Message>, EnvyError> {
        self.send_raw(&command::force_1080p60_output(), true, None).await
    }

    // ── Enumeration collection ───────────────────────────────────────

    /// `EnumProfileGroups` collected to a typed list, in wire order.
    pub async fn enum_profile_groups_collect(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ProfileGroupItem>, EnvyError> {
        self.collect_enumeration(
            command::enum_profile_groups(),
            EnumSpec {
                item: |message| match message {
                    Message::ProfileGroup(item) => Some(item.clone()),
                    _ => None,
                },
                is_end: |message| matches!(message, Message::ProfileGroupEnd),
                item_kind: "ProfileGroup",
                end_kind: "ProfileGroup.",
            },
            timeout,
        )
        .await
    }

    /// `EnumProfiles <group>` collected to a typed list, in wire order.
    pub async fn enum_profiles_collect(
        &self,
        profile_group: &str,
        timeout: Duration,
    ) -> Result<Vec<ProfileItem>, EnvyError> {
        self.collect_enumeration(
            command::enum_profiles(profile_group),
            EnumSpec {
                item: |message| match message {
                    Message::Profile(item) => Some(item.clone()),
                    _ => None,
                },
                is_end: |message| matches!(message, Message::ProfileEnd),
                item_kind: "Profile",
                end_kind: "Profile.",
            },
            timeout,
        )
        .await
    }

    /// `EnumSettingPages` collected to a typed list, in wire order.
    pub async fn enum_setting_pages_collect(
        &self,
        timeout: Duration,
    ) -> Result<Vec<SettingPageItem>, EnvyError> {
        self.collect_enumeration(
            command::enum_setting_pages(),
            EnumSpec {
                item: |message| match message {
                    Message::SettingPage(item) => Some(item.clone()),
                    _ => None,
                },
                is_end: |message| matches!(message, Message::SettingPageEnd),
                item_kind: "SettingPage",
                end_kind: "SettingPage.",
            },
            timeout,
        )
        .await
    }

    /// `EnumConfigPages` collected to a typed list, in wire order.
    pub async fn enum_config_pages_collect(
        &self,
        timeout: Duration,
    ) -> Result<Vec<ConfigPageItem>, EnvyError> {
        self.collect_enumeration(
            command::enum_config_pages(),
            EnumSpec {
                item: |message| match message {
                    Message::ConfigPage(item) => Some(item.clone()),
                    _ => None,
                },
                is_end: |message| matches!(message, Message::ConfigPageEnd),
                item_kind: "ConfigPage",
                end_kind: "ConfigPage.",
            },
            timeout,
        )
        .await
    }

    /// `EnumOptions <page>` collected to a typed list, in wire order.
    pub async fn enum_options_collect(
        &self,
        page_or_path: &str,
        timeout: Duration,
    ) -> Result<Vec<OptionItem>, EnvyError> {
        self.collect_enumeration(
            command::enum_options(page_or_path),
            EnumSpec {
                item: |message| match message {
                    Message::Option(item) => Some(item.clone()),
                    _ => None,
                },
                is_end: |message| matches!(message, Message::OptionEnd),
                item_kind: "Option",
                end_kind: "Option.",
            },
            timeout,
        )
        .await
    }

    /// Send an enumeration command and gather its item stream until the
    /// end marker, failing if any single item takes longer than `timeout`.
    ///
    /// Enumerations are not nested on a single client; callers needing
    /// several run them back to back.
    async fn collect_enumeration<T: Send + 'static>(
        &self,
        command_line: String,
        spec: EnumSpec<T>,
        timeout: Duration,
    ) -> Result<Vec<T>, EnvyError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let item = spec.item;
        let is_end = spec.is_end;
        let callback_id = self.register_callback(move |event, message| {
            if event != ClientEvent::ReceivedMessage {
                return;
            }
            let Some(message) = message else {
                return;
            };
            if item(message).is_some() || is_end(message) {
                let _ = tx.send(message.clone());
            }
        });

        let result = self.drain_enumeration(&command_line, &spec, timeout, &mut rx).await;
        self.deregister_callback(callback_id);
        result
    }

    async fn drain_enumeration<T>(
        &self,
        command_line: &str,
        spec: &EnumSpec<T>,
        timeout: Duration,
        rx: &mut mpsc::UnboundedReceiver<Message>,
    ) -> Result<Vec<T>, EnvyError> {
        self.send_raw(command_line, true, None).await?;

        let mut items = Vec::new();
        loop {
            let message = match tokio::time::timeout(timeout, rx.recv()).await {
                Err(_) => {
                    return Err(EnvyError::EnumerationTimeout {
                        command: command_line.to_owned(),
                        item: spec.item_kind,
                        end: spec.end_kind,
                        timeout,
                        items_collected: items.len(),
                    });
                }
                Ok(None) => return Err(EnvyError::NotConnected),
                Ok(Some(message)) => message,
            };
            if (spec.is_end)(&message) {
                return Ok(items);
            }
            if let Some(item) = (spec.item)(&message) {
                items.push(item);
            }
        }
    }

    // ── Connection internals ─────────────────────────────────────────

    async fn connect(&self) -> Result<(), EnvyError> {
        if self.connected() {
            return Ok(());
        }

        let _ = self.inner.synced_tx.send(false);
        lock(&self.inner.state).reset_runtime_values();

        let transport = (self.inner.transport_factory)();
        transport.connect(self.inner.config.connect_timeout).await?;
        *lock(&self.inner.transport) = Some(transport);

        info!(host = %self.inner.config.host, port = self.inner.config.port, "connected");
        self.emit(ClientEvent::Connected, None);
        Ok(())
    }

    async fn disconnect_statefully(&self) {
        let transport = lock(&self.inner.transport).take();

        let _ = self.inner.synced_tx.send(false);
        lock(&self.inner.state).reset_runtime_values();

        // Dropping the senders fails every pending ack wait with NotConnected.
        lock(&self.inner.ack_waiters).clear();

        let Some(transport) = transport else {
            return;
        };
        if let Err(error) = transport.close().await {
            debug!(error = %error, "transport close failed");
        }
        self.emit(ClientEvent::Disconnected, None);
    }

    async fn listen_loop(&self, token: CancellationToken) {
        debug!("listen loop started");
        while !self.inner.stopping.load(Ordering::SeqCst) {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                result = self.read_line() => match result {
                    Ok(line) => self.handle_line(&line),
                    // The device may be idle for long stretches; our
                    // heartbeats are not required by the protocol.
                    Err(error) if error.is_read_timeout() => {}
                    Err(error) => {
                        debug!(error = %error, "connection lost");
                        self.disconnect_statefully().await;
                        if !self.reconnect_until_success(&token).await {
                            break;
                        }
                    }
                },
            }
        }
        debug!("listen loop exiting");
    }

    async fn read_line(&self) -> Result<String, EnvyError> {
        let transport =
            lock(&self.inner.transport).clone().ok_or(EnvyError::NotConnected)?;
        transport.read_line(self.inner.config.read_timeout).await
    }

    fn handle_line(&self, line: &str) {
        let message = parse_message(line);
        trace!(?message, "received");

        lock(&self.inner.state).apply(&message);
        self.resolve_ack_waiter(&message);
        self.emit(ClientEvent::ReceivedMessage, Some(&message));

        if lock(&self.inner.state).synced() {
            self.inner.synced_tx.send_if_modified(|synced| {
                let newly = !*synced;
                *synced = true;
                newly
            });
        }
    }

    fn resolve_ack_waiter(&self, message: &Message) {
        if !message.is_ack() {
            return;
        }
        let waiter = lock(&self.inner.ack_waiters).pop_front();
        if let Some(waiter) = waiter {
            let _ = waiter.tx.send(message.clone());
        }
    }

    /// Invoke every registered callback over a defensive copy of the set,
    /// so callbacks may register/deregister from inside a callback.
    fn emit(&self, event: ClientEvent, message: Option<&Message>) {
        let callbacks: Vec<EventCallback> =
            lock(&self.inner.callbacks).iter().map(|(_, callback)| Arc::clone(callback)).collect();
        for callback in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event, message))).is_err() {
                warn!(?event, "callback panicked");
            }
        }
    }

    /// Retry connecting with exponential backoff until success, `stop`, or
    /// reconnect disabled. Returns `true` when a connection was restored.
    async fn reconnect_until_success(&self, token: &CancellationToken) -> bool {
        let policy = &self.inner.config.reconnect;
        if self.inner.stopping.load(Ordering::SeqCst) || !policy.enabled {
            return false;
        }

        let mut delay = policy.initial_backoff;
        let mut attempt: u64 = 0;
        while !self.inner.stopping.load(Ordering::SeqCst) && policy.enabled {
            match self.connect().await {
                Ok(()) => return true,
                Err(error) if error.is_retryable_connect() => {
                    attempt += 1;
                    let capped = delay.min(policy.max_backoff);
                    let jitter = capped.mul_f64(policy.jitter * (self.inner.random_fn)());
                    let sleep_for = capped + jitter;
                    info!(attempt, delay_ms = u64::try_from(sleep_for.as_millis()).unwrap_or(u64::MAX), "waiting before reconnect");
                    tokio::select! {
                        biased;
                        () = token.cancelled() => return false,
                        () = (self.inner.sleep_fn)(sleep_for) => {}
                    }
                    delay = (capped * 2).max(policy.initial_backoff).min(policy.max_backoff);
                }
                Err(error) => {
                    warn!(error = %error, "reconnect aborted");
                    return false;
                }
            }
        }
        false
    }
}

struct EnumSpec<T> {
    item: fn(&Message) -> Option<T>,
    is_end: fn(&Message) -> bool,
    item_kind: &'static str,
    end_kind: &'static str,
}
