//! Main `AirPlay` client implementation

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, watch};

use crate::connection::{ConnectionManager, ConnectionStats, Reply, ReverseChannel};
use crate::control::{Command, validate_property_name};
use crate::error::AirPlayError;
use crate::protocol::body::RequestBody;
use crate::state::{DeviceEvent, EventBus, StateTracker, SubscriptionId};
use crate::types::{ClientConfig, PlaybackState};


/// Client for one `AirPlay` video receiver
///
/// Every control call maps to a single HTTP request on a shared, persistent
/// connection. Calling [`play`](Self::play) also opens the reverse event
/// channel, through which the device reports state changes; a `stopped`
/// report destroys the client.
///
/// Calls resolve to a [`Reply`] once the device answers. To fire and
/// forget, spawn the call on a clone of the client and drop the handle.
///
/// # Example
///
/// ```rust,no_run
/// use airplay_video::AirPlayClient;
///
/// # async fn example() -> Result<(), airplay_video::AirPlayError> {
/// let client = AirPlayClient::new("192.168.1.20");
///
/// client.subscribe(|event| println!("device event: {:?}", event.payload));
/// client.play("http://example.com/movie.mp4", Some(30.0)).await?;
///
/// let reply = client.playback_info().await?;
/// println!("{:?}", reply.body);
///
/// client.destroy();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AirPlayClient {
    inner: Arc<Inner>,
}

struct Inner {
    /// Control connection
    connection: ConnectionManager,
    /// At most one reverse channel at a time
    reverse: Mutex<Option<ReverseChannel>>,
    /// Last reported playback state
    tracker: StateTracker,
    /// Event observers
    events: EventBus,
}

impl AirPlayClient {
    /// Create a client for `host` on the default port
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_config(host, ClientConfig::default())
    }

    /// Create a client with explicit configuration
    #[must_use]
    pub fn with_config(host: impl Into<String>, config: ClientConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                connection: ConnectionManager::new(host, config),
                reverse: Mutex::new(None),
                tracker: StateTracker::new(),
                events,
            }),
        }
    }

    /// Device host
    #[must_use]
    pub fn host(&self) -> &str {
        self.inner.connection.host()
    }

    /// Device control port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.connection.config().port
    }

    // ===== Control =====

    /// Query device capabilities (`GET /server-info`)
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn server_info(&self) -> Result<Reply, AirPlayError> {
        self.execute(Command::ServerInfo).await
    }

    /// Start playing `url`, `position` seconds in (default `0`)
    ///
    /// A fresh reverse event channel is opened first, replacing any previous
    /// one. Failing to open it is logged and does not stop playback.
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn play(&self, url: &str, position: Option<f64>) -> Result<Reply, AirPlayError> {
        self.execute(Command::Play {
            url: url.to_string(),
            position: position.unwrap_or(0.0),
        })
        .await
    }

    /// Read the playback position (`None`) or seek to `position` seconds
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn scrub(&self, position: Option<f64>) -> Result<Reply, AirPlayError> {
        self.execute(Command::Scrub(position)).await
    }

    /// Set the playback rate
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn rate(&self, speed: f64) -> Result<Reply, AirPlayError> {
        self.execute(Command::Rate(speed)).await
    }

    /// Pause playback (rate `0`)
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn pause(&self) -> Result<Reply, AirPlayError> {
        self.rate(0.0).await
    }

    /// Resume playback (rate `1`)
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn resume(&self) -> Result<Reply, AirPlayError> {
        self.rate(1.0).await
    }

    /// Stop playback
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn stop(&self) -> Result<Reply, AirPlayError> {
        self.execute(Command::Stop).await
    }

    /// Query position, duration and buffering (`GET /playback-info`)
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn playback_info(&self) -> Result<Reply, AirPlayError> {
        self.execute(Command::PlaybackInfo).await
    }

    /// Read a property when `value` is `None`, write it otherwise
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `name` cannot be placed in the query
    /// string, or an error if no reply was received.
    pub async fn property(
        &self,
        name: &str,
        value: Option<RequestBody>,
    ) -> Result<Reply, AirPlayError> {
        validate_property_name(name)?;
        self.execute(Command::property(name, value)).await
    }

    /// Read a property (`POST /getProperty?name`)
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn get_property(&self, name: &str) -> Result<Reply, AirPlayError> {
        self.property(name, None).await
    }

    /// Write a property (`PUT /setProperty?name`)
    ///
    /// Numbers and booleans are sent as the document `{ "value": scalar }`;
    /// strings go out verbatim as `text/parameters`.
    ///
    /// # Errors
    ///
    /// Returns an error if no reply was received.
    pub async fn set_property(
        &self,
        name: &str,
        value: impl Into<RequestBody>,
    ) -> Result<Reply, AirPlayError> {
        self.property(name, Some(value.into())).await
    }

    async fn execute(&self, command: Command) -> Result<Reply, AirPlayError> {
        if self.is_destroyed() {
            return Err(AirPlayError::ClientDestroyed);
        }
        if command.starts_reverse_channel() {
            self.start_reverse().await;
        }

        let (method, path, body) = command.into_request();
        self.inner.connection.request(method, &path, body).await
    }

    // ===== Reverse channel =====

    async fn start_reverse(&self) {
        // An earlier channel is torn down before a new one is requested
        if let Some(previous) = self.inner.lock_reverse().take() {
            previous.destroy();
        }

        let weak = Arc::downgrade(&self.inner);
        let sink = Arc::new(move |event: DeviceEvent| Inner::on_event(&weak, &event));

        let connection = &self.inner.connection;
        match ReverseChannel::open(connection.host(), connection.config(), sink).await {
            Ok(channel) => {
                if self.is_destroyed() {
                    channel.destroy();
                    return;
                }
                if let Some(raced) = self.inner.lock_reverse().replace(channel) {
                    raced.destroy();
                }
            }
            Err(e) => tracing::warn!("Could not open reverse channel: {}", e),
        }
    }

    /// Whether a reverse channel is currently listening
    #[must_use]
    pub fn has_reverse_channel(&self) -> bool {
        self.inner
            .lock_reverse()
            .as_ref()
            .is_some_and(|channel| !channel.is_finished())
    }

    // ===== Lifecycle =====

    /// Close the reverse event channel; the control connection stays usable
    pub fn close(&self) {
        if let Some(channel) = self.inner.lock_reverse().take() {
            channel.close();
        }
    }

    /// Tear down both connections
    ///
    /// Every later control call fails with `ClientDestroyed`. Safe to call
    /// more than once.
    pub fn destroy(&self) {
        self.inner.destroy();
    }

    /// Whether the client has been destroyed
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.connection.is_destroyed()
    }

    // ===== State and events =====

    /// Last playback state reported by the device
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.inner.tracker.state()
    }

    /// Subscribe to playback state changes
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.inner.tracker.watch()
    }

    /// Register an event handler, run synchronously for every device push
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(handler)
    }

    /// Remove an event handler
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Async stream of device pushes
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.events.receiver()
    }

    /// Control connection statistics
    pub async fn stats(&self) -> ConnectionStats {
        self.inner.connection.stats().await
    }
}

impl Inner {
    fn lock_reverse(&self) -> MutexGuard<'_, Option<ReverseChannel>> {
        self.reverse.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs on the reverse channel task for every accepted push
    fn on_event(weak: &Weak<Inner>, event: &DeviceEvent) {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        if inner.tracker.apply(event) {
            tracing::info!("Device reported stopped");
            inner.destroy();
        }
        inner.events.emit(event);
    }

    fn destroy(&self) {
        if let Some(channel) = self.lock_reverse().take() {
            channel.destroy();
        }
        if !self.connection.is_destroyed() {
            self.connection.destroy();
            tracing::info!("Client for {} destroyed", self.connection.address());
        }
    }
}
