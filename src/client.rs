use std::fmt;
use std::sync::Arc;

use crate::aggregate::{AggregateStore, Snapshot};
use crate::clientoptions::{ClientOptions, ConfigError};
use crate::dispatch::{DispatchError, Dispatcher, DispatcherConfig};
use crate::key::{expand_key, format_key, join_keys, KeyError, MetricKey};
use crate::prefixed::PrefixedClient;
use crate::scheduler::{FlushScheduler, ScheduleSettings};
use crate::statsum_debug;
use crate::transport::Transport;

/// The statsum client.
///
/// The client aggregates counters and measures in memory and submits them to
/// the collector in batches, either after a random delay between
/// `min_delay` and `max_delay` or as soon as more than `max_data_points` are
/// pending.  Recording never blocks on the network.
///
/// Clones share the same aggregate, as do the views created with
/// [`prefix`](Client::prefix).  Whatever is still pending when the last of
/// them is dropped is submitted before the drop returns.
///
/// # Examples
///
/// ```
/// use statsum::test::TestTransport;
/// use statsum::{Client, ClientOptions};
///
/// let transport = TestTransport::new();
/// let client = Client::with_options(ClientOptions {
///     token: Some("KEY".into()),
///     base_url: Some("https://statsum.invalid".into()),
///     transport: Some(transport.clone()),
///     ..ClientOptions::new("my-project")
/// })
/// .unwrap();
///
/// client.increment("requests").unwrap();
/// client.measure("latency", 12.5).unwrap();
/// client.flush().unwrap();
///
/// let payload = transport.fetch_and_clear_payloads().remove(0);
/// assert_eq!(payload.counter("requests"), Some(1));
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    options: ClientOptions,
    store: Arc<AggregateStore>,
    dispatcher: Arc<Dispatcher>,
    scheduler: FlushScheduler,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("project", &self.inner.options.project)
            .field("data_points", &self.data_points())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl Client {
    /// Creates a new client for the given options.
    ///
    /// This validates the options and starts the flush worker.  Credentials
    /// are not fetched until the first submission.
    pub fn with_options(mut options: ClientOptions) -> Result<Client, ConfigError> {
        let parts = options.validate()?;
        statsum_debug!(
            "[Client] Creating new client for project: {} (max_data_points={}, delay={:?}..{:?})",
            parts.project,
            options.max_data_points,
            options.min_delay,
            options.max_delay
        );

        let transport = match options.transport {
            Some(ref transport) => transport.clone(),
            None => default_transport()?,
        };
        let error_handler = if options.emit_errors {
            options.error_handler.clone()
        } else {
            None
        };

        let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig {
            project: parts.project,
            configurer: options.configurer.clone(),
            credentials: parts.credentials,
            transport,
            codec: options.codec.clone(),
            jitter: options.jitter.clone(),
            retry: options.retry.clone(),
            timeout: options.request_timeout,
            error_handler,
        }));

        let store = Arc::new(AggregateStore::new());
        let worker_dispatcher = dispatcher.clone();
        let scheduler = FlushScheduler::new(
            store.clone(),
            ScheduleSettings {
                max_data_points: options.max_data_points,
                min_delay: options.min_delay,
                max_delay: options.max_delay,
                jitter: options.jitter.clone(),
            },
            Box::new(move |snapshot: Snapshot| {
                // failures are logged and reported by the dispatcher
                worker_dispatcher.flush(snapshot).ok();
            }),
        )
        .map_err(ConfigError::SpawnWorker)?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                options,
                store,
                dispatcher,
                scheduler,
            }),
        })
    }

    /// Adds `delta` to the counter `key`.
    ///
    /// A tag mapping key updates every combination of its tags.
    pub fn count(&self, key: impl Into<MetricKey>, delta: i64) -> Result<(), KeyError> {
        self.inner.record_counter("", &key.into(), delta)
    }

    /// Adds one to the counter `key`.
    pub fn increment(&self, key: impl Into<MetricKey>) -> Result<(), KeyError> {
        self.count(key, 1)
    }

    /// Records `value` for the measure `key`.
    pub fn measure(&self, key: impl Into<MetricKey>, value: f64) -> Result<(), KeyError> {
        self.inner.record_measure("", &key.into(), value)
    }

    /// Creates a view that records everything below `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// # let client = statsum::Client::with_options(statsum::ClientOptions {
    /// #     token: Some("KEY".into()),
    /// #     base_url: Some("https://statsum.invalid".into()),
    /// #     transport: Some(statsum::test::TestTransport::new()),
    /// #     ..statsum::ClientOptions::new("my-project")
    /// # }).unwrap();
    /// let api = client.prefix("api").unwrap();
    /// api.increment("requests").unwrap(); // api.requests
    /// assert_eq!(api.prefix(["v1", "users"]).unwrap().prefix_name(), "api.v1.users");
    /// ```
    pub fn prefix(&self, key: impl Into<MetricKey>) -> Result<PrefixedClient, KeyError> {
        let prefix = format_key(&key.into())?;
        Ok(PrefixedClient::new(prefix, self.inner.clone()))
    }

    /// Submits everything recorded so far and waits for the result.
    ///
    /// A submission is made even if nothing was recorded.
    pub fn flush(&self) -> Result<(), DispatchError> {
        self.inner.flush()
    }

    /// The data points recorded since the last flush.
    pub fn data_points(&self) -> usize {
        self.inner.store.data_points()
    }

    /// The options of this client, after validation.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }
}

impl ClientInner {
    pub(crate) fn record_counter(
        &self,
        prefix: &str,
        key: &MetricKey,
        delta: i64,
    ) -> Result<(), KeyError> {
        let names = expand_key(key)?.map(|name| join_keys(prefix, &name));
        self.store.merge_counters(names, delta);
        self.scheduler.on_merge();
        Ok(())
    }

    pub(crate) fn record_measure(
        &self,
        prefix: &str,
        key: &MetricKey,
        value: f64,
    ) -> Result<(), KeyError> {
        let names = expand_key(key)?.map(|name| join_keys(prefix, &name));
        self.store.merge_measures(names, value);
        self.scheduler.on_merge();
        Ok(())
    }

    /// Dispatches every pending snapshot on the calling thread.
    ///
    /// All snapshots are attempted; the first failure is returned.
    pub(crate) fn flush(&self) -> Result<(), DispatchError> {
        let mut result = Ok(());
        for snapshot in self.scheduler.take_all() {
            if let Err(err) = self.dispatcher.flush(snapshot) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
    let transport = crate::transports::ReqwestHttpTransport::try_new()
        .map_err(|err| ConfigError::Transport(Box::new(err)))?;
    Ok(Arc::new(transport))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn Transport>, ConfigError> {
    Err(ConfigError::NoTransport)
}
