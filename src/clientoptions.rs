use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use statsum_types::{ParseProjectIdError, ProjectId};
use thiserror::Error;

use crate::codec::{Codec, JsonCodec};
use crate::credentials::{BoxError, Configurer, Credentials, CredentialsError};
use crate::dispatch::{ErrorHandler, RetryPolicy};
use crate::jitter::{JitterSource, ThreadRngJitter};
use crate::transport::Transport;

/// The smallest accepted `max_delay`.
pub const MIN_MAX_DELAY: Duration = Duration::from_secs(30);

/// Raised if [`ClientOptions`] cannot be turned into a client.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `project` is empty.
    #[error("project is required")]
    MissingProject,
    /// `project` is not a valid project id.
    #[error("invalid project")]
    InvalidProject(#[from] ParseProjectIdError),
    /// `max_delay` is below [`MIN_MAX_DELAY`].
    #[error("max_delay must be at least {floor:?}, got {max_delay:?}")]
    MaxDelayTooShort {
        /// The configured value.
        max_delay: Duration,
        /// The smallest accepted value.
        floor: Duration,
    },
    /// The retry jitter could reorder consecutive retry delays.
    #[error("retry max_jitter must be below base_delay {base_delay:?}, got {max_jitter:?}")]
    RetryJitterTooLarge {
        /// The configured jitter bound.
        max_jitter: Duration,
        /// The configured delay before the first retry.
        base_delay: Duration,
    },
    /// Neither a configurer nor a static token is set.
    #[error("either a configurer or a token is required")]
    NoCredentialSource,
    /// A static token is set without a base URL.
    #[error("base_url is required together with a token")]
    MissingBaseUrl,
    /// The static credentials are unusable.
    #[error("invalid static credentials")]
    InvalidCredentials(#[source] CredentialsError),
    /// No transport is configured and the default one is not compiled in.
    #[error("no transport configured")]
    NoTransport,
    /// The default transport could not be created.
    #[error("failed to create transport")]
    Transport(#[source] BoxError),
    /// The flush worker could not be started.
    #[error("failed to spawn flush worker")]
    SpawnWorker(#[source] std::io::Error),
}

/// Configuration settings for the client.
///
/// These options are explained in more detail in the general statsum
/// documentation for the client.
///
/// # Examples
///
/// ```
/// let options = statsum::ClientOptions {
///     token: Some("secret-token".into()),
///     base_url: Some("https://statsum.example.com".into()),
///     ..statsum::ClientOptions::new("my-project")
/// };
/// assert_eq!(options.max_data_points, 10000);
/// ```
#[derive(Clone)]
pub struct ClientOptions {
    /// The project metrics are submitted to.
    pub project: String,
    /// Supplies credentials, fetched lazily and again once they expire.
    pub configurer: Option<Arc<dyn Configurer>>,
    /// A static token used instead of a configurer. It never expires.
    pub token: Option<String>,
    /// The collector base URL for `token`.
    pub base_url: Option<String>,
    /// Flush right away once more data points than this are pending. (defaults to 10000)
    pub max_data_points: usize,
    /// The longest delay between the first write and the flush. (defaults to 90s)
    pub max_delay: Duration,
    /// The shortest delay between the first write and the flush. (defaults to 30s)
    pub min_delay: Duration,
    /// Forward dispatch failures to `error_handler`. (defaults to false)
    pub emit_errors: bool,
    /// Receives dispatch failures when `emit_errors` is enabled.
    pub error_handler: Option<ErrorHandler>,
    /// The transport to use.
    ///
    /// If unset the reqwest based HTTP transport is used when the
    /// `transport` feature is enabled.
    pub transport: Option<Arc<dyn Transport>>,
    /// The payload encoding. (defaults to JSON)
    pub codec: Arc<dyn Codec>,
    /// The randomness behind flush delays and retry jitter.
    pub jitter: Arc<dyn JitterSource>,
    /// Upper bound for a single submission attempt. (defaults to 30s)
    pub request_timeout: Duration,
    /// How failed submissions are retried.
    pub retry: RetryPolicy,
}

impl ClientOptions {
    /// Creates options for `project` with default settings.
    pub fn new(project: impl Into<String>) -> Self {
        ClientOptions {
            project: project.into(),
            ..Default::default()
        }
    }

    /// Sets the configurer.
    ///
    /// # Examples
    ///
    /// ```
    /// use statsum::{BoxError, ClientOptions, Configuration};
    ///
    /// let options = ClientOptions::new("my-project").configurer(|project: &str| {
    ///     Ok::<_, BoxError>(Configuration {
    ///         token: Some(format!("token-for-{project}")),
    ///         base_url: Some("https://statsum.example.com".into()),
    ///         expires: Some(std::time::SystemTime::now()),
    ///     })
    /// });
    /// assert!(options.configurer.is_some());
    /// ```
    pub fn configurer<C: Configurer>(mut self, configurer: C) -> Self {
        self.configurer = Some(Arc::new(configurer));
        self
    }

    /// Enables `emit_errors` and installs `handler`.
    pub fn on_error<F>(mut self, handler: F) -> Self
    where
        F: Fn(&crate::DispatchError) + Send + Sync + 'static,
    {
        self.emit_errors = true;
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Checks the options and clamps `min_delay` to `max_delay`.
    pub(crate) fn validate(&mut self) -> Result<ValidatedParts, ConfigError> {
        if self.project.is_empty() {
            return Err(ConfigError::MissingProject);
        }
        let project: ProjectId = self.project.parse()?;

        if self.max_delay < MIN_MAX_DELAY {
            return Err(ConfigError::MaxDelayTooShort {
                max_delay: self.max_delay,
                floor: MIN_MAX_DELAY,
            });
        }
        if self.min_delay > self.max_delay {
            self.min_delay = self.max_delay;
        }
        if self.retry.max_retries > 0 && self.retry.max_jitter >= self.retry.base_delay {
            return Err(ConfigError::RetryJitterTooLarge {
                max_jitter: self.retry.max_jitter,
                base_delay: self.retry.base_delay,
            });
        }

        let credentials = match (&self.token, &self.base_url) {
            (Some(token), Some(base_url)) => Some(
                Credentials::new(token.clone(), base_url, None)
                    .map_err(ConfigError::InvalidCredentials)?,
            ),
            (Some(_), None) => return Err(ConfigError::MissingBaseUrl),
            (None, _) if self.configurer.is_none() => {
                return Err(ConfigError::NoCredentialSource)
            }
            (None, _) => None,
        };

        Ok(ValidatedParts {
            project,
            credentials,
        })
    }
}

/// What [`ClientOptions::validate`] derives from the options.
#[derive(Debug)]
pub(crate) struct ValidatedParts {
    pub project: ProjectId,
    pub credentials: Option<Credentials>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        #[derive(Debug)]
        struct ErrorHandler;
        let error_handler = self.error_handler.as_ref().map(|_| ErrorHandler);
        let token = self.token.as_ref().map(|_| "[redacted]");

        f.debug_struct("ClientOptions")
            .field("project", &self.project)
            .field("configurer", &self.configurer)
            .field("token", &token)
            .field("base_url", &self.base_url)
            .field("max_data_points", &self.max_data_points)
            .field("max_delay", &self.max_delay)
            .field("min_delay", &self.min_delay)
            .field("emit_errors", &self.emit_errors)
            .field("error_handler", &error_handler)
            .field("transport", &self.transport)
            .field("codec", &self.codec)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Default for ClientOptions {
    fn default() -> ClientOptions {
        ClientOptions {
            project: String::new(),
            configurer: None,
            token: None,
            base_url: None,
            max_data_points: 10000,
            max_delay: Duration::from_secs(90),
            min_delay: Duration::from_secs(30),
            emit_errors: false,
            error_handler: None,
            transport: None,
            codec: Arc::new(JsonCodec),
            jitter: Arc::new(ThreadRngJitter),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&str> for ClientOptions {
    fn from(project: &str) -> ClientOptions {
        ClientOptions::new(project)
    }
}
