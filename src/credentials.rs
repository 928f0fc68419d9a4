//! Credentials for submitting to a collector.

use std::error::Error;
use std::fmt;
use std::time::SystemTime;

use thiserror::Error;
use url::Url;

/// Boxed error returned by a [`Configurer`].
pub type BoxError = Box<dyn Error + Send + Sync>;

/// What a [`Configurer`] hands back for a project.
///
/// All three fields are required; they are optional here so that a badly
/// behaving configurer is reported as a [`CredentialsError`] instead of
/// having to fail on its own.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// The bearer token.
    pub token: Option<String>,
    /// The base URL of the collector.
    pub base_url: Option<String>,
    /// The time at which the token stops being valid.
    pub expires: Option<SystemTime>,
}

/// Supplies credentials for a project.
///
/// The client calls this lazily when it first dispatches and again whenever
/// the previously supplied token has expired.  Closures taking the project id
/// implement this trait.
pub trait Configurer: Send + Sync + 'static {
    /// Returns the credentials for `project`.
    fn configure(&self, project: &str) -> Result<Configuration, BoxError>;
}

impl<F> Configurer for F
where
    F: Fn(&str) -> Result<Configuration, BoxError> + Send + Sync + 'static,
{
    fn configure(&self, project: &str) -> Result<Configuration, BoxError> {
        self(project)
    }
}

impl fmt::Debug for dyn Configurer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Configurer")
    }
}

/// Raised if no usable credentials could be obtained.
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The configurer itself failed.
    #[error("configurer failed")]
    Configurer(#[source] BoxError),
    /// No configurer is set and the static credentials are unusable.
    #[error("no configurer available to refresh credentials")]
    NoConfigurer,
    /// The configurer did not supply a token.
    #[error("token is required from the configurer")]
    MissingToken,
    /// The configurer did not supply a base URL.
    #[error("base URL is required from the configurer")]
    MissingBaseUrl,
    /// The configurer did not supply an expiry.
    #[error("expiry is required from the configurer")]
    MissingExpiry,
    /// The base URL could not be parsed.
    #[error("invalid base URL {0:?}")]
    InvalidBaseUrl(String, #[source] url::ParseError),
    /// The base URL cannot have path segments appended (e.g. `mailto:`).
    #[error("base URL {0:?} cannot carry a path")]
    UnsupportedBaseUrl(String),
}

/// A token together with where and until when it can be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    token: String,
    base_url: Url,
    expires: Option<SystemTime>,
}

impl Credentials {
    /// Creates credentials, validating the base URL.
    ///
    /// `expires` of `None` means the credentials never expire.
    pub fn new(
        token: String,
        base_url: &str,
        expires: Option<SystemTime>,
    ) -> Result<Self, CredentialsError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| CredentialsError::InvalidBaseUrl(base_url.to_owned(), err))?;
        if base_url.cannot_be_a_base() {
            return Err(CredentialsError::UnsupportedBaseUrl(base_url.into()));
        }
        Ok(Credentials {
            token,
            base_url,
            expires,
        })
    }

    /// Validates what a configurer returned.
    pub fn from_configuration(configuration: Configuration) -> Result<Self, CredentialsError> {
        let token = configuration.token.ok_or(CredentialsError::MissingToken)?;
        let base_url = configuration
            .base_url
            .ok_or(CredentialsError::MissingBaseUrl)?;
        let expires = configuration
            .expires
            .ok_or(CredentialsError::MissingExpiry)?;
        Credentials::new(token, &base_url, Some(expires))
    }

    /// The bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The base URL of the collector.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// When the token stops being valid.
    pub fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    /// Returns `true` if the token is not valid at `now` anymore.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }

    /// The URL submissions for `project` are posted to.
    pub fn submission_url(&self, project: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(statsum_types::protocol::SUBMISSION_PATH)
                .push(project);
        }
        url
    }
}
