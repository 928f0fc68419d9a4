use std::fmt;
use std::sync::Arc;

use crate::client::ClientInner;
use crate::dispatch::DispatchError;
use crate::key::{format_key, join_keys, KeyError, MetricKey};

/// A view of a [`Client`](crate::Client) that records below a fixed prefix.
///
/// Views have no state of their own; everything is recorded into the
/// aggregate of the client they were created from, which stays alive for as
/// long as any view of it does.
#[derive(Clone)]
pub struct PrefixedClient {
    prefix: String,
    inner: Arc<ClientInner>,
}

impl fmt::Debug for PrefixedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrefixedClient")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl PrefixedClient {
    pub(crate) fn new(prefix: String, inner: Arc<ClientInner>) -> Self {
        PrefixedClient { prefix, inner }
    }

    /// The formatted prefix of this view.
    pub fn prefix_name(&self) -> &str {
        &self.prefix
    }

    /// Adds `delta` to the counter `key` below the prefix.
    pub fn count(&self, key: impl Into<MetricKey>, delta: i64) -> Result<(), KeyError> {
        self.inner.record_counter(&self.prefix, &key.into(), delta)
    }

    /// Adds one to the counter `key` below the prefix.
    pub fn increment(&self, key: impl Into<MetricKey>) -> Result<(), KeyError> {
        self.count(key, 1)
    }

    /// Records `value` for the measure `key` below the prefix.
    pub fn measure(&self, key: impl Into<MetricKey>, value: f64) -> Result<(), KeyError> {
        self.inner.record_measure(&self.prefix, &key.into(), value)
    }

    /// Creates a view nested below this one.
    pub fn prefix(&self, key: impl Into<MetricKey>) -> Result<PrefixedClient, KeyError> {
        let prefix = join_keys(&self.prefix, &format_key(&key.into())?);
        Ok(PrefixedClient::new(prefix, self.inner.clone()))
    }

    /// Flushes the shared client, see [`Client::flush`](crate::Client::flush).
    pub fn flush(&self) -> Result<(), DispatchError> {
        self.inner.flush()
    }
}

#[cfg(all(test, feature = "test"))]
mod tests {
    use std::collections::BTreeMap;

    use crate::test::{test_options, TestTransport};
    use crate::{Client, KeyError, MetricKey};

    #[test]
    fn test_nested_prefixes() {
        let client = Client::with_options(test_options(TestTransport::new())).unwrap();
        let my = client.prefix("my").unwrap();
        assert_eq!(my.prefix_name(), "my");
        assert_eq!(my.prefix("count").unwrap().prefix_name(), "my.count");
        assert_eq!(my.prefix("").unwrap().prefix_name(), "my");
        assert_eq!(client.prefix("").unwrap().prefix("x").unwrap().prefix_name(), "x");
        assert_eq!(my.prefix(["a", "b"]).unwrap().prefix_name(), "my.a.b");
    }

    #[test]
    fn test_tag_mapping_prefix_is_rejected() {
        let client = Client::with_options(test_options(TestTransport::new())).unwrap();
        let tags = MetricKey::from(BTreeMap::from([("region", "eu")]));
        assert!(matches!(
            client.prefix(tags.clone()),
            Err(KeyError::Unsupported { .. })
        ));
        assert!(matches!(
            client.prefix("my").unwrap().prefix(tags),
            Err(KeyError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_views_share_one_aggregate() {
        let transport = TestTransport::new();
        let client = Client::with_options(test_options(transport.clone())).unwrap();
        let db = client.prefix("db").unwrap();
        db.measure("query", 3.0).unwrap();
        db.measure("query", 4.0).unwrap();
        client.measure("db.query", 5.0).unwrap();
        assert_eq!(client.data_points(), 3);

        db.flush().unwrap();
        assert_eq!(client.data_points(), 0);
        let payload = transport.fetch_and_clear_payloads().remove(0);
        assert_eq!(payload.measure("db.query"), Some(&[3.0, 4.0, 5.0][..]));
    }
}
