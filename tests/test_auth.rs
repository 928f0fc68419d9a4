#![cfg(feature = "test")]

use std::time::{Duration, SystemTime};

use statsum::test::{test_options, TestTransport, TEST_BASE_URL};
use statsum::types::auth::{create_token, verify_token, DEFAULT_TOKEN_EXPIRY};
use statsum::{BoxError, Client, ClientOptions, Configuration};

const SECRET: &[u8] = b"collector-secret";

#[test]
fn test_issued_token_reaches_collector() {
    let transport = TestTransport::new();
    let options = ClientOptions {
        token: None,
        base_url: None,
        ..test_options(transport.clone())
    }
    .configurer(|project: &str| -> Result<Configuration, BoxError> {
        let token = create_token(project, SECRET, DEFAULT_TOKEN_EXPIRY)?;
        Ok(Configuration {
            token: Some(token),
            base_url: Some(TEST_BASE_URL.into()),
            expires: Some(SystemTime::now() + DEFAULT_TOKEN_EXPIRY - Duration::from_secs(60)),
        })
    });
    let client = Client::with_options(options).unwrap();
    client.increment("authorized").unwrap();
    client.flush().unwrap();

    let request = transport.fetch_and_clear_requests().remove(0);
    let claims = verify_token(&request.token, SECRET).unwrap();
    assert_eq!(claims.project, "test");
    assert_eq!(claims.exp - claims.iat, DEFAULT_TOKEN_EXPIRY.as_secs());
    assert!(verify_token(&request.token, b"another-secret").is_err());
}
