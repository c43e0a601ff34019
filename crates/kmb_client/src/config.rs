//! Connection configuration.

use zeroize::Zeroizing;

use crate::error::{ClientResult, Error};
use crate::types::TenantId;

/// Client name reported when none is configured.
pub const DEFAULT_CLIENT_NAME: &str = "kmb-rust";

/// Configuration for opening a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `host:port` addresses, tried in order.
    pub addresses: Vec<String>,

    /// Tenant the connection is bound to.
    pub tenant_id: TenantId,

    /// Authentication token; wiped from memory on drop.
    pub auth_token: Option<Zeroizing<String>>,

    /// Name reported to the cluster.
    pub client_name: String,

    /// Version reported to the cluster.
    pub client_version: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addresses: Vec::new(),
            tenant_id: TenantId(0),
            auth_token: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `tenant_id` with no addresses.
    #[must_use]
    pub fn new(tenant_id: u64) -> Self {
        Self {
            tenant_id: TenantId(tenant_id),
            ..Self::default()
        }
    }

    /// Adds an address.
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.addresses.push(address.into());
        self
    }

    /// Replaces the address list.
    #[must_use]
    pub fn addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the authentication token.
    #[must_use]
    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(Zeroizing::new(token.into()));
        self
    }

    /// Sets the reported client name.
    #[must_use]
    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = name.into();
        self
    }

    /// Sets the reported client version.
    #[must_use]
    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.client_version = version.into();
        self
    }

    /// Checks the configuration without contacting the engine.
    pub fn validate(&self) -> ClientResult<()> {
        if self.addresses.is_empty() {
            return Err(Error::InvalidArgument(
                "at least one address is required".into(),
            ));
        }
        for address in &self.addresses {
            validate_address(address)?;
        }

        let strings = [
            ("client name", self.client_name.as_str()),
            ("client version", self.client_version.as_str()),
            (
                "auth token",
                self.auth_token.as_ref().map_or("", |t| t.as_str()),
            ),
        ];
        for (what, value) in strings {
            if value.contains('\0') {
                return Err(Error::InvalidArgument(format!("{what} contains a NUL byte")));
            }
        }
        Ok(())
    }
}

fn validate_address(address: &str) -> ClientResult<()> {
    let invalid = |why: &str| Err(Error::InvalidArgument(format!("address `{address}` {why}")));
    if address.contains('\0') {
        return invalid("contains a NUL byte");
    }
    let Some((host, port)) = address.rsplit_once(':') else {
        return invalid("is not host:port");
    };
    if host.is_empty() {
        return invalid("has an empty host");
    }
    if port.parse::<u16>().is_err() {
        return invalid("has a non-numeric port");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_config() {
        let config = ClientConfig::new(7);
        assert_eq!(config.tenant_id, TenantId(7));
        assert_eq!(config.client_name, "kmb-rust");
        assert_eq!(config.client_version, env!("CARGO_PKG_VERSION"));
        assert!(config.auth_token.is_none());
    }

    #[test]
    fn builder_pattern() {
        let config = ClientConfig::new(1)
            .address("a:1")
            .address("b:2")
            .auth_token("secret")
            .client_name("svc");
        assert_eq!(config.addresses, vec!["a:1", "b:2"]);
        assert_eq!(config.auth_token.as_deref().map(String::as_str), Some("secret"));
        assert_eq!(config.client_name, "svc");
        config.validate().unwrap();

        let replaced = config.addresses(["c:3"]);
        assert_eq!(replaced.addresses, vec!["c:3"]);
    }

    #[test]
    fn validation_rejects_bad_addresses() {
        let err = ClientConfig::new(1).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        for bad in ["localhost", ":80", "host:http", "host:70000", "ho\0st:1"] {
            assert!(ClientConfig::new(1).address(bad).validate().is_err(), "{bad}");
        }
        assert!(ClientConfig::new(1).address("[::1]:5432").validate().is_ok());
    }

    #[test]
    fn validation_rejects_nul_in_strings() {
        let config = ClientConfig::new(1).address("h:1").auth_token("a\0b");
        assert!(config.validate().is_err());
    }
}
