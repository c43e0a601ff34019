//! Connection lifecycle.

use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

use kmb_ffi::{ClientHandle, ConnectParams, Engine};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{ClientResult, Error};
use crate::marshal::c_string;
use crate::types::TenantId;

/// A session with the engine, bound to one tenant.
///
/// Calls on one connection are serialized by an internal lock that is held
/// across the closed check, the boundary call, result decoding, and release
/// of the engine record. A concurrent [`disconnect`](Self::disconnect)
/// therefore waits for the in-flight call and never interleaves with it.
/// Independent connections do not contend.
///
/// Call `disconnect` explicitly. Dropping a connected `Connection` still
/// releases the handle but logs a warning, since the release then depends
/// on where the value happens to go out of scope.
pub struct Connection {
    engine: Arc<Engine>,
    handle: Mutex<Option<ClientHandle>>,
    tenant_id: TenantId,
    client_name: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("engine", &self.engine.name())
            .field("tenant_id", &self.tenant_id)
            .field("client_name", &self.client_name)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects through the process-wide engine installed by
    /// [`kmb_ffi::init`] or [`kmb_ffi::install`]. Nothing is loaded here;
    /// the installing call carries the library's safety contract.
    pub fn connect(config: &ClientConfig) -> ClientResult<Self> {
        let engine = kmb_ffi::global()?;
        Self::connect_with(engine, config)
    }

    /// Connects through a specific engine.
    pub fn connect_with(engine: Arc<Engine>, config: &ClientConfig) -> ClientResult<Self> {
        config.validate()?;

        let addresses = config
            .addresses
            .iter()
            .map(|a| c_string("address", a))
            .collect::<ClientResult<Vec<CString>>>()?;
        let address_refs: Vec<&_> = addresses.iter().map(CString::as_c_str).collect();
        let token = config
            .auth_token
            .as_ref()
            .map(|t| c_string("auth token", t))
            .transpose()?;
        let client_name = c_string("client name", &config.client_name)?;
        let client_version = c_string("client version", &config.client_version)?;

        let params = ConnectParams {
            addresses: &address_refs,
            tenant_id: config.tenant_id.get(),
            auth_token: token.as_deref(),
            client_name: &client_name,
            client_version: &client_version,
        };
        let handle = engine
            .connect(&params)
            .map_err(|e| Error::from_boundary(&engine, e))?;

        debug!(
            tenant_id = config.tenant_id.get(),
            addresses = config.addresses.len(),
            client = %config.client_name,
            "connected"
        );
        Ok(Self {
            engine,
            handle: Mutex::new(Some(handle)),
            tenant_id: config.tenant_id,
            client_name: config.client_name.clone(),
        })
    }

    /// Closes the connection. Calling it again is a no-op.
    pub fn disconnect(&self) {
        if let Some(handle) = self.handle.lock().take() {
            self.engine.disconnect(handle);
            debug!(tenant_id = self.tenant_id.get(), "disconnected");
        }
    }

    /// Returns true once [`disconnect`](Self::disconnect) has run.
    pub fn is_closed(&self) -> bool {
        self.handle.lock().is_none()
    }

    /// Tenant this connection is bound to.
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Name reported to the cluster.
    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    /// Engine this connection talks to.
    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Runs `op` with the live handle, or fails with `ClientClosed`.
    pub(crate) fn with_handle<T>(
        &self,
        op: impl FnOnce(&Engine, &mut ClientHandle) -> ClientResult<T>,
    ) -> ClientResult<T> {
        let mut slot = self.handle.lock();
        let handle = slot.as_mut().ok_or(Error::ClientClosed)?;
        op(&self.engine, handle)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            warn!(
                tenant_id = self.tenant_id.get(),
                "connection dropped without disconnect; releasing handle"
            );
            self.engine.disconnect(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use kmb_testkit::{loopback_engine, unreachable_address, LoopbackCluster};

    fn config(cluster: &LoopbackCluster) -> ClientConfig {
        ClientConfig::new(1).address(cluster.address())
    }

    #[test]
    fn connection_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Connection>();
    }

    #[test]
    fn disconnect_is_idempotent() {
        let cluster = LoopbackCluster::start();
        let conn = Connection::connect_with(loopback_engine(), &config(&cluster)).unwrap();
        assert!(!conn.is_closed());
        conn.disconnect();
        conn.disconnect();
        assert!(conn.is_closed());
        assert_eq!(cluster.stats().disconnects, 1);
    }

    #[test]
    fn closed_connection_rejects_without_boundary_call() {
        let cluster = LoopbackCluster::start();
        let conn = Connection::connect_with(loopback_engine(), &config(&cluster)).unwrap();
        conn.disconnect();
        let calls = cluster.stats().boundary_calls;

        let err = conn.with_handle(|_, _| Ok(())).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientClosed);
        assert_eq!(cluster.stats().boundary_calls, calls);
    }

    #[test]
    fn drop_releases_handle() {
        let cluster = LoopbackCluster::start();
        {
            let _conn = Connection::connect_with(loopback_engine(), &config(&cluster)).unwrap();
        }
        assert_eq!(cluster.stats().disconnects, 1);
    }

    #[test]
    fn invalid_config_fails_before_engine() {
        let cluster = LoopbackCluster::start();
        let err = Connection::connect_with(loopback_engine(), &ClientConfig::new(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(cluster.stats().boundary_calls, 0);
    }

    #[test]
    fn unreachable_addresses_fail() {
        let config = ClientConfig::new(1).address(unreachable_address());
        let err = Connection::connect_with(loopback_engine(), &config).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
        assert!(!err.is_retryable());
    }
}
