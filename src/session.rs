//! Per-invocation state handed to command handlers.

use crate::config::{ConnectionOptions, ConnectionOverrides, ProfileStore};
use crate::error::{ClientError, Result};
use crate::transport::{RedisTransport, Transport};

/// Opens transports for a set of connection options.
pub trait Connector {
    type Transport: Transport;

    fn connect(&mut self, options: &ConnectionOptions) -> Result<Self::Transport>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl Connector for RedisConnector {
    type Transport = RedisTransport;

    fn connect(&mut self, options: &ConnectionOptions) -> Result<RedisTransport> {
        RedisTransport::connect(options)
    }
}

/// Resolved options plus a connection opened on first use.
///
/// The connection is released when the session is dropped, whichever way the
/// handler exits.
pub struct Session<C: Connector = RedisConnector> {
    store: ProfileStore,
    options: ConnectionOptions,
    active_profile: Option<String>,
    connector: C,
    transport: Option<C::Transport>,
}

impl<C: Connector> Session<C> {
    /// Resolve the base profile (`use_profile`, else the store's current
    /// profile) and apply `overrides` on top of it.
    ///
    /// An explicitly requested profile must exist. A current pointer that
    /// names a deleted profile falls back to the defaults.
    pub fn open(
        store: ProfileStore,
        use_profile: Option<&str>,
        overrides: &ConnectionOverrides,
        connector: C,
    ) -> Result<Self> {
        let profile_name = match use_profile {
            Some(name) => Some(name.to_string()),
            None => store.current()?,
        };

        let base = match &profile_name {
            Some(name) => store.get(name)?,
            None => None,
        };
        if base.is_none() {
            if let Some(name) = use_profile {
                return Err(ClientError::ProfileNotFound(name.to_string()));
            }
            if let Some(name) = &profile_name {
                tracing::warn!(profile = %name, "current profile not found, using defaults");
            }
        }

        let options = ConnectionOptions::merge(base.as_ref(), overrides);
        Ok(Self {
            store,
            options,
            active_profile: profile_name,
            connector,
            transport: None,
        })
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn active_profile(&self) -> Option<&str> {
        self.active_profile.as_deref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// The connection, opened now if this is the first call.
    pub fn transport(&mut self) -> Result<&mut C::Transport> {
        let transport = match self.transport.take() {
            Some(transport) => transport,
            None => {
                tracing::debug!(endpoint = %self.options.endpoint(), "opening connection");
                self.connector.connect(&self.options)?
            }
        };
        Ok(self.transport.insert(transport))
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        if self.transport.take().is_some() {
            tracing::debug!("connection closed");
        }
    }
}
