//! Provider initialization.
//!
//! The host configures the provider once with whatever collaborator it
//! built at startup. The provider checks that the collaborator really is a
//! store client before any driver can be used, then shares it between the
//! three drivers.

use crate::driver::{CollectionDriver, DatabaseDriver, IndexDriver};
use crate::error::Result;
use crate::store::{StoreClient, StoreHandle};
use crate::Error;
use std::any::Any;
use std::sync::Arc;

/// Opaque collaborator handed over by the host.
pub type ProviderData = Arc<dyn Any + Send + Sync>;

/// The three drivers around one shared store client.
#[derive(Clone)]
pub struct Provider {
    client: Arc<dyn StoreClient>,
    databases: DatabaseDriver,
    collections: CollectionDriver,
    indexes: IndexDriver,
}

impl Provider {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self {
            databases: DatabaseDriver::new(client.clone()),
            collections: CollectionDriver::new(client.clone()),
            indexes: IndexDriver::new(client.clone()),
            client,
        }
    }

    /// Build a provider from host-supplied data.
    ///
    /// Fails with a configuration error when nothing was supplied or the
    /// supplied value is not a [`StoreHandle`].
    pub fn configure(data: Option<ProviderData>) -> Result<Self> {
        let data =
            data.ok_or_else(|| Error::Configuration("store client not configured".into()))?;

        let handle = data.downcast_ref::<StoreHandle>().ok_or_else(|| {
            Error::Configuration(
                "unexpected provider data: expected a StoreHandle wrapping a store client".into(),
            )
        })?;

        tracing::debug!("provider configured");
        Ok(Self::new(handle.client().clone()))
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.client
    }

    pub fn databases(&self) -> &DatabaseDriver {
        &self.databases
    }

    pub fn collections(&self) -> &CollectionDriver {
        &self.collections
    }

    pub fn indexes(&self) -> &IndexDriver {
        &self.indexes
    }
}
