//! Test catalog — an in-memory `CatalogLookup`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;
use wayfare_core::catalog::{CatalogLookup, PackageInfo};
use wayfare_core::error::DomainError;

/// A catalog backed by a map. Unknown packages resolve to `None`.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    packages: Mutex<HashMap<Uuid, PackageInfo>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an available package and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_package(&self, price: Decimal, seat_capacity: u32) -> Uuid {
        let id = Uuid::new_v4();
        self.put(PackageInfo {
            id,
            price,
            seat_capacity,
            is_available: true,
        });
        id
    }

    /// Inserts or replaces a package.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn put(&self, package: PackageInfo) {
        self.packages.lock().unwrap().insert(package.id, package);
    }

    /// Changes the price of an existing package.
    ///
    /// # Panics
    ///
    /// Panics if the package is unknown or the mutex is poisoned.
    pub fn reprice(&self, package_id: Uuid, price: Decimal) {
        self.packages
            .lock()
            .unwrap()
            .get_mut(&package_id)
            .expect("reprice of unknown package")
            .price = price;
    }

    /// Marks an existing package as unavailable.
    ///
    /// # Panics
    ///
    /// Panics if the package is unknown or the mutex is poisoned.
    pub fn withdraw(&self, package_id: Uuid) {
        self.packages
            .lock()
            .unwrap()
            .get_mut(&package_id)
            .expect("withdraw of unknown package")
            .is_available = false;
    }
}

#[async_trait]
impl CatalogLookup for InMemoryCatalog {
    async fn get_package(&self, package_id: Uuid) -> Result<Option<PackageInfo>, DomainError> {
        Ok(self.packages.lock().unwrap().get(&package_id).cloned())
    }
}
