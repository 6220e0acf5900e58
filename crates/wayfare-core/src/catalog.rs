//! Catalog lookup port.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// The slice of package metadata the booking core reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package identifier.
    pub id: Uuid,
    /// Price per seat.
    pub price: Decimal,
    /// Maximum travelers for one departure.
    pub seat_capacity: u32,
    /// Whether new bookings are accepted.
    pub is_available: bool,
}

/// Read-only lookup of package metadata.
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Returns the package, or `None` if the catalog does not know it.
    async fn get_package(&self, package_id: Uuid) -> Result<Option<PackageInfo>, DomainError>;
}
