//! File-backed package catalog.
//!
//! The file is a JSON array of `{id, price, seat_capacity, is_available}`
//! objects, read once at startup.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;
use wayfare_core::catalog::{CatalogLookup, PackageInfo};
use wayfare_core::error::DomainError;

use crate::error::AppError;

/// Read-only catalog loaded from a JSON document.
#[derive(Debug, Default)]
pub struct FileCatalog {
    packages: HashMap<Uuid, PackageInfo>,
}

impl FileCatalog {
    /// A catalog that knows no packages.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses a JSON package list.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for malformed JSON or duplicate ids.
    pub fn from_json(json: &str) -> Result<Self, AppError> {
        let entries: Vec<PackageInfo> = serde_json::from_str(json)
            .map_err(|e| AppError::Config(format!("catalog is not valid: {e}")))?;
        let mut packages = HashMap::with_capacity(entries.len());
        for entry in entries {
            let id = entry.id;
            if packages.insert(id, entry).is_some() {
                return Err(AppError::Config(format!("catalog lists package {id} twice")));
            }
        }
        Ok(Self { packages })
    }

    /// Reads and parses the catalog file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Server` if the file cannot be read and
    /// `AppError::Config` if its content is invalid.
    pub async fn load(path: &Path) -> Result<Self, AppError> {
        let json = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_json(&json)?;
        info!(path = %path.display(), packages = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Number of packages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// True when no packages are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

#[async_trait]
impl CatalogLookup for FileCatalog {
    async fn get_package(&self, package_id: Uuid) -> Result<Option<PackageInfo>, DomainError> {
        Ok(self.packages.get(&package_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[tokio::test]
    async fn test_parses_package_list() {
        // Arrange
        let id = Uuid::new_v4();
        let json = format!(
            r#"[{{"id":"{id}","price":"149.90","seat_capacity":12,"is_available":true}}]"#
        );

        // Act
        let catalog = FileCatalog::from_json(&json).unwrap();

        // Assert
        let package = catalog.get_package(id).await.unwrap().unwrap();
        assert_eq!(package.price, Decimal::new(14_990, 2));
        assert_eq!(package.seat_capacity, 12);
        assert!(package.is_available);
        assert!(catalog.get_package(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let id = Uuid::new_v4();
        let entry = format!(
            r#"{{"id":"{id}","price":"10","seat_capacity":2,"is_available":false}}"#
        );
        let json = format!("[{entry},{entry}]");

        let result = FileCatalog::from_json(&json);

        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("twice")));
    }

    #[test]
    fn test_malformed_json_is_a_config_error() {
        assert!(matches!(
            FileCatalog::from_json("{not json"),
            Err(AppError::Config(_))
        ));
    }
}
