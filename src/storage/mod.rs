//! Persistence: connection pools, row models, repositories.

pub mod database;
pub mod models;
pub mod repository;

pub use database::{BackendStore, PricingStore};
pub use repository::{
    BackendRepository, ByokRepository, CatalogRepository, SnapshotRepository,
    SqliteBackendRepository, SqliteByokRepository, SqliteCatalogRepository,
    SqliteSnapshotRepository,
};
