// src/db.rs

pub mod store;
pub use store::{DataStore, Relation, StoreError};
pub mod memory;
pub use memory::InMemoryStore;
pub mod postgres;
pub use postgres::PgStore;

pub mod pharmacy_repo;
pub use pharmacy_repo::PharmacyRepository;
pub mod user_repo;
pub use user_repo::UserRepository;
