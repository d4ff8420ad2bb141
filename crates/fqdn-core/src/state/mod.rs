//! Durable state stores: domain statuses and provider credentials

pub mod credentials;
pub mod domains;

pub use credentials::{Credential, CredentialStore, mask_username};
pub use domains::{DomainRecord, DomainStatus, DomainStore};
