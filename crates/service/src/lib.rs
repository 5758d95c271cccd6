//! Device-side exposure-notification service.
//!
//! Tracks a device's exposure-risk state over time by periodically pulling
//! published diagnosis-key batches, handing them to the platform's
//! exposure-matching capability, and deriving a local
//! monitoring / exposed / diagnosed status that drives notifications and
//! the key-submission workflow. The backend client, the matching framework,
//! the persistence providers and the notification presenter are external
//! collaborators, consumed through the traits in [`bridge`] and
//! [`storage`].

use std::sync::Arc;

use crate::bridge::{Backend, ExposureMatcher, NotificationPresenter};
use crate::storage::{KeyValueStore, SecureStore};

pub mod bridge;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod fetcher;
pub mod machine;
pub mod notify;
pub mod service;
pub mod status;
pub mod storage;
pub mod submission;
pub mod utils;

#[cfg(test)]
mod testutil;

pub use crate::service::ExposureService;
pub use crate::status::{ExposureStatus, ExposureSummary};

/// The external collaborators an [`ExposureService`] is built from.
#[derive(Clone)]
pub struct ServiceResources {
    pub matcher: Arc<dyn ExposureMatcher>,
    pub backend: Arc<dyn Backend>,
    pub presenter: Arc<dyn NotificationPresenter>,
    pub store: Arc<dyn KeyValueStore>,
    pub secure_store: Arc<dyn SecureStore>,
}
