#![allow(dead_code)] // Each test binary uses a different slice of these helpers

pub mod fake_transport;
pub mod strategies;

pub use fake_transport::*;

use chartbatch_core::config::{CoordinatorConfig, JournalConfig};
use chartbatch_core::coordinator::OperationCoordinator;
use chartbatch_core::model::{ItemCategory, ItemPayload, PatientId};
use std::path::PathBuf;
use std::sync::Arc;

/// Coordinator configuration with journal persistence disabled.
pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        journal: JournalConfig {
            persist: false,
            ..JournalConfig::default()
        },
        ..CoordinatorConfig::default()
    }
}

/// Coordinator configuration journaling to the given file.
pub fn test_config_with_journal(path: PathBuf) -> CoordinatorConfig {
    CoordinatorConfig {
        journal: JournalConfig {
            path: Some(path),
            persist: true,
            ..JournalConfig::default()
        },
        ..CoordinatorConfig::default()
    }
}

/// Coordinator wired to the given fake transport, journal in memory.
pub fn test_coordinator(transport: Arc<FakeTransport>) -> OperationCoordinator {
    OperationCoordinator::with_transport(test_config(), transport)
}

/// A routine procedure payload for the given patient.
pub fn procedure(patient: i64, code: &str) -> ItemPayload {
    ItemPayload::new(PatientId(patient), ItemCategory::Procedure, code)
}

/// A combo payload for the given patient.
pub fn combo(patient: i64, code: &str) -> ItemPayload {
    ItemPayload::new(PatientId(patient), ItemCategory::Combo, code)
}
