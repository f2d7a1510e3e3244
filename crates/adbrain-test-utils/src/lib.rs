//! Mocks and fixtures shared by the AdBrain test suites.

mod archive;
mod fixtures;
mod providers;

pub use archive::{FailingArchive, MemoryArchive};
pub use fixtures::{campaign_params, creative_payload, creative_payload_text, CallCounter};
pub use providers::{RoutedProvider, ScriptedProvider, SlowProvider, StaticProvider};
