use std::sync::Arc;

use crate::bus::MessageBus;
use crate::store::SettlementStore;
use crate::winner::WinnerDeterminer;

/// Shared handles for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SettlementStore>,
    pub bus: Arc<dyn MessageBus>,
    pub determiner: Arc<WinnerDeterminer>,
    pub winners_topic: String,
}
