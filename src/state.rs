use std::sync::Arc;

use crate::config::AppConfig;
use crate::services::calendar::CalendarBackend;
use crate::services::clock::Clock;
use crate::services::conversation::DialogueEngine;
use crate::services::scheduling::BookingLimits;

pub struct AppState {
    pub config: AppConfig,
    pub engine: DialogueEngine,
}

impl AppState {
    pub fn new(config: AppConfig, engine: DialogueEngine) -> Arc<Self> {
        Arc::new(Self { config, engine })
    }

    pub fn calendar(&self) -> &Arc<dyn CalendarBackend> {
        self.engine.calendar()
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        self.engine.clock()
    }

    pub fn limits(&self) -> &BookingLimits {
        self.engine.limits()
    }
}
