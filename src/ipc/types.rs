use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::Config;
use crate::scan::{DecoderFeed, DeviceSlot, ScanSession};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The open scanning view plus the handle used to push decoded text into it.
pub struct OpenScan {
    pub session: ScanSession,
    pub feed: DecoderFeed,
}

pub struct AppState {
    pub config: Config,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub device: DeviceSlot,
    pub scan: Option<OpenScan>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            workspace: None,
            db: None,
            device: DeviceSlot::new(),
            scan: None,
        }
    }

    /// Tear down the scan session, if any. The device is released when the session drops.
    pub fn close_scan(&mut self) -> bool {
        match self.scan.take() {
            Some(open) => {
                open.session.close();
                true
            }
            None => false,
        }
    }
}
