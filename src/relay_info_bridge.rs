//! Lightweight bridge for reporting session state/traffic to an optional listener.
//!
//! A listener installed with [`RelayInfoBridge::set_listener`] receives one
//! JSON document per report. Without a listener, reports are dropped before
//! they are serialized.

use serde::Serialize;
use std::sync::{Arc, Mutex};

#[derive(Serialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Traffic counters of one session.
pub struct SessionTraffic {
    pub rx_dgrams: u64,
    pub rx_bytes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a relay session.
pub enum SessionState {
    Idle,
    Joining,
    Streaming,
    Closed,
}

#[derive(Serialize)]
/// Discriminator for the type of info carried in RelayInfo.
pub(crate) enum RelayInfoType {
    SessionState,
    SessionTraffic,
}

#[derive(Serialize)]
/// A serializable report about one session.
pub(crate) struct RelayInfo<'a, T>
where
    T: ?Sized + Serialize,
{
    pub info_type: RelayInfoType,
    pub session: &'a str,
    pub data: &'a T,
}

#[derive(Clone, Default)]
/// Posts serialized session info to a user-provided listener, if installed.
pub struct RelayInfoBridge {
    listener: Option<Arc<Mutex<dyn FnMut(&str) + 'static + Send>>>,
}

impl RelayInfoBridge {
    pub fn new() -> Self {
        RelayInfoBridge { listener: None }
    }

    /// Install a listener that will receive JSON-serialized reports.
    pub fn set_listener(&mut self, listener: impl FnMut(&str) + 'static + Send) {
        self.listener = Some(Arc::new(Mutex::new(listener)));
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub(crate) fn post_state(&self, session: &str, state: SessionState) {
        self.post(RelayInfo {
            info_type: RelayInfoType::SessionState,
            session,
            data: &state,
        });
    }

    pub(crate) fn post_traffic(&self, session: &str, traffic: &SessionTraffic) {
        self.post(RelayInfo {
            info_type: RelayInfoType::SessionTraffic,
            session,
            data: traffic,
        });
    }

    fn post<T>(&self, info: RelayInfo<'_, T>)
    where
        T: ?Sized + Serialize,
    {
        if let Some(ref listener) = self.listener {
            if let Ok(json) = serde_json::to_string(&info) {
                // a listener that panicked earlier must not take sessions down
                if let Ok(mut listener) = listener.lock() {
                    listener(json.as_str());
                }
            }
        }
    }
}
