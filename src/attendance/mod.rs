pub mod debounce;
pub mod error;
pub mod recorder;

pub use debounce::{ScanDebouncer, DEFAULT_SCAN_COOLDOWN};
pub use error::RecordError;
pub use recorder::{
    apply_status, plan_transition, record_scan, resolve_code, PersistenceSink, Recorded,
    RosterProvider, Transition,
};
