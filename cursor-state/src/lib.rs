/*!
State management for the Cursor identity and update manager: identifier
generation, the `storage.json` config store, the update gate sentinel, and
the operation audit log.
*/

pub mod audit_log;
pub mod config_store;
pub mod error;
pub mod identifiers;
pub mod lock;
pub mod platform;
pub mod update_gate;

pub use audit_log::{AuditLog, OperationRecord};
pub use config_store::{ConfigDocument, ConfigStore};
pub use error::{ErrorKind, StateError, StateResult};
pub use identifiers::{IdentifierGenerator, IdentifierSet};
pub use lock::StoreLock;
pub use platform::{OsFamily, UserIdentity};
pub use update_gate::{GateState, SentinelKind, UpdateGate};
