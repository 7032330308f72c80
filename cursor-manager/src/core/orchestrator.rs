/*!
Coordinates identifier regeneration and update-gate changes over the state
stores, and records every mutation in the audit log
*/

use std::path::PathBuf;

use cursor_state::{
    AuditLog, ConfigStore, ErrorKind, GateState, IdentifierGenerator, IdentifierSet,
    OperationRecord, StateError, StateResult, StoreLock, UpdateGate,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::{
    config::{IdentifierSettings, ManagerSettings},
    notifier::{Notification, NotificationManager, Notifier},
    system::{PrivilegeProbe, ProcessTerminator, SystemPrivilege, SystemTerminator},
};

const NOTIFICATION_TITLE: &str = "Cursor Update Control";

/// Outcome of a user-triggered action, ready for display
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<IdentifierSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Set when the action succeeded but its audit entry could not be written
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_error: Option<String>,
}

impl CommandResult {
    fn success(message: String) -> Self {
        Self {
            ok: true,
            message,
            data: None,
            error_kind: None,
            audit_error: None,
        }
    }

    /// Refusal for callers without elevated privileges; nothing was touched
    pub fn privilege_denied() -> Self {
        let err = StateError::Privilege;
        warn!("Refusing to regenerate identifiers: {}", err);
        Self::failure(format!("❌ {}", err), &err)
    }

    fn failure(message: String, err: &StateError) -> Self {
        Self {
            ok: false,
            message,
            data: None,
            error_kind: Some(err.kind()),
            audit_error: None,
        }
    }
}

/// Last known state, reconstructed from the audit log and the sentinel
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub gate_state: GateState,
    pub last_operation: Option<OperationRecord>,
    pub identifier_history: Vec<OperationRecord>,
}

pub struct Orchestrator {
    audit_log: AuditLog,
    config_store: ConfigStore,
    update_gate: UpdateGate,
    lock_path: PathBuf,
    identifiers: IdentifierSettings,
    notifier: Box<dyn Notifier>,
    terminator: Box<dyn ProcessTerminator>,
    privilege: Box<dyn PrivilegeProbe>,
}

impl Orchestrator {
    pub fn new(
        audit_log: AuditLog,
        config_store: ConfigStore,
        update_gate: UpdateGate,
        lock_path: PathBuf,
        identifiers: IdentifierSettings,
    ) -> Self {
        Self {
            audit_log,
            config_store,
            update_gate,
            lock_path,
            identifiers,
            notifier: Box::new(NotificationManager::new(&[])),
            terminator: Box::new(SystemTerminator),
            privilege: Box::new(SystemPrivilege),
        }
    }

    /// Build an orchestrator wired to the real system collaborators
    pub fn from_settings(settings: &ManagerSettings) -> Result<Self, Box<dyn std::error::Error>> {
        let paths = settings.resolve_paths()?;
        info!("📄 Config file: {:?}", paths.config_file);
        info!("🚧 Update sentinel: {:?}", paths.sentinel);
        info!("💾 Audit store: {:?}", paths.audit_db);

        let audit_log = AuditLog::open(&paths.audit_db)?;
        let orchestrator = Self::new(
            audit_log,
            ConfigStore::at(paths.config_file),
            UpdateGate::new(paths.sentinel),
            StoreLock::path_for(&paths.audit_db),
            settings.identifiers.clone(),
        )
        .with_notifier(Box::new(NotificationManager::new(
            &settings.effective_notifications(),
        )));
        Ok(orchestrator)
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_terminator(mut self, terminator: Box<dyn ProcessTerminator>) -> Self {
        self.terminator = terminator;
        self
    }

    pub fn with_privilege_probe(mut self, privilege: Box<dyn PrivilegeProbe>) -> Self {
        self.privilege = privilege;
        self
    }

    /// Draw a fresh identifier set, stop the target application and log the values
    pub fn regenerate_identifiers(&self) -> CommandResult {
        if !self.privilege.is_privileged() {
            return CommandResult::privilege_denied();
        }

        match self.try_regenerate() {
            Ok((ids, audit)) => {
                let persisted = if self.identifiers.persist_identifiers {
                    format!(" and written to {}", self.config_store.path().display())
                } else {
                    String::new()
                };
                let mut result = CommandResult::success(format!("✅ Identifiers regenerated{}", persisted));
                result.data = Some(ids);
                result.audit_error = audit.err().map(|e| e.to_string());
                result
            }
            Err(err) => {
                error!("Identifier regeneration failed: {}", err);
                CommandResult::failure(format!("❌ Identifier regeneration failed: {}", err), &err)
            }
        }
    }

    fn try_regenerate(&self) -> StateResult<(IdentifierSet, StateResult<OperationRecord>)> {
        let _lock = StoreLock::acquire(&self.lock_path)?;
        let ids = IdentifierGenerator::generate()?;

        if self.identifiers.terminate_target {
            if let Err(e) = self.terminator.terminate_target() {
                warn!("Could not terminate the target application: {}", e);
            }
        }

        if self.identifiers.persist_identifiers {
            self.config_store.apply_identifiers(&ids)?;
        }

        let description = format!(
            "ID regenerated: {}, {}, {}, {}",
            ids.machine_id(),
            ids.mac_machine_id(),
            ids.device_id(),
            ids.sqm_id()
        );
        let audit = self.record(&description);
        Ok((ids, audit))
    }

    /// Move the update gate to `target`, then log and announce the change
    pub fn set_update_gate(&self, target: GateState) -> CommandResult {
        let _lock = match StoreLock::acquire(&self.lock_path) {
            Ok(lock) => lock,
            Err(err) => {
                return CommandResult::failure(format!("❌ {}", err), &err);
            }
        };

        if let Err(err) = self.update_gate.transition(target) {
            let observed = self.update_gate.probe();
            error!("Update gate transition to {} failed: {}", target, err);
            return CommandResult::failure(
                format!(
                    "❌ Could not set updates to {}: {} (sentinel is now {:?}; recheck before trusting the gate state)",
                    target, err, observed
                ),
                &err,
            );
        }

        let summary = match target {
            GateState::Blocked => "Updates blocked",
            GateState::Enabled => "Updates enabled",
        };
        let mut result = CommandResult::success(format!("✅ {}", summary));
        result.audit_error = self.record(summary).err().map(|e| e.to_string());

        let notification = Notification {
            title: NOTIFICATION_TITLE.to_string(),
            message: format!("{}.", summary),
        };
        if let Err(e) = self.notifier.notify(&notification) {
            warn!("Notification delivery failed: {}", e);
        }

        result
    }

    pub fn get_status(&self) -> StateResult<Status> {
        Ok(Status {
            gate_state: self.update_gate.state(),
            last_operation: self.audit_log.last()?,
            identifier_history: self.audit_log.identifier_history()?,
        })
    }

    /// Audit failures never undo the action; they are reported alongside it
    fn record(&self, description: &str) -> StateResult<OperationRecord> {
        self.audit_log.append(description).inspect_err(|e| {
            error!("Failed to record operation {:?}: {}", description, e);
        })
    }

    /// Release the audit store handle
    pub fn shutdown(self) -> StateResult<()> {
        info!("🛑 Closing audit store");
        self.audit_log.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cursor_state::SentinelKind;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    struct FixedPrivilege(bool);

    impl PrivilegeProbe for FixedPrivilege {
        fn is_privileged(&self) -> bool {
            self.0
        }
    }

    #[derive(Clone, Default)]
    struct CountingTerminator {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl ProcessTerminator for CountingTerminator {
        fn terminate_target(&self) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(io::Error::new(io::ErrorKind::NotFound, "pkill missing"))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        seen: Arc<Mutex<Vec<Notification>>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn name(&self) -> &'static str {
            "Recording"
        }

        fn notify(&self, notification: &Notification) -> Result<(), Box<dyn std::error::Error>> {
            self.seen.lock().unwrap().push(notification.clone());
            if self.fail {
                return Err("notification daemon unavailable".into());
            }
            Ok(())
        }
    }

    struct Harness {
        dir: TempDir,
        terminator: CountingTerminator,
        notifier: RecordingNotifier,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                terminator: CountingTerminator::default(),
                notifier: RecordingNotifier::default(),
            }
        }

        fn config_path(&self) -> PathBuf {
            self.dir.path().join("Cursor").join("storage.json")
        }

        fn sentinel(&self) -> PathBuf {
            self.dir.path().join("cursor-updater")
        }

        fn orchestrator(&self, privileged: bool, identifiers: IdentifierSettings) -> Orchestrator {
            let db = self.dir.path().join("operations.db");
            Orchestrator::new(
                AuditLog::open(&db).unwrap(),
                ConfigStore::at(self.config_path()),
                UpdateGate::new(self.sentinel()),
                StoreLock::path_for(&db),
                identifiers,
            )
            .with_privilege_probe(Box::new(FixedPrivilege(privileged)))
            .with_terminator(Box::new(self.terminator.clone()))
            .with_notifier(Box::new(self.notifier.clone()))
        }

        fn entries(&self) -> Vec<PathBuf> {
            let mut names: Vec<PathBuf> = std::fs::read_dir(self.dir.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            names.sort();
            names
        }
    }

    fn logged(orchestrator: &Orchestrator) -> usize {
        orchestrator.audit_log.filter(|_| true).unwrap().len()
    }

    #[test]
    fn fresh_environment_status() {
        let h = Harness::new();
        let status = h.orchestrator(true, IdentifierSettings::default()).get_status().unwrap();

        assert_eq!(status.gate_state, GateState::Enabled);
        assert!(status.last_operation.is_none());
        assert!(status.identifier_history.is_empty());
    }

    #[test]
    fn unprivileged_regeneration_mutates_nothing() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(false, IdentifierSettings::default());
        let before = h.entries();

        let result = orchestrator.regenerate_identifiers();

        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::Privilege));
        assert!(result.data.is_none());
        assert_eq!(logged(&orchestrator), 0);
        assert_eq!(h.entries(), before);
        assert_eq!(h.terminator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn regeneration_logs_all_four_values() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());

        let result = orchestrator.regenerate_identifiers();
        assert!(result.ok, "{}", result.message);
        let ids = result.data.unwrap();

        let history = orchestrator.get_status().unwrap().identifier_history;
        assert_eq!(history.len(), 1);
        for value in [ids.machine_id(), ids.mac_machine_id(), ids.device_id(), ids.sqm_id()] {
            assert!(history[0].operation.contains(value));
        }
        assert_eq!(h.terminator.calls.load(Ordering::SeqCst), 1);
        // Config is left alone unless persistence is requested
        assert!(!h.config_path().exists());
    }

    #[test]
    fn termination_failure_is_not_fatal() {
        let mut h = Harness::new();
        h.terminator.fail = true;
        let result = h.orchestrator(true, IdentifierSettings::default()).regenerate_identifiers();
        assert!(result.ok);
    }

    #[test]
    fn regeneration_can_persist_into_config() {
        let h = Harness::new();
        let settings = IdentifierSettings {
            persist_identifiers: true,
            terminate_target: false,
        };
        let result = h.orchestrator(true, settings).regenerate_identifiers();
        let ids = result.data.unwrap();

        let doc = ConfigStore::at(h.config_path()).read().unwrap().unwrap();
        assert_eq!(doc["telemetry.devDeviceId"], ids.device_id());
        assert_eq!(h.terminator.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn malformed_config_aborts_persisting_regeneration() {
        let h = Harness::new();
        let truncated = r#"{"window.zoomLevel": 1, "user.setting": true,"#;
        std::fs::create_dir_all(h.config_path().parent().unwrap()).unwrap();
        std::fs::write(h.config_path(), truncated).unwrap();
        let settings = IdentifierSettings {
            persist_identifiers: true,
            terminate_target: false,
        };
        let orchestrator = h.orchestrator(true, settings);

        let result = orchestrator.regenerate_identifiers();

        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::Decode));
        assert!(result.data.is_none());
        assert_eq!(logged(&orchestrator), 0);
        assert_eq!(std::fs::read_to_string(h.config_path()).unwrap(), truncated);
    }

    #[test]
    fn privilege_denied_result_carries_privilege_kind() {
        let result = CommandResult::privilege_denied();
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::Privilege));
        assert!(result.audit_error.is_none());
    }

    #[test]
    fn gate_block_is_idempotent_and_logged() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());

        for _ in 0..2 {
            let result = orchestrator.set_update_gate(GateState::Blocked);
            assert!(result.ok, "{}", result.message);
            assert_eq!(orchestrator.get_status().unwrap().gate_state, GateState::Blocked);
        }

        let last = orchestrator.get_status().unwrap().last_operation.unwrap();
        assert_eq!(last.operation, "Updates blocked");
        assert_eq!(logged(&orchestrator), 2);
        assert_eq!(h.notifier.seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn enable_after_block_reports_enabled() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());

        assert!(orchestrator.set_update_gate(GateState::Blocked).ok);
        assert!(orchestrator.set_update_gate(GateState::Enabled).ok);

        let status = orchestrator.get_status().unwrap();
        assert_eq!(status.gate_state, GateState::Enabled);
        assert_eq!(status.last_operation.unwrap().operation, "Updates enabled");
        assert_eq!(
            h.notifier.seen.lock().unwrap().last().unwrap().message,
            "Updates enabled."
        );
    }

    #[test]
    fn notification_failure_does_not_fail_transition() {
        let mut h = Harness::new();
        h.notifier.fail = true;
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());

        let result = orchestrator.set_update_gate(GateState::Blocked);
        assert!(result.ok);
        assert_eq!(logged(&orchestrator), 1);
    }

    #[test]
    fn failed_transition_logs_nothing() {
        let h = Harness::new();
        let db = h.dir.path().join("operations.db");
        let blocker = h.dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let orchestrator = Orchestrator::new(
            AuditLog::open(&db).unwrap(),
            ConfigStore::at(h.config_path()),
            UpdateGate::new(blocker.join("cursor-updater")),
            StoreLock::path_for(&db),
            IdentifierSettings::default(),
        )
        .with_notifier(Box::new(h.notifier.clone()));

        let result = orchestrator.set_update_gate(GateState::Enabled);
        assert!(!result.ok);
        assert_eq!(result.error_kind, Some(ErrorKind::Io));
        assert!(result.message.contains(&format!("{:?}", SentinelKind::Absent)));
        assert_eq!(logged(&orchestrator), 0);
        assert!(h.notifier.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn held_store_lock_refuses_mutation() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());
        let _held = StoreLock::acquire(StoreLock::path_for(&h.dir.path().join("operations.db"))).unwrap();

        let gate = orchestrator.set_update_gate(GateState::Blocked);
        assert!(!gate.ok);
        assert_eq!(gate.error_kind, Some(ErrorKind::Io));
        assert!(!h.sentinel().exists());

        let regen = orchestrator.regenerate_identifiers();
        assert!(!regen.ok);
        assert_eq!(logged(&orchestrator), 0);
    }

    #[test]
    fn audit_failure_is_reported_separately() {
        let h = Harness::new();
        let orchestrator = h.orchestrator(true, IdentifierSettings::default());
        rusqlite::Connection::open(h.dir.path().join("operations.db"))
            .unwrap()
            .execute_batch("DROP TABLE operations")
            .unwrap();

        let result = orchestrator.set_update_gate(GateState::Blocked);
        assert!(result.ok);
        assert!(result.audit_error.is_some());
        assert_eq!(orchestrator.update_gate.state(), GateState::Blocked);
    }
}
