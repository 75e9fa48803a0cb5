//! Telemetry de-duplication
//!
//! Decryption and verification metrics are emitted at most once per
//! (node UID, kind) pair per process lifetime. The sets grow monotonically
//! and are scoped to the service instance, not the process: multiple client
//! instances stay isolated.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use velum_core::effects::telemetry::{MetricEvent, MetricField, Telemetry};

#[derive(Default)]
pub(crate) struct ReportedErrors {
    decryption: Mutex<HashSet<String>>,
    verification: Mutex<HashSet<String>>,
}

impl ReportedErrors {
    /// Emit a decryption-error metric unless one was already emitted for
    /// this UID.
    pub(crate) fn report_decryption(
        &self,
        telemetry: &Arc<dyn Telemetry>,
        uid: &str,
        field: MetricField,
    ) {
        if self.decryption.lock().insert(uid.to_owned()) {
            telemetry.record(MetricEvent::DecryptionError {
                uid: uid.to_owned(),
                field,
            });
        }
    }

    /// Emit a verification-error metric unless one was already emitted for
    /// this UID.
    pub(crate) fn report_verification(
        &self,
        telemetry: &Arc<dyn Telemetry>,
        uid: &str,
        field: MetricField,
    ) {
        if self.verification.lock().insert(uid.to_owned()) {
            telemetry.record(MetricEvent::VerificationError {
                uid: uid.to_owned(),
                field,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velum_core::memory::MemoryTelemetry;

    #[test]
    fn each_kind_reports_once_per_uid() {
        let sink = Arc::new(MemoryTelemetry::new());
        let telemetry: Arc<dyn Telemetry> = sink.clone();
        let reported = ReportedErrors::default();

        reported.report_decryption(&telemetry, "v~n", MetricField::NodeKey);
        reported.report_decryption(&telemetry, "v~n", MetricField::Name);
        reported.report_verification(&telemetry, "v~n", MetricField::NodeKey);
        reported.report_decryption(&telemetry, "v~other", MetricField::NodeKey);

        let events = sink.events();
        assert_eq!(events.len(), 3);
    }
}
