//! Access Decision Engine
//!
//! Classifies a scanned identifier against the registry, drives the outputs
//! and records the decision. Runs in the latency-sensitive context and never
//! touches the network: the outward mirror is fed through bounded queues.

use crate::actuation::ActuationController;
use crate::audit_log::AuditTrail;
use crate::config::{LONG_BUZZ_MS, MEDIUM_BUZZ_MS, REJECT_BUZZ_MS, SHORT_BUZZ_MS};
use crate::queue::QueueSender;
use crate::registry::CredentialRegistry;
use chrono::{DateTime, Utc};
use gatehouse_core::effects::TimeEffects;
use gatehouse_core::{
    AuditOutcome, AuditRecord, CredentialSet, Identifier, IdentifierError, Label,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notice that an identifier was newly added to the pending set.
///
/// Mirrored to `/devices/{id}/pending/{identifier}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingNotice {
    /// The newly pending identifier
    #[serde(skip)]
    pub identifier: Identifier,
    /// Label given on insertion
    pub label: Label,
    /// Wall-clock time of the first scan
    pub first_seen: Option<DateTime<Utc>>,
}

/// Result of [`AccessDecisionEngine::handle_scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The scan did not carry a valid identifier; nothing was recorded
    Rejected(IdentifierError),
    /// Member of the allow set
    Granted {
        /// Normalized identifier
        identifier: Identifier,
        /// Registry label
        label: Label,
    },
    /// Member of the deny set
    Denied {
        /// Normalized identifier
        identifier: Identifier,
        /// Registry label
        label: Label,
    },
    /// Unknown or still pending
    Pending {
        /// Normalized identifier
        identifier: Identifier,
        /// Registry label
        label: Label,
        /// Whether this scan inserted the identifier into the pending set
        newly_pending: bool,
    },
}

impl ScanOutcome {
    /// Audit outcome for the decision, `None` for a rejected scan
    pub fn audit_outcome(&self) -> Option<AuditOutcome> {
        match self {
            Self::Rejected(_) => None,
            Self::Granted { .. } => Some(AuditOutcome::Granted),
            Self::Denied { .. } => Some(AuditOutcome::Denied),
            Self::Pending { .. } => Some(AuditOutcome::Pending),
        }
    }

    /// Identifier and label the decision was made about
    pub fn subject(&self) -> Option<(&Identifier, &Label)> {
        match self {
            Self::Rejected(_) => None,
            Self::Granted { identifier, label }
            | Self::Denied { identifier, label }
            | Self::Pending {
                identifier, label, ..
            } => Some((identifier, label)),
        }
    }
}

/// Scan classifier.
pub struct AccessDecisionEngine {
    registry: Arc<CredentialRegistry>,
    audit: AuditTrail,
    pending: QueueSender<PendingNotice>,
    time: Arc<dyn TimeEffects>,
}

impl std::fmt::Debug for AccessDecisionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessDecisionEngine")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl AccessDecisionEngine {
    /// Create an engine over `registry`.
    pub fn new(
        registry: Arc<CredentialRegistry>,
        audit: AuditTrail,
        pending: QueueSender<PendingNotice>,
        time: Arc<dyn TimeEffects>,
    ) -> Self {
        Self {
            registry,
            audit,
            pending,
            time,
        }
    }

    /// Classify one scan and act on it.
    ///
    /// Checks run allow, then deny, then pending; the first match wins.
    pub fn handle_scan(&self, raw: &str, actuation: &mut ActuationController) -> ScanOutcome {
        let identifier = match Identifier::parse(raw) {
            Ok(identifier) => identifier,
            Err(err) => {
                debug!(error = %err, "scan rejected");
                actuation.buzz(REJECT_BUZZ_MS);
                return ScanOutcome::Rejected(err);
            }
        };
        let now = self.time.wall_clock();

        let outcome = if self.registry.contains(CredentialSet::Allow, &identifier) {
            let label = self.registry.label_of(&identifier, CredentialSet::Allow);
            actuation.unlock_default();
            actuation.buzz(SHORT_BUZZ_MS);
            ScanOutcome::Granted { identifier, label }
        } else if self.registry.contains(CredentialSet::Deny, &identifier) {
            let label = self.registry.label_of(&identifier, CredentialSet::Deny);
            actuation.buzz(LONG_BUZZ_MS);
            ScanOutcome::Denied { identifier, label }
        } else {
            let newly_pending = self.mark_pending(&identifier, now);
            let label = self.registry.label_of(&identifier, CredentialSet::Pending);
            actuation.buzz(MEDIUM_BUZZ_MS);
            ScanOutcome::Pending {
                identifier,
                label,
                newly_pending,
            }
        };

        if let (Some((identifier, label)), Some(result)) = (outcome.subject(), outcome.audit_outcome())
        {
            info!(identifier = %identifier, label = %label, outcome = %result, "access decision");
            self.audit
                .record(AuditRecord::credential(identifier, label, result, now));
        }
        outcome
    }

    /// Insert an unknown identifier into the pending set and announce it.
    /// Returns whether a notice was queued.
    fn mark_pending(&self, identifier: &Identifier, now: Option<DateTime<Utc>>) -> bool {
        if self.registry.contains(CredentialSet::Pending, identifier) {
            return false;
        }
        match self
            .registry
            .upsert(CredentialSet::Pending, identifier, Label::unknown(), now)
        {
            Ok(true) => {
                self.pending.push(PendingNotice {
                    identifier: identifier.clone(),
                    label: Label::unknown(),
                    first_seen: now,
                });
                true
            }
            Ok(false) => false,
            Err(err) => {
                warn!(identifier = %identifier, error = %err, "failed to record pending identifier");
                false
            }
        }
    }
}
