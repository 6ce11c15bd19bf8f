//! Profile assignments
//!
//! A subject holds any number of profile assignments and exactly one of them
//! is its default. The default flag only moves through
//! [`ProfileAssignments::set_default_assignment`], which clears every other
//! default of the subject before setting the new one.

use crate::{Error, Result};
use chrono::Utc;
use freight_core::{
    AuditAction, AuditEntry, AuditSink, EntityType, OrgContext, PaySubject, ProfileAssignment,
    RateProfile, Storage,
};
use std::sync::Arc;
use uuid::Uuid;

/// Assignment management
#[derive(Clone)]
pub struct ProfileAssignments {
    storage: Arc<Storage>,
    audit: Arc<dyn AuditSink>,
}

impl ProfileAssignments {
    /// Create service
    pub fn new(storage: Arc<Storage>, audit: Arc<dyn AuditSink>) -> Self {
        Self { storage, audit }
    }

    /// Assignments of a subject, oldest first
    pub fn list(&self, ctx: &OrgContext, subject: PaySubject) -> Result<Vec<ProfileAssignment>> {
        Ok(self.storage.assignments_for(ctx.org_id, subject)?)
    }

    /// Assign a profile to a subject.
    ///
    /// The subject's first assignment always becomes its default. Assigning
    /// an already-assigned profile returns the existing assignment.
    pub fn assign_profile(
        &self,
        ctx: &OrgContext,
        subject: PaySubject,
        profile_id: Uuid,
        make_default: bool,
    ) -> Result<ProfileAssignment> {
        let profile: RateProfile = self.storage.fetch(profile_id)?;
        ctx.ensure_org("RateProfile", profile.org_id)?;
        if profile.profile_type != subject.kind().profile_type() {
            return Err(Error::ProfileMismatch {
                profile_id,
                subject,
            });
        }

        let existing = self.storage.assignments_for(ctx.org_id, subject)?;
        if let Some(assignment) = existing.iter().find(|a| a.profile_id == profile_id) {
            if make_default && !assignment.is_default {
                return self.set_default_assignment(ctx, assignment.id);
            }
            return Ok(assignment.clone());
        }

        let assignment = ProfileAssignment {
            id: Uuid::now_v7(),
            org_id: ctx.org_id,
            subject,
            profile_id,
            is_default: false,
            created_at: Utc::now(),
        };
        self.storage.put(&assignment)?;

        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::ProfileAssignment,
            assignment.id,
            AuditAction::Create,
            format!("Profile {} assigned to {}", profile.name, subject),
        ));

        if make_default || !existing.iter().any(|a| a.is_default) {
            return self.set_default_assignment(ctx, assignment.id);
        }
        Ok(assignment)
    }

    /// Make `assignment_id` the subject's only default
    pub fn set_default_assignment(
        &self,
        ctx: &OrgContext,
        assignment_id: Uuid,
    ) -> Result<ProfileAssignment> {
        let target: ProfileAssignment = self.storage.fetch(assignment_id)?;
        ctx.ensure_org("ProfileAssignment", target.org_id)?;

        // Clear first: a crash in between leaves no default, never two
        for other in self.storage.assignments_for(ctx.org_id, target.subject)? {
            if other.id == assignment_id || !other.is_default {
                continue;
            }
            self.storage.update_if(other.id, |a: &mut ProfileAssignment| {
                let was_default = a.is_default;
                a.is_default = false;
                was_default
            })?;
        }

        let updated = self.storage.update(assignment_id, |a: &mut ProfileAssignment| {
            a.is_default = true;
        })?;

        tracing::info!(
            subject = %updated.subject,
            assignment_id = %assignment_id,
            "Default profile assignment set"
        );
        self.audit.log_action(
            AuditEntry::new(
                ctx,
                EntityType::ProfileAssignment,
                assignment_id,
                AuditAction::Update,
                "Set as default",
            )
            .with_changed_fields(["is_default"]),
        );

        Ok(updated)
    }

    /// Remove an assignment; removing the default promotes the oldest remaining one
    pub fn remove_assignment(&self, ctx: &OrgContext, assignment_id: Uuid) -> Result<()> {
        let assignment: ProfileAssignment = self.storage.fetch(assignment_id)?;
        ctx.ensure_org("ProfileAssignment", assignment.org_id)?;

        self.storage.delete::<ProfileAssignment>(assignment_id)?;
        self.audit.log_action(AuditEntry::new(
            ctx,
            EntityType::ProfileAssignment,
            assignment_id,
            AuditAction::Delete,
            format!("Assignment removed from {}", assignment.subject),
        ));

        if assignment.is_default {
            let remaining = self.storage.assignments_for(ctx.org_id, assignment.subject)?;
            if let Some(next) = remaining.first() {
                self.set_default_assignment(ctx, next.id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freight_core::audit::MemoryAuditSink;
    use freight_core::ProfileType;

    fn setup() -> (Arc<Storage>, ProfileAssignments, OrgContext) {
        let storage = Arc::new(Storage::in_memory());
        let service = ProfileAssignments::new(storage.clone(), Arc::new(MemoryAuditSink::new()));
        let ctx = OrgContext::new(Uuid::now_v7(), Uuid::now_v7());
        (storage, service, ctx)
    }

    fn profile(storage: &Storage, ctx: &OrgContext, name: &str) -> RateProfile {
        let profile = RateProfile::new(ctx.org_id, name, ProfileType::Driver);
        storage.put(&profile).unwrap();
        profile
    }

    fn defaults(service: &ProfileAssignments, ctx: &OrgContext, subject: PaySubject) -> Vec<Uuid> {
        service
            .list(ctx, subject)
            .unwrap()
            .into_iter()
            .filter(|a| a.is_default)
            .map(|a| a.profile_id)
            .collect()
    }

    #[test]
    fn test_exactly_one_default() {
        let (storage, service, ctx) = setup();
        let subject = PaySubject::Driver(Uuid::now_v7());
        let short = profile(&storage, &ctx, "Short haul");
        let long = profile(&storage, &ctx, "Long haul");

        service.assign_profile(&ctx, subject, short.id, false).unwrap();
        assert_eq!(defaults(&service, &ctx, subject), vec![short.id]);

        service.assign_profile(&ctx, subject, long.id, false).unwrap();
        assert_eq!(defaults(&service, &ctx, subject), vec![short.id]);

        service.assign_profile(&ctx, subject, long.id, true).unwrap();
        assert_eq!(defaults(&service, &ctx, subject), vec![long.id]);
        assert_eq!(service.list(&ctx, subject).unwrap().len(), 2);
    }

    #[test]
    fn test_removing_default_promotes_remaining() {
        let (storage, service, ctx) = setup();
        let subject = PaySubject::Driver(Uuid::now_v7());
        let a = profile(&storage, &ctx, "A");
        let b = profile(&storage, &ctx, "B");

        let first = service.assign_profile(&ctx, subject, a.id, false).unwrap();
        service.assign_profile(&ctx, subject, b.id, false).unwrap();

        service.remove_assignment(&ctx, first.id).unwrap();
        assert_eq!(defaults(&service, &ctx, subject), vec![b.id]);
    }

    #[test]
    fn test_profile_type_must_match_subject() {
        let (storage, service, ctx) = setup();
        let driver_profile = profile(&storage, &ctx, "Drivers");
        let err = service
            .assign_profile(&ctx, PaySubject::Carrier(Uuid::now_v7()), driver_profile.id, true)
            .unwrap_err();
        assert!(matches!(err, Error::ProfileMismatch { .. }));
    }
}
