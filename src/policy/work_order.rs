//! Work order approver policy
//!
//! The approving official always signs first. Budget mailboxes follow,
//! chosen by expense type and the requesting organization.

use super::{ApproverPolicy, MailboxRole, Mailboxes, OrganizationCodes, PolicyDecision, TieredApprover};
use crate::error::ApiResult;
use crate::step::Identity;
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExpenseType {
    Ba60,
    Ba61,
    Ba80,
}

/// A purchase request evaluated by [`WorkOrderPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrder {
    #[validate(custom(function = "validate_identity"))]
    pub requester: Identity,
    #[validate(custom(function = "validate_identity"))]
    pub approving_official: Identity,
    pub expense_type: ExpenseType,
    /// Organization code, e.g. "P1122021"
    #[validate(length(min = 1, max = 32, message = "Organization code must be 1-32 characters"))]
    pub organization: Option<String>,
    #[serde(default)]
    pub emergency: bool,
}

fn validate_identity(identity: &Identity) -> Result<(), ValidationError> {
    if identity.is_blank() {
        return Err(ValidationError::new("blank_identity"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct WorkOrderPolicy {
    pub mailboxes: Mailboxes,
    pub organizations: OrganizationCodes,
}

impl WorkOrderPolicy {
    pub fn new(mailboxes: Mailboxes, organizations: OrganizationCodes) -> Self {
        Self {
            mailboxes,
            organizations,
        }
    }

    /// Budget approvers required beyond the approving official
    pub fn system_approvers(&self, order: &WorkOrder) -> ApiResult<Vec<TieredApprover>> {
        let organization = order.organization.as_deref();
        let mut approvers = Vec::new();
        match order.expense_type {
            ExpenseType::Ba60 | ExpenseType::Ba61 => {
                if !self.organizations.is_whsc(organization) {
                    let tier1 = self.mailboxes.get(MailboxRole::Ba61Tier1Budget)?;
                    approvers.push(TieredApprover::new(tier1.clone(), 1));
                }
                let tier2 = self.mailboxes.get(MailboxRole::Ba61Tier2Budget)?;
                approvers.push(TieredApprover::new(tier2.clone(), 2));
            }
            ExpenseType::Ba80 => {
                let role = if self.organizations.is_ool(organization) {
                    MailboxRole::OolBa80Budget
                } else {
                    MailboxRole::Ba80Budget
                };
                approvers.push(TieredApprover::new(self.mailboxes.get(role)?.clone(), 1));
            }
        }
        Ok(approvers)
    }
}

impl ApproverPolicy for WorkOrderPolicy {
    type Request = WorkOrder;

    fn decide(&self, order: &WorkOrder) -> ApiResult<PolicyDecision> {
        order.validate()?;

        let mut approvers = vec![TieredApprover::new(order.approving_official.clone(), 0)];
        approvers.extend(self.system_approvers(order)?);

        if order.emergency {
            debug!(expense_type = ?order.expense_type, "Emergency work order, approvers notified only");
            let observers = approvers.into_iter().map(|a| a.identity).collect();
            return Ok(PolicyDecision::bypass(observers));
        }
        Ok(PolicyDecision::approvals(approvers))
    }
}
