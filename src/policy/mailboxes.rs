//! Role mailboxes and organization lists used by approver policies

use crate::error::{ApiResult, AppError};
use crate::step::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// System approver roles backed by a shared mailbox
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailboxRole {
    Ba61Tier1Budget,
    Ba61Tier2Budget,
    Ba80Budget,
    OolBa80Budget,
}

impl MailboxRole {
    pub const ALL: [MailboxRole; 4] = [
        MailboxRole::Ba61Tier1Budget,
        MailboxRole::Ba61Tier2Budget,
        MailboxRole::Ba80Budget,
        MailboxRole::OolBa80Budget,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MailboxRole::Ba61Tier1Budget => "BA61_tier1_budget_approver",
            MailboxRole::Ba61Tier2Budget => "BA61_tier2_budget_approver",
            MailboxRole::Ba80Budget => "BA80_budget_approver",
            MailboxRole::OolBa80Budget => "OOL_BA80_budget_approver",
        }
    }

    /// Environment variable holding the mailbox address
    pub fn env_var(self) -> &'static str {
        match self {
            MailboxRole::Ba61Tier1Budget => "MAILBOX_BA61_TIER1_BUDGET",
            MailboxRole::Ba61Tier2Budget => "MAILBOX_BA61_TIER2_BUDGET",
            MailboxRole::Ba80Budget => "MAILBOX_BA80_BUDGET",
            MailboxRole::OolBa80Budget => "MAILBOX_OOL_BA80_BUDGET",
        }
    }
}

impl fmt::Display for MailboxRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mailboxes {
    entries: BTreeMap<MailboxRole, Identity>,
}

impl Mailboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, role: MailboxRole, identity: impl Into<Identity>) -> Self {
        self.set(role, identity);
        self
    }

    pub fn set(&mut self, role: MailboxRole, identity: impl Into<Identity>) {
        self.entries.insert(role, identity.into());
    }

    /// Mailbox for a role; a missing or blank entry is a configuration error
    pub fn get(&self, role: MailboxRole) -> ApiResult<&Identity> {
        self.entries
            .get(&role)
            .filter(|identity| !identity.is_blank())
            .ok_or_else(|| AppError::Config(format!("Missing approver for role {}", role)))
    }
}

/// Organization codes that change which mailboxes apply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCodes {
    pub whsc: Vec<String>,
    pub ool: Vec<String>,
}

impl OrganizationCodes {
    pub fn is_whsc(&self, code: Option<&str>) -> bool {
        contains(&self.whsc, code)
    }

    pub fn is_ool(&self, code: Option<&str>) -> bool {
        contains(&self.ool, code)
    }
}

fn contains(codes: &[String], code: Option<&str>) -> bool {
    match code.map(str::trim) {
        Some(code) if !code.is_empty() => codes.iter().any(|c| c.eq_ignore_ascii_case(code)),
        _ => false,
    }
}
