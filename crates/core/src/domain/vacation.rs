use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::employee::UserId;
use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    Standard,
    OnDemand,
    Circumstantial,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::OnDemand => "on_demand",
            Self::Circumstantial => "circumstantial",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "on_demand" => Some(Self::OnDemand),
            "circumstantial" => Some(Self::Circumstantial),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A committed vacation span, created 1:1 with an approved vacation request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationSchedule {
    pub id: ScheduleId,
    pub request_id: RequestId,
    pub user_id: UserId,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_count: u32,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
}

/// Per-user day balances. Mutated only by the ledger and the audited admin
/// adjustment path, never by request CRUD. Usage counters are signed: the
/// approval path keeps them non-negative, admin corrections may transiently
/// drive them below zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationCounters {
    pub user_id: UserId,
    pub annual_entitlement: u32,
    pub used: i64,
    pub on_demand_used: i64,
    pub circumstantial_used: i64,
    pub carried_over: u32,
    pub carried_over_expiry: Option<NaiveDate>,
}

impl VacationCounters {
    pub fn new(user_id: UserId, annual_entitlement: u32) -> Self {
        Self {
            user_id,
            annual_entitlement,
            used: 0,
            on_demand_used: 0,
            circumstantial_used: 0,
            carried_over: 0,
            carried_over_expiry: None,
        }
    }

    /// Carried-over days still drawable on `as_of`.
    pub fn effective_carried_over(&self, as_of: NaiveDate) -> u32 {
        match self.carried_over_expiry {
            Some(expiry) if as_of > expiry => 0,
            _ => self.carried_over,
        }
    }
}

/// Read model returned by summary queries. Remaining values are clamped at
/// zero for display even when admin corrections drove a counter negative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VacationSummary {
    pub user_id: UserId,
    pub entitlement: u32,
    pub used: u32,
    pub remaining: u32,
    pub on_demand_used: u32,
    pub on_demand_remaining: u32,
    pub carried_over: u32,
    pub carried_over_expiry: Option<NaiveDate>,
    /// Stored counter minus the schedule-derived total. Zero unless the
    /// projection has drifted; schedules are authoritative.
    pub counter_drift: i64,
}
