use chrono::{Datelike, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calendar::HolidayCalendar;
use crate::domain::request::Request;
use crate::domain::vacation::{
    LeaveType, ScheduleId, ScheduleStatus, VacationCounters, VacationSchedule, VacationSummary,
};
use crate::errors::EngineError;

/// Statutory and policy caps applied by the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerPolicy {
    /// Annual cap on on-demand leave days.
    pub on_demand_cap: u32,
    /// Per-event cap on circumstantial leave days.
    pub circumstantial_event_cap: u32,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self { on_demand_cap: 4, circumstantial_event_cap: 2 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub can_take: bool,
    pub reason: Option<String>,
}

impl Availability {
    fn ok() -> Self {
        Self { can_take: true, reason: None }
    }

    fn denied(reason: impl Into<String>) -> Self {
        Self { can_take: false, reason: Some(reason.into()) }
    }
}

/// Pure accounting over per-user vacation counters. Invoked by the approval
/// service on final approval of vacation requests and by summary reads; it
/// never persists anything itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct VacationLedger {
    policy: LedgerPolicy,
}

impl VacationLedger {
    pub fn new(policy: LedgerPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LedgerPolicy {
        self.policy
    }

    /// Business days in `[start, end]` inclusive: weekdays the holiday
    /// calendar does not veto. Returns a Validation error for inverted spans.
    pub fn business_days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        calendar: &dyn HolidayCalendar,
    ) -> Result<u32, EngineError> {
        if start > end {
            return Err(EngineError::validation(
                "end_date",
                "end date must not be before start date",
            ));
        }

        let mut days = 0;
        let mut current = start;
        while current <= end {
            let weekday = current.weekday();
            let weekend = weekday == Weekday::Sat || weekday == Weekday::Sun;
            if !weekend && calendar.is_business_day(current) {
                days += 1;
            }
            current = match current.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        Ok(days)
    }

    pub fn validate_availability(
        &self,
        counters: &VacationCounters,
        leave_type: LeaveType,
        days: u32,
        as_of: NaiveDate,
    ) -> Availability {
        match leave_type {
            LeaveType::Standard => self.check_standard(counters, days, as_of),
            LeaveType::OnDemand => {
                let remaining =
                    i64::from(self.policy.on_demand_cap) - counters.on_demand_used;
                if i64::from(days) > remaining {
                    return Availability::denied(format!(
                        "on-demand leave cap of {} days per year exceeded: requested {}, remaining {}",
                        self.policy.on_demand_cap,
                        days,
                        remaining.max(0)
                    ));
                }
                self.check_standard(counters, days, as_of)
            }
            LeaveType::Circumstantial => {
                if days > self.policy.circumstantial_event_cap {
                    return Availability::denied(format!(
                        "circumstantial leave is capped at {} days per event, requested {}",
                        self.policy.circumstantial_event_cap, days
                    ));
                }
                Availability::ok()
            }
        }
    }

    fn check_standard(
        &self,
        counters: &VacationCounters,
        days: u32,
        as_of: NaiveDate,
    ) -> Availability {
        let available = i64::from(counters.annual_entitlement)
            + i64::from(counters.effective_carried_over(as_of))
            - counters.used;
        let requested = i64::from(days);
        if requested > available {
            let short = requested - available.max(0);
            return Availability::denied(format!(
                "insufficient vacation balance: requested {requested}, available {} (short by {short})",
                available.max(0)
            ));
        }
        Availability::ok()
    }

    /// Apply an approved vacation request to the counters and produce its
    /// schedule. Availability is re-checked here: the balance may have been
    /// consumed by other approvals since submission, and a successful commit
    /// must leave `used` within the entitlement pool. The caller persists
    /// counters and schedule in the same transaction that marks the request
    /// approved; the step machine's terminal-state check is what prevents a
    /// second commit for the same request.
    pub fn commit(
        &self,
        counters: &mut VacationCounters,
        request: &Request,
    ) -> Result<VacationSchedule, EngineError> {
        let span = request.vacation.as_ref().ok_or_else(|| {
            EngineError::InvalidState(format!(
                "request {} has no vacation span to commit",
                request.id.0
            ))
        })?;

        let availability = self.validate_availability(
            counters,
            span.leave_type,
            span.days_count,
            span.start_date,
        );
        if !availability.can_take {
            return Err(EngineError::Business(
                availability.reason.unwrap_or_else(|| "vacation balance exhausted".to_string()),
            ));
        }

        let days = i64::from(span.days_count);
        match span.leave_type {
            LeaveType::Standard => counters.used += days,
            LeaveType::OnDemand => {
                counters.used += days;
                counters.on_demand_used += days;
            }
            LeaveType::Circumstantial => counters.circumstantial_used += days,
        }

        Ok(VacationSchedule {
            id: ScheduleId(Uuid::new_v4().to_string()),
            request_id: request.id.clone(),
            user_id: request.submitted_by.clone(),
            leave_type: span.leave_type,
            start_date: span.start_date,
            end_date: span.end_date,
            days_count: span.days_count,
            status: ScheduleStatus::Active,
            created_at: Utc::now(),
        })
    }

    /// Undo a prior commit when an approved vacation is cancelled. Fails
    /// `InvalidState` when the schedule was never committed or already
    /// reverted.
    pub fn revert(
        &self,
        counters: &mut VacationCounters,
        schedule: &mut VacationSchedule,
    ) -> Result<(), EngineError> {
        if schedule.status != ScheduleStatus::Active {
            return Err(EngineError::InvalidState(format!(
                "vacation schedule {} is not active and cannot be reverted",
                schedule.id.0
            )));
        }

        let days = i64::from(schedule.days_count);
        match schedule.leave_type {
            LeaveType::Standard => counters.used -= days,
            LeaveType::OnDemand => {
                counters.used -= days;
                counters.on_demand_used -= days;
            }
            LeaveType::Circumstantial => counters.circumstantial_used -= days,
        }
        schedule.status = ScheduleStatus::Cancelled;
        Ok(())
    }

    /// Audited correction path. The only caller allowed to push counters
    /// negative; the normal approval path never reaches this.
    pub fn admin_adjust(&self, counters: &mut VacationCounters, delta_days: i64) {
        counters.used += delta_days;
    }

    /// Build the display summary. Active schedules are the source of truth
    /// for usage; the stored counter is a projection and any drift between
    /// the two is reported rather than silently reconciled.
    pub fn summary(
        &self,
        counters: &VacationCounters,
        schedules: &[VacationSchedule],
        as_of: NaiveDate,
    ) -> VacationSummary {
        let derived_used: i64 = schedules
            .iter()
            .filter(|schedule| schedule.status == ScheduleStatus::Active)
            .filter(|schedule| {
                matches!(schedule.leave_type, LeaveType::Standard | LeaveType::OnDemand)
            })
            .map(|schedule| i64::from(schedule.days_count))
            .sum();
        let derived_on_demand: i64 = schedules
            .iter()
            .filter(|schedule| schedule.status == ScheduleStatus::Active)
            .filter(|schedule| schedule.leave_type == LeaveType::OnDemand)
            .map(|schedule| i64::from(schedule.days_count))
            .sum();

        let drift = counters.used - derived_used;
        if drift != 0 {
            tracing::warn!(
                event_name = "ledger.counter_drift",
                user_id = %counters.user_id.0,
                counter_used = counters.used,
                schedule_used = derived_used,
                "vacation counter diverges from schedule-derived total"
            );
        }

        let entitlement = counters.annual_entitlement;
        let carried_over = counters.effective_carried_over(as_of);
        let remaining =
            (i64::from(entitlement) + i64::from(carried_over) - derived_used).max(0) as u32;
        let on_demand_remaining =
            (i64::from(self.policy.on_demand_cap) - derived_on_demand).max(0) as u32;

        VacationSummary {
            user_id: counters.user_id.clone(),
            entitlement,
            used: derived_used.max(0) as u32,
            remaining,
            on_demand_used: derived_on_demand.max(0) as u32,
            on_demand_remaining,
            carried_over,
            carried_over_expiry: counters.carried_over_expiry,
            counter_drift: drift,
        }
    }
}
