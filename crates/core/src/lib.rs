pub mod audit;
pub mod calendar;
pub mod config;
pub mod directory;
pub mod domain;
pub mod errors;
pub mod ledger;
pub mod notify;
pub mod workflow;

pub use audit::{AuditRecord, AuditSink, InMemoryAuditSink};
pub use calendar::{CachedHolidays, FixedHolidayCalendar, HolidayCalendar, WeekendOnlyCalendar};
pub use directory::DirectorySnapshot;
pub use domain::employee::{DepartmentId, EmployeeProfile, GroupId, UserId};
pub use domain::request::{
    ApprovalStep, Request, RequestId, RequestStatus, StepId, StepStatus, VacationSpan,
};
pub use domain::template::{
    ApprovalStepTemplate, ApproverSpec, QuestionId, QuizQuestion, RequestKind, RequestTemplate,
    TemplateId,
};
pub use domain::vacation::{
    LeaveType, ScheduleId, ScheduleStatus, VacationCounters, VacationSchedule, VacationSummary,
};
pub use errors::{EngineError, ErrorKind, FieldError};
pub use ledger::{Availability, LedgerPolicy, VacationLedger};
pub use notify::{
    InMemoryNotificationDispatcher, Notification, NotificationDispatcher, NotificationKind,
};
pub use workflow::{
    build_steps, resolve_approver, validate_batch_size, ApprovalStepMachine, ApproveCommand,
    BulkItemResult, BulkOutcome, CancelCommand, LedgerDirective, MachinePolicy, QuizAnswer,
    QuizOutcome, RejectCommand, RequestRoutingService, ResolveError, ResolvedStep, RoutingIssue,
    SubmissionContext, SubmissionPlan, TransitionOutcome, VacationDates, BULK_APPROVAL_CAP,
};
