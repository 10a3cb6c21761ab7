pub mod bulk;
pub mod machine;
pub mod quiz;
pub mod resolver;
pub mod routing;

pub use bulk::{validate_batch_size, BulkItemResult, BulkOutcome, BULK_APPROVAL_CAP};
pub use machine::{
    ApprovalStepMachine, ApproveCommand, CancelCommand, LedgerDirective, MachinePolicy,
    RejectCommand, TransitionOutcome,
};
pub use quiz::{QuizAnswer, QuizOutcome};
pub use resolver::{resolve_approver, ResolveError};
pub use routing::{
    build_steps, RequestRoutingService, ResolvedStep, RoutingIssue, SubmissionContext,
    SubmissionPlan, VacationDates,
};
