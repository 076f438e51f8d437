//! Process lifecycle: fatal error budget, shutdown and uncaught failures

pub mod fatal_tracker;
pub mod handlers;
pub mod shutdown;

pub use fatal_tracker::{FatalDecision, FatalErrorTracker, FatalSnapshot};
pub use handlers::{
    install_panic_hook, FailureKind, FatalReporter, GlobalExceptionHandlers, HandlerOptions,
    UncaughtFailure,
};
pub use shutdown::{
    ExitProcess, HookReport, HookResult, ProcessTerminator, ShutdownCoordinator, ShutdownError,
    ShutdownOutcome, ShutdownReason, ShutdownState,
};
