//! Shutdown Coordinator
//!
//! Owns the shutdown hook registry and the one-shot termination sequence:
//! - hooks run in registration order, each bounded by its own timeout
//! - outcomes are written straight to the console sink, since the primary
//!   sinks may be what is failing
//! - the process is then terminated with a non-zero status
//!
//! `initiate` is idempotent: only the first call runs the sequence. The
//! registry is append-only until that call and frozen afterwards.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use logshield_domain::{LogEntry, LogSink, Severity};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

/// Reason for shutdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The consecutive fatal error budget was exhausted
    FatalBudgetExhausted { consecutive: u32 },
    /// SIGINT signal received (Ctrl+C)
    SigInt,
    /// SIGTERM signal received
    SigTerm,
    /// programmatic shutdown
    Programmatic(String),
}

impl ShutdownReason {
    /// Process exit status for this reason; always non-zero
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::FatalBudgetExhausted { .. } => 1,
            ShutdownReason::SigInt => 130,
            ShutdownReason::SigTerm => 143,
            ShutdownReason::Programmatic(_) => 1,
        }
    }
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::FatalBudgetExhausted { consecutive } => {
                write!(f, "Fatal error budget exhausted after {} consecutive errors", consecutive)
            }
            ShutdownReason::SigInt => write!(f, "SIGINT (Ctrl+C)"),
            ShutdownReason::SigTerm => write!(f, "SIGTERM"),
            ShutdownReason::Programmatic(reason) => write!(f, "Programmatic: {}", reason),
        }
    }
}

/// Shutdown state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownState {
    /// Normal running state
    Running,
    /// Shutdown initiated; hooks are running
    ShuttingDown(ShutdownReason),
    /// Hooks finished; termination requested
    Completed,
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Shutdown already started; hook '{name}' rejected")]
    AlreadyShuttingDown { name: String },
}

pub type HookFuture = BoxFuture<'static, anyhow::Result<()>>;

struct ShutdownHook {
    name: String,
    timeout: Duration,
    callback: Box<dyn FnOnce() -> HookFuture + Send>,
}

#[derive(Default)]
struct HookRegistry {
    hooks: Vec<ShutdownHook>,
    frozen: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookResult {
    Completed,
    Failed(String),
    TimedOut,
    Panicked,
}

#[derive(Debug, Clone)]
pub struct HookReport {
    pub name: String,
    pub result: HookResult,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub enum ShutdownOutcome {
    /// This call ran the sequence
    Executed {
        reason: ShutdownReason,
        hooks: Vec<HookReport>,
        exit_code: i32,
    },
    /// Another call already did; nothing was run
    AlreadyInitiated,
}

/// Ends the process once shutdown completes.
pub trait ProcessTerminator: Send + Sync {
    fn terminate(&self, exit_code: i32);
}

/// Production terminator: `std::process::exit`
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitProcess;

impl ProcessTerminator for ExitProcess {
    fn terminate(&self, exit_code: i32) {
        std::process::exit(exit_code);
    }
}

pub struct ShutdownCoordinator {
    registry: Mutex<HookRegistry>,
    started: AtomicBool,
    state_tx: watch::Sender<ShutdownState>,
    console: Arc<dyn LogSink>,
    terminator: Arc<dyn ProcessTerminator>,
}

impl ShutdownCoordinator {
    pub fn new(console: Arc<dyn LogSink>, terminator: Arc<dyn ProcessTerminator>) -> Self {
        let (state_tx, _) = watch::channel(ShutdownState::Running);
        Self {
            registry: Mutex::new(HookRegistry::default()),
            started: AtomicBool::new(false),
            state_tx,
            console,
            terminator,
        }
    }

    fn registry(&self) -> MutexGuard<'_, HookRegistry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append a hook; rejected once shutdown has started
    pub fn register_shutdown_hook<F, Fut>(
        &self,
        name: impl Into<String>,
        timeout: Duration,
        hook: F,
    ) -> Result<(), ShutdownError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let name = name.into();
        let mut registry = self.registry();
        if registry.frozen {
            warn!(hook = %name, "Shutdown hook rejected: shutdown already started");
            return Err(ShutdownError::AlreadyShuttingDown { name });
        }

        registry.hooks.push(ShutdownHook {
            name,
            timeout,
            callback: Box::new(move || hook().boxed()),
        });
        Ok(())
    }

    pub fn hook_count(&self) -> usize {
        self.registry().hooks.len()
    }

    pub fn subscribe(&self) -> watch::Receiver<ShutdownState> {
        self.state_tx.subscribe()
    }

    /// Get current state
    pub fn state(&self) -> ShutdownState {
        self.state_tx.borrow().clone()
    }

    /// Check if shutdown has been initiated
    pub fn is_shutting_down(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Run every hook once, then terminate the process.
    pub async fn initiate(&self, reason: ShutdownReason) -> ShutdownOutcome {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!(reason = %reason, "Shutdown already in progress");
            return ShutdownOutcome::AlreadyInitiated;
        }

        self.state_tx
            .send_replace(ShutdownState::ShuttingDown(reason.clone()));

        let hooks = {
            let mut registry = self.registry();
            registry.frozen = true;
            std::mem::take(&mut registry.hooks)
        };

        error!(reason = %reason, hooks = hooks.len(), "Initiating shutdown");
        self.console_line(
            Severity::Fatal,
            format!("Initiating shutdown ({}); running {} hook(s)", reason, hooks.len()),
        )
        .await;

        let mut reports = Vec::with_capacity(hooks.len());
        for hook in hooks {
            let report = self.run_hook(hook).await;
            reports.push(report);
        }

        let exit_code = reason.exit_code();
        self.console_line(
            Severity::Fatal,
            format!("Shutdown complete; exiting with status {}", exit_code),
        )
        .await;
        let _ = self.console.flush().await;

        self.state_tx.send_replace(ShutdownState::Completed);
        self.terminator.terminate(exit_code);

        ShutdownOutcome::Executed {
            reason,
            hooks: reports,
            exit_code,
        }
    }

    async fn run_hook(&self, hook: ShutdownHook) -> HookReport {
        let ShutdownHook {
            name,
            timeout: limit,
            callback,
        } = hook;
        let started = Instant::now();

        let result = match timeout(limit, AssertUnwindSafe(callback()).catch_unwind()).await {
            Ok(Ok(Ok(()))) => HookResult::Completed,
            Ok(Ok(Err(e))) => HookResult::Failed(e.to_string()),
            Ok(Err(_)) => HookResult::Panicked,
            Err(_) => HookResult::TimedOut,
        };
        let elapsed = started.elapsed();

        let (level, line) = match &result {
            HookResult::Completed => (
                Severity::Info,
                format!("Shutdown hook '{}' completed in {:?}", name, elapsed),
            ),
            HookResult::Failed(e) => (
                Severity::Error,
                format!("Shutdown hook '{}' failed: {}", name, e),
            ),
            HookResult::TimedOut => (
                Severity::Error,
                format!("Shutdown hook '{}' timed out after {:?}", name, limit),
            ),
            HookResult::Panicked => (
                Severity::Error,
                format!("Shutdown hook '{}' panicked", name),
            ),
        };
        self.console_line(level, line).await;

        HookReport {
            name,
            result,
            elapsed,
        }
    }

    async fn console_line(&self, level: Severity, message: String) {
        // Nothing left to fall back to if the console itself fails
        let _ = self.console.write(&LogEntry::lifecycle(level, message)).await;
    }
}
