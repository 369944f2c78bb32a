//! Resumable debug sessions.
//!
//! A [`Session`] is an immutable snapshot of a run that suspended at a
//! breakpoint. Continuing never mutates the snapshot: each continuation
//! clones the captured machine state and context and returns a new
//! session, so a paused session stays inspectable and can be replayed
//! from the same point any number of times.

use std::sync::Arc;

use crate::interpreter::{self, ExecutionContext, ExecutionControl};
use crate::outcome::{Halt, RunResult};
use crate::parser::CompiledProgram;

/// A suspended (or finished) execution, produced by
/// [`try_run_session`](crate::interpreter::try_run_session).
#[derive(Debug, Clone)]
pub struct Session {
    program: Arc<CompiledProgram>,
    result: RunResult,
    context: ExecutionContext,
}

impl Session {
    pub(crate) fn new(program: CompiledProgram, result: RunResult, context: ExecutionContext) -> Self {
        Self {
            program: Arc::new(program),
            result,
            context,
        }
    }

    /// The current outcome of the session.
    pub fn result(&self) -> &RunResult {
        &self.result
    }

    /// The compiled program this session runs.
    pub fn program(&self) -> &CompiledProgram {
        &self.program
    }

    /// Whether the session can continue: only a run that suspended at a
    /// breakpoint is resumable.
    pub fn can_resume(&self) -> bool {
        matches!(self.result.halt, Halt::BreakpointReached)
    }

    /// Resumes execution up to the next breakpoint or halt.
    ///
    /// # Panics
    ///
    /// Panics if the session is not suspended at a breakpoint; check
    /// [`can_resume`](Self::can_resume) first. That is a caller error,
    /// not a runtime fault.
    pub fn resume(&self) -> Session {
        self.resume_with_control(ExecutionControl::default())
    }

    /// [`resume`](Self::resume) with a cancellation deadline or flag.
    ///
    /// # Panics
    ///
    /// Panics if the session is not suspended at a breakpoint.
    pub fn resume_with_control(&self, control: ExecutionControl) -> Session {
        self.continue_run(control, true)
    }

    /// Resumes execution to halt, ignoring any remaining breakpoints.
    ///
    /// # Panics
    ///
    /// Panics if the session is not suspended at a breakpoint.
    pub fn run_to_completion(&self) -> Session {
        self.run_to_completion_with_control(ExecutionControl::default())
    }

    /// [`run_to_completion`](Self::run_to_completion) with a cancellation
    /// deadline or flag.
    ///
    /// # Panics
    ///
    /// Panics if the session is not suspended at a breakpoint.
    pub fn run_to_completion_with_control(&self, control: ExecutionControl) -> Session {
        self.continue_run(control, false)
    }

    fn continue_run(&self, control: ExecutionControl, honor_breakpoints: bool) -> Session {
        assert!(
            self.can_resume(),
            "session is not suspended at a breakpoint and cannot continue"
        );
        let mut machine = self.result.machine.clone();
        let mut context = self.context.clone();
        context.mark_resumed();
        let halt = interpreter::execute(
            &self.program,
            &mut machine,
            &mut context,
            &control,
            honor_breakpoints,
        );
        let result = RunResult {
            halt,
            stdout: context.stdout().to_string(),
            machine,
        };
        Session {
            program: Arc::clone(&self.program),
            result,
            context,
        }
    }
}
