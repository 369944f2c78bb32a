//! The execution engine.
//!
//! An iterative VM: it consumes a [`CompiledProgram`] one operator at a
//! time, mutates the [`MachineState`], buffers stdin/stdout, and keeps an
//! explicit bounded frame stack for PBrain function calls — no host
//! recursion, so the 512-frame limit and the trace shape are exact.
//!
//! Expected failures never escape as panics: they halt the run and are
//! reported inside the returned [`RunResult`]. The engine is a pure
//! function of (program, stdin, initial state, configuration); nothing is
//! shared between runs.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::machine::{DEFAULT_MEMORY_SIZE, MachineState, OverflowMode};
use crate::opcode::Operator;
use crate::outcome::{ExceptionInfo, Fault, Halt, RunResult, STACK_LIMIT, STDOUT_LIMIT};
use crate::parser::{self, CompiledProgram, SyntaxError};
use crate::session::Session;

/// How many operators run between deadline checks. The cancellation flag
/// itself is polled before every operator.
const DEADLINE_CHECK_INTERVAL: u64 = 64;

/// Cooperative cancellation for a run: a wall-clock deadline, an
/// externally settable flag, or both. Polled at operator granularity;
/// once either trips, the engine halts at the next check point with
/// [`Halt::ThresholdExceeded`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionControl {
    /// Halt once this instant has passed.
    pub deadline: Option<Instant>,
    /// Halt once this flag is set (e.g. from a Ctrl+C handler).
    pub cancel_flag: Option<Arc<AtomicBool>>,
}

impl ExecutionControl {
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel_flag: None,
        }
    }

    pub fn with_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            deadline: None,
            cancel_flag: Some(flag),
        }
    }

    fn is_cancelled(&self, steps: u64) -> bool {
        if let Some(flag) = &self.cancel_flag {
            if flag.load(Ordering::Relaxed) {
                return true;
            }
        }
        if steps % DEADLINE_CHECK_INTERVAL == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return true;
                }
            }
        }
        false
    }
}

/// Per-run configuration. Every field has a default; `..Default::default()`
/// is the expected way to build one.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Tape size, used when `initial_state` is not supplied.
    /// Defaults to [`DEFAULT_MEMORY_SIZE`].
    pub memory_size: usize,
    /// Overflow policy, used when `initial_state` is not supplied.
    pub overflow_mode: OverflowMode,
    /// The stdin buffer `,` consumes, as bytes.
    pub stdin: String,
    /// Reuse a tape from an earlier run instead of allocating a fresh one;
    /// its size and mode take precedence over the fields above.
    pub initial_state: Option<MachineState>,
    /// Operator indices at which execution suspends.
    pub breakpoints: Vec<usize>,
    /// Cancellation deadline and/or flag.
    pub control: ExecutionControl,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            overflow_mode: OverflowMode::default(),
            stdin: String::new(),
            initial_state: None,
            breakpoints: Vec::new(),
            control: ExecutionControl::default(),
        }
    }
}

impl RunConfig {
    fn machine(&mut self) -> MachineState {
        match self.initial_state.take() {
            Some(state) => state,
            None => MachineState::new(self.memory_size, self.overflow_mode),
        }
    }
}

/// A defined PBrain function: where its body starts in the operator
/// sequence. The body runs until the matching `)`.
#[derive(Debug, Clone, Copy)]
struct Function {
    start: usize,
}

/// One active scope: the root program or a function invocation.
#[derive(Debug, Clone, Copy)]
struct Frame {
    /// First operator index of the scope, used for trace rendering.
    scope_start: usize,
    /// Where execution continues once the scope returns. Unused for the
    /// root frame.
    return_pc: usize,
}

/// Transient per-run state: program counter, stdio buffers, frame stack,
/// function table, and breakpoints. Created fresh for every run and owned
/// by it, so sequential runs cannot observe each other's buffers.
#[derive(Debug, Clone)]
pub(crate) struct ExecutionContext {
    pc: usize,
    stdin: Box<[u8]>,
    stdin_cursor: usize,
    stdout: String,
    /// Characters printed so far; tracked separately because `stdout` is
    /// measured in characters, not bytes.
    printed: usize,
    frames: Vec<Frame>,
    /// Function table keyed by cell value.
    functions: [Option<Function>; 256],
    /// `(` sites that already defined a function.
    defined_sites: HashSet<usize>,
    breakpoints: HashSet<usize>,
    /// Set on resume so the breakpoint just suspended at is stepped over.
    resumed_at: Option<usize>,
}

impl ExecutionContext {
    fn new(program: &CompiledProgram, config: &RunConfig) -> Self {
        Self {
            pc: 0,
            stdin: config.stdin.as_bytes().into(),
            stdin_cursor: 0,
            stdout: String::new(),
            printed: 0,
            frames: vec![Frame {
                scope_start: 0,
                return_pc: program.len(),
            }],
            functions: [None; 256],
            defined_sites: HashSet::new(),
            breakpoints: config.breakpoints.iter().copied().collect(),
            resumed_at: None,
        }
    }

    pub(crate) fn stdout(&self) -> &str {
        &self.stdout
    }

    pub(crate) fn mark_resumed(&mut self) {
        self.resumed_at = Some(self.pc);
    }

    fn fault(&self, program: &CompiledProgram, pc: usize, fault: Fault) -> Halt {
        Halt::Faulted(ExceptionInfo {
            fault,
            stack_trace: self.stack_trace(program, pc),
        })
    }

    /// One fragment per active frame, innermost first: from the frame's
    /// scope start through the operator active in that frame — the
    /// faulting operator for the innermost frame, the call site for every
    /// frame above it.
    fn stack_trace(&self, program: &CompiledProgram, pc: usize) -> Vec<String> {
        let mut trace = Vec::with_capacity(self.frames.len());
        let mut pos = pc;
        for frame in self.frames.iter().rev() {
            trace.push(program.fragment(frame.scope_start, pos));
            pos = frame.return_pc.saturating_sub(1);
        }
        trace
    }
}

/// Validates and runs `source` to halt or suspension.
///
/// Syntax is checked first; on a syntax error no execution happens at all.
/// Runtime failures do not show up as `Err` — they are captured in the
/// returned [`RunResult`].
pub fn try_run(source: &str, config: RunConfig) -> Result<RunResult, SyntaxError> {
    let program = parser::compile(source)?;
    let (result, _) = run_program(&program, config);
    Ok(result)
}

/// Like [`try_run`], but wraps the outcome in a [`Session`] so a run that
/// suspended at a breakpoint can be resumed.
pub fn try_run_session(source: &str, config: RunConfig) -> Result<Session, SyntaxError> {
    let program = parser::compile(source)?;
    let (result, context) = run_program(&program, config);
    Ok(Session::new(program, result, context))
}

fn run_program(program: &CompiledProgram, mut config: RunConfig) -> (RunResult, ExecutionContext) {
    let mut machine = config.machine();
    let mut ctx = ExecutionContext::new(program, &config);
    let halt = execute(program, &mut machine, &mut ctx, &config.control, true);
    let result = RunResult {
        halt,
        stdout: ctx.stdout.clone(),
        machine,
    };
    (result, ctx)
}

/// Resumes a context against its program until halt or (when
/// `honor_breakpoints`) the next suspension.
pub(crate) fn execute(
    program: &CompiledProgram,
    machine: &mut MachineState,
    ctx: &mut ExecutionContext,
    control: &ExecutionControl,
    honor_breakpoints: bool,
) -> Halt {
    let mut steps: u64 = 0;
    while ctx.pc < program.len() {
        if control.is_cancelled(steps) {
            return Halt::ThresholdExceeded {
                stack_trace: ctx.stack_trace(program, ctx.pc),
            };
        }
        if honor_breakpoints
            && ctx.breakpoints.contains(&ctx.pc)
            && ctx.resumed_at != Some(ctx.pc)
        {
            return Halt::BreakpointReached;
        }
        ctx.resumed_at = None;
        steps += 1;

        let pc = ctx.pc;
        match program.op(pc) {
            Operator::Increment => {
                if let Err(fault) = machine.increment() {
                    return ctx.fault(program, pc, fault);
                }
            }
            Operator::Decrement => {
                if let Err(fault) = machine.decrement() {
                    return ctx.fault(program, pc, fault);
                }
            }
            Operator::Forward => {
                if let Err(fault) = machine.move_forward() {
                    return ctx.fault(program, pc, fault);
                }
            }
            Operator::Backward => {
                if let Err(fault) = machine.move_backward() {
                    return ctx.fault(program, pc, fault);
                }
            }
            Operator::PrintChar => {
                if ctx.printed == STDOUT_LIMIT {
                    return ctx.fault(program, pc, Fault::StdoutBufferLimitExceeded);
                }
                ctx.stdout.push(char::from(machine.current()));
                ctx.printed += 1;
            }
            Operator::ReadChar => match ctx.stdin.get(ctx.stdin_cursor).copied() {
                Some(byte) => {
                    machine.set_current(byte);
                    ctx.stdin_cursor += 1;
                }
                None => return ctx.fault(program, pc, Fault::StdinBufferExhausted),
            },
            Operator::LoopStart => {
                if machine.current() == 0 {
                    ctx.pc = program.jump(pc);
                }
            }
            Operator::LoopEnd => {
                if machine.current() != 0 {
                    ctx.pc = program.jump(pc);
                }
            }
            Operator::FunctionStart => {
                let value = machine.current();
                if ctx.functions[value as usize].is_some() {
                    return ctx.fault(program, pc, Fault::DuplicateFunctionDefinition);
                }
                if ctx.defined_sites.contains(&pc) {
                    return ctx.fault(program, pc, Fault::FunctionAlreadyDefined);
                }
                ctx.functions[value as usize] = Some(Function { start: pc + 1 });
                ctx.defined_sites.insert(pc);
                // Definitions have no other runtime effect; skip the body.
                ctx.pc = program.jump(pc);
            }
            Operator::FunctionEnd => {
                let frame = ctx.frames.pop().expect("call frame on function return");
                ctx.pc = frame.return_pc;
                continue;
            }
            Operator::FunctionCall => {
                if ctx.frames.len() == STACK_LIMIT {
                    return ctx.fault(program, pc, Fault::StackLimitExceeded);
                }
                let value = machine.current();
                let Some(function) = ctx.functions[value as usize] else {
                    return ctx.fault(program, pc, Fault::UndefinedFunctionCalled);
                };
                ctx.frames.push(Frame {
                    scope_start: function.start,
                    return_pc: pc + 1,
                });
                ctx.pc = function.start;
                continue;
            }
        }
        ctx.pc += 1;
    }
    Halt::Completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn run(source: &str) -> RunResult {
        try_run(source, RunConfig::default()).expect("valid syntax")
    }

    fn run_with_stdin(source: &str, stdin: &str) -> RunResult {
        let config = RunConfig {
            stdin: stdin.to_string(),
            ..RunConfig::default()
        };
        try_run(source, config).expect("valid syntax")
    }

    fn exception(result: &RunResult) -> &ExceptionInfo {
        match &result.halt {
            Halt::Faulted(info) => info,
            other => panic!("expected a fault, got {other:?}"),
        }
    }

    #[test]
    fn completed_program_produces_output() {
        let result = run("+++++++[>++++++++<-]>++.");
        assert_eq!(result.halt, Halt::Completed);
        assert_eq!(result.stdout, ":");
        assert!(result.is_success());
        assert!(result.has_output());
    }

    #[test]
    fn stdin_is_consumed_in_order() {
        let result = run_with_stdin(",.,.", "Hi");
        assert_eq!(result.halt, Halt::Completed);
        assert_eq!(result.stdout, "Hi");
    }

    #[test]
    fn negative_value_fault_with_single_frame_trace() {
        let result = run("+++>>-++");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::NegativeValue);
        assert_eq!(info.stack_trace, vec!["+++>>-".to_string()]);
        assert_eq!(result.stdout, "");
        assert_eq!(result.machine.current(), 0);
        assert!(!result.is_success());
    }

    #[test]
    fn wrap_mode_never_faults_on_cell_arithmetic() {
        let config = RunConfig {
            overflow_mode: OverflowMode::ByteOverflow,
            ..RunConfig::default()
        };
        let result = try_run("-", config).expect("valid syntax");
        assert_eq!(result.halt, Halt::Completed);
        assert_eq!(result.machine.current(), 255);
    }

    #[test]
    fn pointer_bound_faults() {
        assert_eq!(run("<").fault(), Some(Fault::LowerBoundExceeded));
        let config = RunConfig {
            memory_size: 2,
            ..RunConfig::default()
        };
        let result = try_run(">>", config).expect("valid syntax");
        assert_eq!(result.fault(), Some(Fault::UpperBoundExceeded));
    }

    #[test]
    fn deadline_halts_runaway_loop() {
        let config = RunConfig {
            control: ExecutionControl::with_deadline(Instant::now() + Duration::from_millis(50)),
            ..RunConfig::default()
        };
        let result = try_run("+[+-]", config).expect("valid syntax");
        match &result.halt {
            Halt::ThresholdExceeded { stack_trace } => assert_eq!(stack_trace.len(), 1),
            other => panic!("expected ThresholdExceeded, got {other:?}"),
        }
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn cancel_flag_halts_before_the_first_operator() {
        let flag = Arc::new(AtomicBool::new(true));
        let config = RunConfig {
            control: ExecutionControl::with_flag(flag),
            ..RunConfig::default()
        };
        let result = try_run("+", config).expect("valid syntax");
        assert!(matches!(result.halt, Halt::ThresholdExceeded { .. }));
        assert_eq!(result.machine.current(), 0);
    }

    #[test]
    fn recursive_call_overflows_the_frame_stack() {
        let result = run("(:):");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::StackLimitExceeded);
        assert_eq!(info.stack_trace.len(), STACK_LIMIT);
        assert_eq!(info.stack_trace[0], ":");
        assert_eq!(info.stack_trace[STACK_LIMIT - 1], "(:):");
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn stdin_exhaustion_faults() {
        let result = run(",");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::StdinBufferExhausted);
        assert_eq!(info.stack_trace, vec![",".to_string()]);
        assert_eq!(result.stdout, "");
    }

    #[test]
    fn stdout_cap_keeps_the_capped_output() {
        let result = run_with_stdin(",[.]", "a");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::StdoutBufferLimitExceeded);
        assert_eq!(info.stack_trace, vec![",[.".to_string()]);
        assert_eq!(result.stdout, "a".repeat(STDOUT_LIMIT));
    }

    #[test]
    fn function_call_runs_the_body_and_returns() {
        let result = run("(>+++<):>.");
        assert_eq!(result.halt, Halt::Completed);
        assert_eq!(result.stdout, "\u{3}");
    }

    #[test]
    fn calling_an_undefined_function_faults() {
        let result = run(":");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::UndefinedFunctionCalled);
        assert_eq!(info.stack_trace, vec![":".to_string()]);
    }

    #[test]
    fn redefining_a_bound_value_faults() {
        // The loop re-runs the definition while the cell still holds 2.
        let result = run("++[(.)]");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::DuplicateFunctionDefinition);
        assert_eq!(info.stack_trace, vec!["++[(".to_string()]);
    }

    #[test]
    fn re_executing_a_definition_site_faults() {
        // The second pass reaches the same `(` with the cell at 1.
        let result = run("++[(.)-]");
        let info = exception(&result);
        assert_eq!(info.fault, Fault::FunctionAlreadyDefined);
    }

    #[test]
    fn breakpoint_suspends_before_the_operator() {
        let config = RunConfig {
            breakpoints: vec![3],
            ..RunConfig::default()
        };
        let result = try_run("+++.", config).expect("valid syntax");
        assert_eq!(result.halt, Halt::BreakpointReached);
        assert_eq!(result.stdout, "");
        assert_eq!(result.machine.current(), 3);
        assert!(result.is_success());
    }

    #[test]
    fn breakpoint_at_the_first_operator_suspends_immediately() {
        let config = RunConfig {
            breakpoints: vec![0],
            ..RunConfig::default()
        };
        let result = try_run("+", config).expect("valid syntax");
        assert_eq!(result.halt, Halt::BreakpointReached);
        assert_eq!(result.machine.current(), 0);
    }

    #[test]
    fn finished_machine_state_feeds_the_next_run() {
        let first = run("+++");
        assert_eq!(first.halt, Halt::Completed);
        let config = RunConfig {
            initial_state: Some(first.machine),
            ..RunConfig::default()
        };
        let second = try_run(".", config).expect("valid syntax");
        assert_eq!(second.stdout, "\u{3}");
    }

    #[test]
    fn syntax_error_prevents_execution() {
        let err = try_run("[", RunConfig::default()).expect_err("invalid syntax");
        assert_eq!(err.offset, 0);
    }
}
