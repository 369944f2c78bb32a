//! A Brainf*ck/PBrain parsing and execution engine.
//!
//! This crate validates, compiles, and runs Brainf*ck scripts extended
//! with the PBrain function operators `(`, `)`, and `:`.
//!
//! Features and behaviors:
//! - Single-pass syntax validation with a structured error kind and the
//!   character offset of the first offending token.
//! - Compilation to an operator sequence with a precomputed jump table,
//!   so loop and function branches resolve in O(1).
//! - A bounded memory tape (default 64 cells) under a configurable
//!   overflow policy: wrap modulo 256, or fault at the 0/255 boundaries.
//! - Buffered stdin/stdout with hard caps, recursive PBrain function
//!   calls over an explicit 512-frame stack, and a closed set of runtime
//!   fault kinds, each captured with an operator stack trace.
//! - Cooperative cancellation (deadline or flag) polled at operator
//!   granularity.
//! - Breakpoints and resumable [`Session`]s for stepwise debugging.
//!
//! Quick start:
//!
//! ```
//! use pbrain::{Halt, RunConfig, try_run};
//!
//! let config = RunConfig {
//!     stdin: "Hi".to_string(),
//!     ..RunConfig::default()
//! };
//! let result = try_run(",.,.", config).expect("valid syntax");
//! assert_eq!(result.halt, Halt::Completed);
//! assert_eq!(result.stdout, "Hi");
//! ```

pub mod cli_util;
pub mod interpreter;
pub mod machine;
pub mod opcode;
pub mod outcome;
pub mod parser;
pub mod session;

pub use interpreter::{ExecutionControl, RunConfig, try_run, try_run_session};
pub use machine::{DEFAULT_MEMORY_SIZE, MachineState, OverflowMode};
pub use opcode::Operator;
pub use outcome::{ExceptionInfo, Fault, Halt, RunResult, STACK_LIMIT, STDOUT_LIMIT};
pub use parser::{CompiledProgram, SyntaxError, SyntaxErrorKind, compile, validate};
pub use session::Session;
