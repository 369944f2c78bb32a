use clap::Args;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

use pbrain::cli_util::{print_run_failure, print_syntax_error};
use pbrain::{
    DEFAULT_MEMORY_SIZE, ExecutionControl, OverflowMode, RunConfig, RunResult, SyntaxError,
    try_run,
};

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct RunArgs {
    /// Stdin buffer the script consumes with ','
    #[arg(short = 'i', long = "stdin", value_name = "TEXT")]
    pub stdin: Option<String>,

    /// Tape size in cells (fallback PBRAIN_MEMORY; default 64)
    #[arg(short = 'm', long = "memory", value_name = "CELLS")]
    pub memory: Option<usize>,

    /// Wrap cell values modulo 256 instead of faulting at the 0/255 bounds
    #[arg(short = 'w', long = "wrap")]
    pub wrap: bool,

    /// Wall-clock timeout in milliseconds (fallback PBRAIN_TIMEOUT_MS; default 2_000)
    #[arg(long = "timeout", value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Read the script from PATH instead of positional "<code>"
    #[arg(short = 'f', long = "file")]
    pub file: Option<String>,

    /// Concatenated script parts
    #[arg(value_name = "code", trailing_var_arg = true)]
    pub code: Vec<String>,

    /// Show this help
    #[arg(short = 'h', long = "help", action = clap::ArgAction::SetTrue)]
    pub help: bool,
}

pub fn run(program: &str, args: RunArgs) -> i32 {
    if args.help {
        usage_and_exit(program, 0);
    }

    let RunArgs {
        stdin,
        memory,
        wrap,
        timeout_ms,
        file,
        code,
        ..
    } = args;

    if file.is_none() && code.is_empty() {
        usage_and_exit(program, 2);
    }

    if file.is_some() && !code.is_empty() {
        eprintln!("{program}: cannot use positional code together with --file");
        usage_and_exit(program, 2);
    }

    let code_str = if let Some(path) = file {
        match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("{program}: failed to read script file as UTF-8: {e}");
                let _ = io::stderr().flush();
                return 1;
            }
        }
    } else {
        code.join("")
    };

    // Resolve limits: flags -> env -> defaults
    let timeout_ms = timeout_ms
        .or_else(|| {
            env::var("PBRAIN_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
        })
        .unwrap_or(2_000);
    let memory = memory
        .or_else(|| {
            env::var("PBRAIN_MEMORY")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
        })
        .unwrap_or(DEFAULT_MEMORY_SIZE);
    if memory == 0 {
        eprintln!("{program}: memory size must be at least 1 cell");
        let _ = io::stderr().flush();
        return 2;
    }

    // Ctrl+C flips the same flag the engine polls between operators
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || cancel.store(true, Ordering::Relaxed)) {
            eprintln!("{program}: failed to set ctrl+c handler: {e}");
            let _ = io::stderr().flush();
        }
    }

    let config = RunConfig {
        memory_size: memory,
        overflow_mode: if wrap {
            OverflowMode::ByteOverflow
        } else {
            OverflowMode::ByteWithNoOverflow
        },
        stdin: stdin.unwrap_or_default(),
        control: ExecutionControl {
            deadline: Some(Instant::now() + Duration::from_millis(timeout_ms)),
            cancel_flag: Some(cancel.clone()),
        },
        ..RunConfig::default()
    };

    // Execute on a worker thread. The engine polls the deadline itself;
    // the channel timeout is only the backstop.
    let (tx, rx) = mpsc::channel::<Result<RunResult, SyntaxError>>();
    let source = code_str.clone();
    thread::spawn(move || {
        let _ = tx.send(try_run(&source, config));
    });

    let backstop = Duration::from_millis(timeout_ms.saturating_mul(2).saturating_add(500));
    let exit_code = match rx.recv_timeout(backstop) {
        Ok(Ok(result)) => {
            print!("{}", result.stdout);
            let _ = io::stdout().flush();
            if result.is_success() {
                0
            } else {
                print_run_failure(Some(program), &result.halt);
                1
            }
        }
        Ok(Err(err)) => {
            print_syntax_error(Some(program), &code_str, &err);
            2
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            cancel.store(true, Ordering::Relaxed);
            eprintln!("Execution aborted: wall-clock timeout exceeded ({timeout_ms} ms)");
            let _ = io::stderr().flush();
            1
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => 1,
    };

    println!();
    let _ = io::stdout().flush();
    exit_code
}

fn usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} run [--stdin TEXT] [--memory N] [--wrap] [--timeout MS] "<code>"
  {0} run [--stdin TEXT] [--memory N] [--wrap] [--timeout MS] --file <PATH>

Options:
  --stdin,   -i <TEXT>   Stdin buffer the script consumes with ',' (default empty)
  --memory,  -m <CELLS>  Tape size in cells (fallback PBRAIN_MEMORY; default 64)
  --wrap,    -w          Wrap cell values modulo 256 instead of faulting at 0/255
  --timeout <MS>         Wall-clock timeout in milliseconds (fallback PBRAIN_TIMEOUT_MS; default 2_000)
  --file,    -f <PATH>   Read the script from PATH instead of positional "<code>"
  --help,    -h          Show this help

Notes:
- Operators are + - > < . , : [ ] ( ); every other character is a comment.
- Input (`,`) consumes the --stdin buffer; when it runs dry the script
  halts with a runtime fault instead of reading the terminal.
- Runtime faults print an operator trace (innermost scope first) to stderr.

Examples:
- Run a script from a file:
    {0} run --file ./program.pb
- Echo two characters of buffered stdin:
    {0} run --stdin Hi ",.,."
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}
