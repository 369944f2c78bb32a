use std::io::{self, Write};

use crate::outcome::Halt;
use crate::parser::SyntaxError;

/// Pretty-print a structured SyntaxError with caret positioning.
/// If `program` is `Some("pbrain")`, prefix messages with "pbrain: ..."
/// for CLI use.
pub fn print_syntax_error(program: Option<&str>, code: &str, err: &SyntaxError) {
    let msg = match program {
        Some(p) => format!("{p}: Syntax error: {}", err.kind),
        None => format!("Syntax error: {}", err.kind),
    };
    print_error_with_context(&msg, code, err.offset);
}

/// Report a failed or cancelled run to stderr, including the operator
/// trace (innermost scope first) when one was captured.
pub fn print_run_failure(program: Option<&str>, halt: &Halt) {
    let prefix = |msg: String| match program {
        Some(p) => format!("{p}: {msg}"),
        None => msg,
    };

    match halt {
        Halt::Faulted(info) => {
            eprintln!("{}", prefix(format!("Runtime error: {}", info.fault)));
            eprintln!("Operator trace (innermost first):");
            for fragment in &info.stack_trace {
                eprintln!("  at {fragment}");
            }
        }
        Halt::ThresholdExceeded { stack_trace } => {
            eprintln!("{}", prefix("Execution aborted: threshold exceeded".to_string()));
            for fragment in stack_trace {
                eprintln!("  at {fragment}");
            }
        }
        Halt::Completed | Halt::BreakpointReached => {}
    }
    let _ = io::stderr().flush();
}

/// Print a concise error with character offset and a caret context window,
/// working with UTF-8 by slicing using char indices.
pub fn print_error_with_context(prefix: &str, code: &str, pos: usize) {
    eprintln!("{prefix} at offset {pos}");

    // Show a short window around the position for context
    const WINDOW_CHARS: usize = 32;

    let total_chars = code.chars().count();
    let start_char = pos.saturating_sub(WINDOW_CHARS);
    let end_char = (pos + WINDOW_CHARS + 1).min(total_chars);

    let start_byte = char_to_byte_index(code, start_char);
    let end_byte = char_to_byte_index(code, end_char);
    let slice = &code[start_byte..end_byte];

    eprintln!("  {}", slice);

    // Caret under the exact position
    let caret_offset_chars = pos.saturating_sub(start_char);
    let mut underline = String::new();
    for _ in 0..caret_offset_chars {
        underline.push(' ');
    }
    underline.push('^');
    eprintln!("  {}", underline);
    let _ = io::stderr().flush();
}

/// Convert a char index into a byte index in the given UTF-8 string.
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    if char_idx == 0 {
        return 0;
    }

    let mut count = 0usize;
    let mut byte_idx = 0usize;

    for ch in s.chars() {
        if count == char_idx {
            break;
        }
        byte_idx += ch.len_utf8();
        count += 1;
    }

    byte_idx
}
