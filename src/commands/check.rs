use clap::Args;
use std::fs;
use std::io::{self, Write};

use pbrain::cli_util::print_syntax_error;
use pbrain::compile;

#[derive(Args, Debug)]
#[command(disable_help_flag = true)]
pub struct CheckArgs {
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

pub fn run(program: &str, args: CheckArgs) -> i32 {
    if args.help {
        usage_and_exit(program, 0);
    }

    let CheckArgs { file, code, .. } = args;

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

    match compile(&code_str) {
        Ok(compiled) => {
            println!("Syntax OK: {} operators", compiled.len());
            let _ = io::stdout().flush();
            0
        }
        Err(err) => {
            print_syntax_error(Some(program), &code_str, &err);
            2
        }
    }
}

fn usage_and_exit(program: &str, code: i32) -> ! {
    eprintln!(
        r#"Usage:
  {0} check "<code>"
  {0} check --file <PATH>

Options:
  --file, -f <PATH>  Read the script from PATH instead of positional "<code>"
  --help, -h         Show this help

Description:
  Validates the syntax of a Brainf*ck/PBrain script without executing it.
  Errors report the kind and the character offset of the first offending
  token, with a caret context window.
"#,
        program
    );
    let _ = io::stderr().flush();
    std::process::exit(code);
}
