/*!

The command line driver: `unilang [options] [SRCPATH [args…]]`.

Scripting mode runs the source at SRCPATH (`-` is standard input) after any
`-e` strings, in order; without a source or `-e`, the interactive REPL is
entered. The exit status is 0 on success and 1 otherwise.

*/

use once_cell::sync::Lazy;

use unilang::api::Interpreter;

const INIT_FILE: &str = "init.unilang";

static HELP: Lazy<String> = Lazy::new(|| {
  format!(
    "Usage: unilang [OPTIONS ...] [SRCPATH [ARGS ...]]\n\
     \n\
     An interpreter for the Unilang language.\n\
     \n\
     SRCPATH names a source file, or '-' for standard input. Without\n\
     SRCPATH and without -e, the interactive REPL is entered.\n\
     \n\
     Options:\n\
     \x20 -h, --help          Print this message and exit.\n\
     \x20 -e STRING           Evaluate STRING. May be repeated; each instance\n\
     \x20                     is evaluated in order before SRCPATH.\n\
     \x20 -q, --no-init-file  Do not load '{}' before evaluation.\n\
     \x20 --                  End of options.\n\
     \n\
     Environment variables:\n\
     \x20 ECHO                If set, echo the result of each evaluated unit.\n\
     \x20 UNILANG_LOG         Logging filter (tracing EnvFilter syntax).\n\
     \x20 UNILANG_NO_SRCINFO  If set, omit source names from diagnostics.\n\
     \n\
     The exit status is 0 on success and 1 otherwise.",
    INIT_FILE
  )
});

struct Options {
  eval_strings: Vec<String>,
  source      : Option<String>,
  script_args : Vec<String>,
  no_init_file: bool,
  help        : bool,
}

fn parse_arguments(args: &[String]) -> Options {
  let mut options = Options {
    eval_strings: Vec::new(),
    source      : None,
    script_args : Vec::new(),
    no_init_file: false,
    help        : false,
  };
  let mut translate = true;
  let mut requires_eval = false;

  for arg in args {
    if translate {
      match arg.as_str() {
        "--" => {
          translate = false;
          continue;
        }
        "-h" | "--help" => {
          options.help = true;
          return options;
        }
        "-e" => {
          requires_eval = true;
          continue;
        }
        "-q" | "--no-init-file" => {
          options.no_init_file = true;
          continue;
        }
        _ => {}
      }
    }
    if requires_eval {
      options.eval_strings.push(arg.clone());
      requires_eval = false;
    } else if options.source.is_none() {
      options.source = Some(arg.clone());
    } else {
      options.script_args.push(arg.clone());
    }
  }
  options
}

fn run(options: &Options) -> Result<(), unilang::UnilangError> {
  let mut interpreter = Interpreter::new()?;

  // Remaining arguments are visible to the user program.
  let mut args = unilang::Term::new();
  for arg in &options.script_args {
    args.add_child(unilang::Term::with_value(unilang::Value::String(arg.clone())));
  }
  interpreter
      .environment()
      .borrow_mut()
      .define(unilang::IString::from("command-line-args"), args)?;

  if !options.no_init_file && std::path::Path::new(INIT_FILE).exists() {
    interpreter.run_script(INIT_FILE)?;
  }
  for text in &options.eval_strings {
    interpreter.run_line(text)?;
  }
  match &options.source {
    Some(path) => interpreter.run_script(path)?,
    None => {
      if options.eval_strings.is_empty() {
        interpreter.run_repl();
      }
    }
  }
  Ok(())
}

fn main() {
  let args: Vec<String> = std::env::args().skip(1).collect();
  let options = parse_arguments(&args);

  if options.help {
    println!("{}", *HELP);
    return;
  }
  if let Err(e) = run(&options) {
    eprintln!("{:?}", e);
    std::process::exit(1);
  }
}
