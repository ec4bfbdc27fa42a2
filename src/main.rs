use std::{
    env,
    error::Error,
    ffi::OsString,
    fs::File,
    io::{self, stdin, BufWriter, Read},
    process::ExitCode,
};

use log::{LevelFilter, Log, Metadata, Record};
use tacvm::{
    engine::{Config, Engine},
    ir::{self, Listing},
    parser,
};

const USAGE: &str = "usage: tacvm [--emit-ir] [--ir] [--budget N] [FILE | -]";

/// Writes records to stderr. The level comes from `TACVM_LOG`.
struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logger() {
    let level = env::var("TACVM_LOG")
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Warn);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

#[derive(Default, Debug)]
struct Options {
    path: Option<OsString>,
    emit_ir: bool,
    ir_input: bool,
    budget: Option<u64>,
}

fn parse_args() -> Result<Options, String> {
    let mut opts = Options::default();
    let mut args = env::args_os().skip(1);
    while let Some(arg) = args.next() {
        match arg.to_str() {
            Some("--emit-ir") => opts.emit_ir = true,
            Some("--ir") => opts.ir_input = true,
            Some("--budget") => {
                let budget = args
                    .next()
                    .and_then(|n| n.to_str()?.parse().ok())
                    .ok_or("--budget expects a number")?;
                opts.budget = Some(budget);
            }
            Some("-h" | "--help") => return Err(USAGE.to_string()),
            Some("-") => opts.path = None,
            Some(flag) if flag.starts_with("--") => {
                return Err(format!("unknown flag `{flag}`\n{USAGE}"))
            }
            _ => opts.path = Some(arg),
        }
    }
    Ok(opts)
}

fn read_source(path: Option<&OsString>) -> io::Result<String> {
    let mut buf = String::new();
    match path {
        Some(path) => File::open(path)?.read_to_string(&mut buf)?,
        None => stdin().read_to_string(&mut buf)?,
    };
    Ok(buf)
}

fn run(opts: &Options) -> Result<(), Box<dyn Error>> {
    let text = read_source(opts.path.as_ref())?;
    let program = if opts.ir_input {
        ir::parse_program(&text)?
    } else {
        parser::compile(&text)?
    };
    if opts.emit_ir {
        print!("{}", Listing(&program));
        return Ok(());
    }
    let mut engine = Engine::new(
        program,
        Config {
            budget: opts.budget,
        },
    )?;
    let mut input = stdin().lock();
    let mut output = BufWriter::new(io::stdout().lock());
    engine.run(&mut input, &mut output)?;
    Ok(())
}

fn main() -> ExitCode {
    init_logger();
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(2);
        }
    };
    match run(&opts) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
