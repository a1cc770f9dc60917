use std::io::{self, IsTerminal, Write};
use std::thread;

use anyhow::Context;
use clap::Parser;
use log::{debug, info};

use plisp::symbol::sym;
use plisp::{Config, LispError, Machine, Value};

#[derive(Debug, Parser)]
#[clap(name = "plisp", version, about = "A small PicoLisp-style interpreter")]
struct Options {
    /// Script to load after the libraries.
    script: Option<String>,

    /// Evaluate an expression (may be repeated).
    #[clap(short = 'e', long = "eval")]
    eval: Vec<String>,

    /// Load a library before the script (may be repeated).
    #[clap(short = 'l', long = "load")]
    load: Vec<String>,

    /// Enter the read-eval-print loop even when a script was given.
    #[clap(short = 'i', long)]
    interactive: bool,

    /// Log interpreter setup and heap growth.
    #[clap(short = 'v', long)]
    verbose: bool,

    /// Cells per heap segment.
    #[clap(long, default_value_t = 8192)]
    segment_cells: usize,

    /// Maximum number of heap segments.
    #[clap(long)]
    max_segments: Option<usize>,

    /// Maximum evaluation depth. The interpreter thread's stack grows with it.
    #[clap(long, default_value_t = 10_000)]
    max_depth: usize,

    /// Seed for the random number generator.
    #[clap(long)]
    seed: Option<u64>,
}

/// What the driver does after one top-level evaluation.
enum Flow {
    Continue,
    Exit(i32),
}

fn main() -> anyhow::Result<()> {
    let opts = Options::parse();
    let filter = if opts.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    if opts.segment_cells == 0 {
        anyhow::bail!("--segment-cells must be at least 1");
    }
    let config = Config {
        segment_cells: opts.segment_cells,
        max_segments: opts.max_segments,
        max_depth: opts.max_depth,
        seed: opts.seed,
    };
    // Evaluation recurses on the native stack; size it for the depth limit.
    let stack_size = config.stack_size();
    debug!("interpreter stack: {} bytes", stack_size);
    let code = thread::Builder::new()
        .name("plisp".to_string())
        .stack_size(stack_size)
        .spawn(move || run(opts, config))
        .context("could not start the interpreter thread")?
        .join()
        .map_err(|_| anyhow::anyhow!("interpreter thread panicked"))??;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run(opts: Options, config: Config) -> anyhow::Result<i32> {
    let mut m = Machine::new(config).context("could not set up the interpreter")?;

    for path in &opts.load {
        std::fs::metadata(path).with_context(|| format!("cannot read library '{}'", path))?;
        info!("loading {}", path);
        if let Flow::Exit(code) = toplevel(&mut m, |m| m.load(path)) {
            return Ok(code);
        }
    }
    if let Some(script) = &opts.script {
        std::fs::metadata(script).with_context(|| format!("cannot read script '{}'", script))?;
        info!("running {}", script);
        if let Flow::Exit(code) = toplevel(&mut m, |m| m.load(script)) {
            return Ok(code);
        }
    }
    for expr in &opts.eval {
        if let Flow::Exit(code) = toplevel(&mut m, |m| m.eval_str(expr)) {
            return Ok(code);
        }
    }

    if opts.script.is_some() && !opts.interactive {
        return Ok(0);
    }
    let tty = io::stdin().is_terminal();
    if tty {
        let stats = m.heap_stats();
        println!(
            "plisp {}: {} cells, {} symbols",
            env!("CARGO_PKG_VERSION"),
            stats.total,
            m.symbols.count()
        );
    }
    Ok(repl(&mut m, tty))
}

/// Read and evaluate stdin one expression at a time. Results are echoed
/// with a prompt on a terminal.
fn repl(m: &mut Machine, tty: bool) -> i32 {
    loop {
        if tty {
            print!(": ");
            let _ = io::stdout().flush();
        }
        let mut eof = false;
        let flow = toplevel(m, |m| match m.read()? {
            Some(x) => m.eval(x),
            None => {
                eof = true;
                Ok(Value::NIL)
            }
        });
        if let Flow::Exit(code) = flow {
            return code;
        }
        if eof {
            if tty {
                println!();
            }
            return 0;
        }
        if tty {
            let result = m.val(Value::symbol(sym::AT));
            println!("-> {}", m.print_string(result));
        }
    }
}

/// Run `body` under the catch-all region and report what escapes it.
fn toplevel<F>(m: &mut Machine, body: F) -> Flow
where
    F: FnOnce(&mut Machine) -> plisp::Result<Value>,
{
    let result = m.protect(|m| {
        let v = body(m)?;
        let (at, at2) = (m.symbols.value(sym::AT), m.symbols.value(sym::AT2));
        m.symbols.set_value(sym::AT3, at2);
        m.symbols.set_value(sym::AT2, at);
        m.symbols.set_value(sym::AT, v);
        Ok(v)
    });
    let _ = m.out().flush();
    match result {
        Ok(_) => Flow::Continue,
        Err(LispError::Bye(code)) => Flow::Exit(code),
        Err(err @ LispError::HeapExhausted { .. }) => {
            eprintln!("{}", err);
            Flow::Exit(1)
        }
        Err(err) => {
            eprintln!("{}", m.describe(&err));
            run_error_hook(m)
        }
    }
}

/// Evaluate `*Err` after a reported error, if it is set.
fn run_error_hook(m: &mut Machine) -> Flow {
    let hook = m.symbols.value(sym::ERR);
    if hook.is_nil() {
        return Flow::Continue;
    }
    match m.protect(|m| m.run(hook)) {
        Ok(_) => Flow::Continue,
        Err(LispError::Bye(code)) => Flow::Exit(code),
        Err(err @ LispError::HeapExhausted { .. }) => {
            eprintln!("{}", err);
            Flow::Exit(1)
        }
        Err(err) => {
            eprintln!("{}", m.describe(&err));
            Flow::Continue
        }
    }
}
