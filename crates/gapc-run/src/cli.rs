use clap::{Parser, Subcommand};
use gapc_cyk::{Builtins, EvalOptions, GrammarModel, NtCall, Parallel, Printer, PrinterConfig};
use itertools::Itertools;
use miette::{IntoDiagnostic, WrapErr};
use std::io::{self, BufWriter, Write};
use std::{fs, path::PathBuf};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gapc-cyk")]
#[command(author = env!("CARGO_PKG_AUTHORS"))]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To print the table-filling procedure of a grammar:\n\
    gapc-cyk emit grammar.toml\n\n\
    ## To print it with checkpointing and without the tiled branch:\n\
    gapc-cyk emit --checkpoint --parallel off grammar.toml\n\n\
    ## To list the cells evaluated for inputs of length 4 and 3:\n\
    gapc-cyk trace grammar.toml --length 4 3")]
#[command(
    about = "Generates the bottom-up table-filling procedure of an analyzed dynamic programming grammar.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    options: OptionArgs,

    #[clap(subcommand)]
    commands: Commands,
}

/// Overrides for the options stored in the grammar model.
#[derive(Clone, Debug, clap::Args, Default)]
struct OptionArgs {
    /// Emit code that resumes from saved index values
    #[arg(long, global = true)]
    checkpoint: bool,

    /// Evaluate outside non-terminals after the inside ones
    #[arg(long, global = true)]
    outside: bool,

    /// Whether to emit the tiled OpenMP branch (auto, on, off)
    #[arg(long, global = true)]
    parallel: Option<Parallel>,

    /// Default tile size of the tiled branch
    #[arg(long, global = true)]
    tile_size: Option<u32>,
}

#[derive(Debug, Clone, Subcommand)]
enum Commands {
    /// Print the table-filling procedure as C++
    Emit {
        /// Path to the analyzed grammar model (.toml or .json)
        model: PathBuf,
        /// Number of spaces for indentation
        #[arg(short, long, default_value_t = 2)]
        indent_width: usize,
        /// Write the procedure to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the evaluation calls the procedure makes for concrete input lengths
    Trace {
        /// Path to the analyzed grammar model (.toml or .json)
        model: PathBuf,
        /// Length of every input sequence, one per track
        #[arg(short = 'n', long = "length", num_args = 1.., required = true)]
        lengths: Vec<usize>,
        /// Evaluate the OpenMP branch instead of the single-threaded one
        #[arg(long)]
        openmp: bool,
    },
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        let builtins = Builtins::new();

        match &self.commands {
            Commands::Emit {
                model,
                indent_width,
                output,
            } => {
                let model = self.load(model)?;
                let procedure = gapc_cyk::generate(&model, &builtins).into_diagnostic()?;
                let code = Printer::new(Some(PrinterConfig {
                    indent_width: *indent_width,
                }))
                .print(&procedure);

                match output {
                    Some(path) => {
                        fs::write(path, code)
                            .into_diagnostic()
                            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
                        info!(path = %path.display(), "wrote {}", procedure.name);
                        Ok(())
                    }
                    None => Self::write_stdout(&code),
                }
            }
            Commands::Trace {
                model,
                lengths,
                openmp,
            } => {
                let model = self.load(model)?;
                let procedure = gapc_cyk::generate(&model, &builtins).into_diagnostic()?;

                let mut options = EvalOptions::for_model(&model, lengths).into_diagnostic()?;
                if *openmp {
                    options = options.define(builtins.openmp_macro.clone());
                }
                if model.options.checkpoint {
                    options = options.with_fresh_checkpoint(&model, &builtins);
                }

                let mut lines = String::new();
                let stats = gapc_cyk::eval_procedure(&procedure, &builtins, &options, |call| {
                    lines.push_str(&Self::format_call(call));
                    lines.push('\n');
                })
                .into_diagnostic()?;
                info!(calls = stats.calls, steps = stats.steps, "traced {}", procedure.name);

                Self::write_stdout(&lines)
            }
        }
    }

    fn load(&self, path: &PathBuf) -> miette::Result<GrammarModel> {
        let mut model = GrammarModel::from_path(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to load grammar model {}", path.display()))?;

        let options = &mut model.options;
        options.checkpoint |= self.options.checkpoint;
        options.outside |= self.options.outside;
        if let Some(parallel) = self.options.parallel {
            options.parallel = parallel;
        }
        if let Some(tile_size) = self.options.tile_size {
            options.tile_size = tile_size;
        }

        model.validate().into_diagnostic()?;
        Ok(model)
    }

    fn format_call(call: &NtCall) -> String {
        let call_text = format!("{}({})", call.routine, call.args.iter().join(", "));
        match call.work_share {
            Some(share) => format!(
                "{} [loop {}, iteration {}]",
                call_text, share.instance, share.iteration
            ),
            None => call_text,
        }
    }

    fn write_stdout(text: &str) -> miette::Result<()> {
        let stdout = io::stdout();
        let mut handle = BufWriter::new(stdout.lock());
        handle.write_all(text.as_bytes()).into_diagnostic()?;
        handle.flush().into_diagnostic()
    }
}
