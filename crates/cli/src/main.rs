use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use libid::commands::{
    alias_table_command, candidates_command, canonical_command, dedup_command, identify_command,
    show_command, step_command, triage_command, TriageFlags,
};
use libid::init_logging;

/// Identify statically linked runtime library builds in stripped binaries.
///
/// This CLI is a thin wrapper around `libid-core` (exposed in code as `libid_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "libid",
    version,
    about = "Identify statically linked runtime library builds",
    long_about = None
)]
struct Cli {
    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone, Copy)]
struct TriageArgs {
    /// Ignore machine, symbol table and entropy checks.
    #[arg(short, long, default_value_t = false)]
    ignore: bool,

    /// Identify binaries of any ELF machine.
    #[arg(long, default_value_t = false)]
    ignore_machine: bool,

    /// Identify binaries that still carry a symbol table.
    #[arg(long, default_value_t = false)]
    ignore_strip: bool,

    /// Identify binaries that look packed.
    #[arg(long, default_value_t = false)]
    ignore_entropy: bool,
}

impl From<TriageArgs> for TriageFlags {
    fn from(args: TriageArgs) -> Self {
        TriageFlags {
            ignore_all: args.ignore,
            ignore_machine: args.ignore_machine,
            ignore_strip: args.ignore_strip,
            ignore_entropy: args.ignore_entropy,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify the runtime libraries linked into each binary.
    ///
    /// This will:
    /// - Triage each binary (ELF, machine, stripped, not packed).
    /// - Relaunch the analysis engine until the binary's document holds a result.
    /// - Record `{"result": {}}` for binaries that need no identification.
    Identify {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Discard existing documents and identify again.
        #[arg(short, long, default_value_t = false)]
        force: bool,

        #[command(flatten)]
        triage: TriageArgs,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Binaries to identify.
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one identification step for a binary (engine side).
    Step {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Signature namespace (e.g., pc, arm, mips).
        #[arg(long)]
        cpu: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Binary being identified.
        binary: String,
    },

    /// Show the identification document of a binary.
    Show {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        binary: String,
    },

    /// List the candidate signatures available for a CPU.
    Candidates {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(long)]
        cpu: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Report whether binaries need identification, without running it.
    Triage {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[command(flatten)]
        triage: TriageArgs,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,

        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Collapse byte-identical pattern files into redirect stubs.
    Dedup {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        /// Restrict to one CPU namespace. Defaults to every pattern subdirectory.
        #[arg(long)]
        cpu: Option<String>,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Regenerate the alias table and suppression list from pattern files.
    ///
    /// Outputs are only rewritten when missing or older than a pattern file,
    /// unless `--force` is given.
    AliasTable {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(short, long, default_value_t = false)]
        force: bool,
    },

    /// Print the canonical name of each given symbol name.
    Canonical {
        /// Toolkit root directory. Defaults to the current working directory.
        #[arg(long, default_value = ".")]
        root: String,

        #[arg(required = true)]
        names: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Command::Identify { root, force, triage, json, paths } => {
            identify_command(&root, &paths, force, triage.into(), json)?
        }
        Command::Step { root, cpu, json, binary } => step_command(&root, &cpu, &binary, json)?,
        Command::Show { root, json, binary } => show_command(&root, &binary, json)?,
        Command::Candidates { root, cpu, json } => candidates_command(&root, &cpu, json)?,
        Command::Triage { root, triage, json, paths } => {
            triage_command(&root, &paths, triage.into(), json)?
        }
        Command::Dedup { root, cpu, json } => dedup_command(&root, cpu.as_deref(), json)?,
        Command::AliasTable { root, force } => alias_table_command(&root, force)?,
        Command::Canonical { root, names } => canonical_command(&root, &names)?,
    }

    Ok(())
}
