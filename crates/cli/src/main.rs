use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use oxide::commands::{self, load_layout, open_session, Session};
use oxide::{exit_code_for, logging};

/// Content-addressed binary analysis engine.
///
/// This CLI is a thin wrapper around `oxide-core`; every command opens the
/// store at `--root` and drives the engine.
#[derive(Parser, Debug)]
#[command(name = "oxide", version, about = "Content-addressed binary analysis engine", long_about = None)]
struct Cli {
    /// Store root directory. Defaults to the current working directory.
    #[arg(long, global = true, default_value = ".")]
    root: String,

    /// Raise console log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Initialize a store: `.oxide/config.json`, the catalog, and the data directories.
    Init,

    /// Show store paths, object counts, modules and worker health.
    Info {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Import files (or directories) into the store.
    Import {
        #[arg(required = true)]
        paths: Vec<String>,

        /// Also group the imported files into a named collection.
        #[arg(long)]
        collection: Option<String>,

        /// Descend into subdirectories.
        #[arg(long, default_value_t = false)]
        recursive: bool,
    },

    /// List registered modules.
    Modules {
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Include private modules (sources).
        #[arg(long, default_value_t = false)]
        all: bool,
    },

    /// Show a module's documentation and options.
    Doc {
        module: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Produce a module's artifacts for OIDs or collection names.
    Process {
        module: String,

        #[arg(required = true)]
        oids: Vec<String>,

        /// Module option as key=value (repeatable).
        #[arg(long = "opt")]
        opts: Vec<String>,

        /// Recompute even when an artifact is stored.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Print a module's artifact (produced if missing) as JSON.
    Retrieve {
        module: String,
        oid: String,

        #[arg(long = "opt")]
        opts: Vec<String>,

        /// Dotted path inside the artifact, e.g. `header.insn_mode`.
        #[arg(long)]
        field: Option<String>,
    },

    /// Apply, read, or filter by tags.
    #[command(subcommand)]
    Tag(TagCommand),

    /// Create, list, show, or delete named collections.
    #[command(subcommand)]
    Collection(CollectionCommand),

    /// Module scratch storage.
    #[command(subcommand)]
    Local(LocalCommand),

    /// Write a control-flow or call graph as an adjacency list.
    WriteGraph {
        /// `control_flow_graph` or `call_graph`.
        module: String,
        oid: String,

        /// Function start address (required for control-flow graphs).
        #[arg(long)]
        function: Option<String>,

        #[arg(long)]
        out: PathBuf,
    },

    /// Serve this store as a distributed worker.
    Serve {
        /// Listen port. Defaults to `distributed_port` from the config.
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, default_value = "0.0.0.0")]
        bind: String,
    },
}

#[derive(Subcommand, Debug)]
enum TagCommand {
    /// Merge tags into every given object.
    Apply {
        #[arg(required = true)]
        oids: Vec<String>,

        /// Tag as key=value (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    Get {
        oid: String,

        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Objects whose tag matches; without OIDs every file and collection is searched.
    Filter {
        tag: String,

        /// Required value; any value matches when omitted.
        #[arg(long)]
        value: Option<String>,

        oids: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionCommand {
    Create {
        name: String,
        oids: Vec<String>,
    },
    List {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    Show {
        name: String,
    },
    Delete {
        name: String,
    },
}

#[derive(Subcommand, Debug)]
enum LocalCommand {
    Put(LocalPutArgs),
    Get {
        module: String,
        name: String,

        /// Write the blob here instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    List {
        module: String,
    },
}

#[derive(Args, Debug)]
struct LocalPutArgs {
    module: String,
    name: String,
    file: PathBuf,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let (layout, config) = load_layout(&cli.root)?;
    logging::init_logging(&config, &layout, cli.verbose)?;

    match cli.command {
        Command::Init => commands::init_command(&layout, &config),
        command => run_command(&open_session(layout, config)?, command),
    }
}

fn run_command(session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Init => commands::init_command(&session.layout, &session.config)?,
        Command::Info { json } => commands::info_command(session, json)?,
        Command::Import { paths, collection, recursive } => {
            commands::import_command(session, &paths, collection.as_deref(), recursive)?;
        }
        Command::Modules { json, all } => commands::modules_command(session, json, all)?,
        Command::Doc { module, json } => commands::doc_command(session, &module, json)?,
        Command::Process { module, oids, opts, force } => {
            commands::process_command(session, &module, &oids, &opts, force)?
        }
        Command::Retrieve { module, oid, opts, field } => {
            commands::retrieve_command(session, &module, &oid, &opts, field.as_deref())?
        }
        Command::Tag(TagCommand::Apply { oids, tags }) => {
            commands::tag_apply_command(session, &oids, &tags)?
        }
        Command::Tag(TagCommand::Get { oid, json }) => commands::tag_get_command(session, &oid, json)?,
        Command::Tag(TagCommand::Filter { tag, value, oids }) => {
            commands::tag_filter_command(session, &tag, value.as_deref(), &oids)?
        }
        Command::Collection(CollectionCommand::Create { name, oids }) => {
            commands::collection_create_command(session, &name, &oids)?
        }
        Command::Collection(CollectionCommand::List { json }) => {
            commands::collection_list_command(session, json)?
        }
        Command::Collection(CollectionCommand::Show { name }) => {
            commands::collection_show_command(session, &name)?
        }
        Command::Collection(CollectionCommand::Delete { name }) => {
            commands::collection_delete_command(session, &name)?
        }
        Command::Local(LocalCommand::Put(args)) => {
            commands::local_put_command(session, &args.module, &args.name, &args.file)?
        }
        Command::Local(LocalCommand::Get { module, name, out }) => {
            commands::local_get_command(session, &module, &name, out.as_deref())?
        }
        Command::Local(LocalCommand::List { module }) => commands::local_list_command(session, &module)?,
        Command::WriteGraph { module, oid, function, out } => {
            commands::write_graph_command(session, &module, &oid, function.as_deref(), &out)?
        }
        Command::Serve { port, bind } => commands::serve_command(session, &bind, port)?,
    }
    Ok(())
}
