use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use beamd_analysis::{ModuleAnalysis, Options, dot, listing};
use beamd_file::BeamFile;
use beamd_file::code::CodeHeader;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "beamd", about = "BEAM module disassembler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show chunks, symbol table sizes and line table summary
    Info {
        /// Path to the .beam file
        input: PathBuf,
    },
    /// Disassemble a module, optionally interleaved with source lines
    Disasm {
        /// Path to the .beam file
        input: PathBuf,
        /// Source file to interleave; without one, source is rebuilt from
        /// debug info when the module carries it
        #[arg(short, long)]
        source: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = ListingFormat::Text)]
        format: ListingFormat,
        /// Only this function, as NAME/ARITY
        #[arg(long)]
        function: Option<String>,
        /// Print per-category instruction counts instead of the listing
        #[arg(long)]
        stats: bool,
        /// Truncate literals beyond this many characters
        #[arg(long, default_value_t = beamd_analysis::DEFAULT_LITERAL_WIDTH)]
        literal_width: usize,
        /// Judge source lines more than this far past a function's first
        /// line as distant
        #[arg(long)]
        near_window: Option<u32>,
    },
    /// Extract the static call graph
    Callgraph {
        /// Path to the .beam file
        input: PathBuf,
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Dot)]
        format: GraphFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ListingFormat {
    Text,
    Yaml,
}

#[derive(Clone, Copy, ValueEnum)]
enum GraphFormat {
    Dot,
    Yaml,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Info { input } => cmd_info(&input),
        Commands::Disasm {
            input,
            source,
            format,
            function,
            stats,
            literal_width,
            near_window,
        } => {
            let opts = Options {
                literal_width,
                near_window,
            };
            cmd_disasm(&input, source.as_deref(), format, function.as_deref(), stats, &opts)
        }
        Commands::Callgraph { input, format } => cmd_callgraph(&input, format),
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {e}");
    std::process::exit(1);
}

fn open(path: &Path) -> BeamFile {
    BeamFile::open(path).unwrap_or_else(|e| fail(e))
}

fn analyze(path: &Path, source: Option<&Path>, opts: &Options) -> ModuleAnalysis {
    let file = open(path);
    let mut text = source.and_then(beamd_analysis::load_source);
    if source.is_some() && text.is_none() {
        eprintln!("Warning: source unavailable, trying debug info");
    }
    if text.is_none() {
        text = beamd_analysis::debug_source(&file);
        if text.is_some() {
            log::info!("using source reconstructed from debug info");
        }
    }
    beamd_analysis::analyze(&file, text.as_ref(), opts).unwrap_or_else(|e| fail(e))
}

fn cmd_info(path: &Path) {
    let file = open(path);
    let module = file.module_name().unwrap_or_else(|e| fail(e));

    println!("=== BEAM File Info ===");
    println!("Module:           {module}");
    println!("File size:        {} bytes", file.data().len());
    println!("Chunks:");
    for (id, size) in file.chunk_sizes() {
        println!("  {id:<6} {size:>8} bytes");
    }

    match file.atoms() {
        Ok(atoms) => println!("Atoms:            {}", atoms.len()),
        Err(e) => println!("Atoms:            unreadable ({e})"),
    }
    match file.exports() {
        Ok(t) => println!("Exports:          {}", t.len()),
        Err(e) => println!("Exports:          unreadable ({e})"),
    }
    match file.imports() {
        Ok(t) => println!("Imports:          {}", t.len()),
        Err(e) => println!("Imports:          unreadable ({e})"),
    }
    match file.locals() {
        Ok(t) => println!("Locals:           {}", t.len()),
        Err(e) => println!("Locals:           unreadable ({e})"),
    }

    if file.chunk_opt("LitT").is_some() {
        println!("Literals:         {}", file.literals().len());
    }

    match file.chunk("Code").and_then(CodeHeader::parse) {
        Ok(h) => {
            println!("Instruction set:  {}", h.instruction_set);
            println!(
                "Max opcode:       {} (known up to {})",
                h.max_opcode,
                beamd_isa::MAX_OPCODE
            );
            println!("Labels:           {}", h.label_count);
            println!("Functions:        {}", h.function_count);
        }
        Err(e) => println!("Code:             unreadable ({e})"),
    }

    let lines = file.line_table();
    if lines.is_empty() {
        println!("Line entries:     none");
    } else {
        let (lo, hi) = lines
            .iter()
            .map(|(_, l)| l)
            .fold((u32::MAX, 0), |(lo, hi), l| (lo.min(l), hi.max(l)));
        println!("Line entries:     {} (lines {lo}..={hi})", lines.len());
    }
}

fn cmd_disasm(
    path: &Path,
    source: Option<&Path>,
    format: ListingFormat,
    function: Option<&str>,
    stats: bool,
    opts: &Options,
) {
    let mut analysis = analyze(path, source, opts);
    if let Some(signature) = function {
        let selected = analysis.function(signature).unwrap_or_else(|e| fail(e)).clone();
        analysis.functions = vec![selected];
    }

    match format {
        ListingFormat::Text if stats => {
            for f in &analysis.functions {
                print!("{}", listing::render_stats(f));
            }
        }
        ListingFormat::Text => print!("{}", listing::render_module(&analysis)),
        ListingFormat::Yaml => match serde_yaml::to_string(&analysis) {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => fail(e),
        },
    }
}

fn cmd_callgraph(path: &Path, format: GraphFormat) {
    let file = open(path);
    let analysis =
        beamd_analysis::analyze(&file, None, &Options::default()).unwrap_or_else(|e| fail(e));
    match format {
        GraphFormat::Dot => print!("{}", dot::render_dot(&analysis.module, &analysis.call_graph)),
        GraphFormat::Yaml => match serde_yaml::to_string(&analysis.call_graph) {
            Ok(yaml) => print!("{yaml}"),
            Err(e) => fail(e),
        },
    }
}
