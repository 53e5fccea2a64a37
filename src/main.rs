use clap::{Parser, Subcommand};
use std::fs;
use std::process::ExitCode;
use wasmvm::parser;
use wasmvm::runtime::Vm;

#[derive(Parser)]
#[command(name = "wasmvm")]
#[command(about = "WebAssembly MVP-subset interpreter")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a module's exported main function
    Run {
        /// Path to the WebAssembly module
        file: String,

        /// Arguments for main, one per declared parameter (after --)
        #[arg(last = true)]
        args: Vec<String>,
    },

    /// Print a summary of a module's sections
    Info {
        /// Path to the WebAssembly module
        file: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, args } => run_module(&file, args),
        Commands::Info { file } => dump_info(&file),
    }
}

fn load_module(file: &str) -> Result<parser::module::Module, ExitCode> {
    let bytes = match fs::read(file) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading {}: {}", file, e);
            return Err(ExitCode::FAILURE);
        }
    };

    match parser::parse(&bytes) {
        Ok(m) => Ok(m),
        Err(e) => {
            eprintln!("Error parsing {}: {}", file, e);
            Err(ExitCode::FAILURE)
        }
    }
}

fn run_module(file: &str, args: Vec<String>) -> ExitCode {
    let module = match load_module(file) {
        Ok(m) => m,
        Err(code) => return code,
    };

    // Traps are already reported on stdout by the engine; only driver-level
    // failures surface here.
    let mut vm = Vm::new(&module);
    match vm.run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dump_info(file: &str) -> ExitCode {
    let module = match load_module(file) {
        Ok(m) => m,
        Err(code) => return code,
    };

    println!("types:     {}", module.types.len());
    println!("imports:   {}", module.imports.len());
    println!("functions: {}", module.functions.len());
    println!("tables:    {}", module.tables.len());
    println!("memories:  {}", module.memories.len());
    println!("globals:   {}", module.globals.len());
    println!("exports:   {}", module.exports.len());
    println!("elements:  {}", module.elements.len());
    println!("data:      {}", module.data.len());
    for export in &module.exports {
        println!("  export {:?} ({:?}) -> {}", export.name, export.kind, export.index);
    }
    ExitCode::SUCCESS
}
