//! stabscope - C++ program structure from legacy Mach-O binaries
//!
//! Usage:
//!   stabscope <binary> info                List reconstruction totals
//!   stabscope <binary> classes             Dump classes with bases and vtables
//!   stabscope <binary> functions           Dump functions with variants
//!   stabscope <binary> sources             Dump compilation units
//!   stabscope <binary> namespaces          Dump the namespace tree
//!
//! The binary must be a 32-bit Mach-O (thin or fat) with STABS debug
//! symbols; pick the slice with `--cpu i386` or `--cpu ppc`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use stabscope_analysis::{Reconstructor, ReconstructorConfig};
use stabscope_core::{BaseVisibility, EntityIndex, ProgramModel};
use stabscope_formats::{CpuType, MachImage};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stabscope")]
#[command(about = "Reconstructs C++ program structure from legacy Mach-O binaries", long_about = None)]
struct Cli {
    /// Path to the binary file
    binary: PathBuf,

    /// CPU slice to analyze
    #[arg(long, value_enum, default_value_t = CpuArg::I386)]
    cpu: CpuArg,

    /// Fail on typeinfo records with diamond/repeated-inheritance flags
    #[arg(long)]
    strict_vmi: bool,

    /// Show per-pass progress
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum CpuArg {
    I386,
    Ppc,
}

impl From<CpuArg> for CpuType {
    fn from(arg: CpuArg) -> Self {
        match arg {
            CpuArg::I386 => CpuType::I386,
            CpuArg::Ppc => CpuType::PowerPc,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show reconstruction totals
    Info,
    /// Dump classes with inheritance and vtables
    Classes {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Dump functions with their variants
    Functions {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Dump compilation units with address ranges
    Sources,
    /// Dump the namespace tree
    Namespaces,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut image = MachImage::load(&cli.binary, cli.cpu.into())
        .with_context(|| format!("failed to load {}", cli.binary.display()))?;

    let model = Reconstructor::load(
        &mut image,
        ReconstructorConfig {
            strict_vmi: cli.strict_vmi,
        },
    )
    .context("reconstruction failed")?;

    match cli.command.unwrap_or(Commands::Info) {
        Commands::Info => print_info(&model),
        Commands::Classes { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&model.classes)?);
            } else {
                print_classes(&model);
            }
        }
        Commands::Functions { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&model.functions)?);
            } else {
                print_functions(&model);
            }
        }
        Commands::Sources => print_sources(&model),
        Commands::Namespaces => print_namespaces(&model),
    }

    Ok(())
}

fn print_info(model: &ProgramModel) {
    println!("namespaces:   {}", model.namespaces.len());
    println!("classes:      {}", model.classes.len());
    println!("enums:        {}", model.enums.len());
    println!("functions:    {}", model.functions.len());
    println!("thunks:       {}", model.thunks.len());
    println!("source files: {}", model.source_files.len());
    println!("header files: {}", model.header_files.len());
}

fn print_classes(model: &ProgramModel) {
    for class in &model.classes {
        if class.size > 0 {
            println!("class {} // size {}", class.name, class.size);
        } else {
            println!("class {}", class.name);
        }

        for base in &class.direct_base_classes {
            let name = base
                .class
                .get()
                .map(|i| model.classes[i].name.as_str())
                .unwrap_or("?");
            let visibility = match base.visibility {
                BaseVisibility::Public => "public ",
                BaseVisibility::PrivateOrProtected => "private/protected ",
                BaseVisibility::Unknown => "",
            };
            let virtualness = if base.is_virtual { "virtual " } else { "" };
            println!("    : {visibility}{virtualness}{name} @ {}", base.base_offset);
        }

        for vtable in &class.vtables {
            if vtable.offset == 0 {
                println!("    vtable");
            } else {
                println!("    vtable @ {}", vtable.offset);
            }
            for entry in &vtable.entries {
                let mut notes = Vec::new();
                if entry.is_pure_virtual {
                    notes.push("pure");
                }
                if entry.is_override {
                    notes.push("override");
                }
                if entry.is_implicit {
                    notes.push("implicit");
                }
                if entry.thunk.is_valid() {
                    notes.push("thunk");
                }
                let name = if entry.name.is_empty() {
                    "?"
                } else {
                    entry.name.as_str()
                };
                if notes.is_empty() {
                    println!("        {name}");
                } else {
                    println!("        {name} // {}", notes.join(", "));
                }
            }
        }
    }
}

fn print_functions(model: &ProgramModel) {
    for function in &model.functions {
        let source = function
            .source_file
            .get()
            .map(|i| model.source_files[i].name.as_str())
            .unwrap_or("?");
        println!("{} // {}", function.name, source);
        for variant in &function.variants {
            println!(
                "    {:#010x}..{:#010x} line {}",
                variant.address,
                variant.address_end(),
                variant.source_line
            );
        }
    }
}

fn print_sources(model: &ProgramModel) {
    for source_file in &model.source_files {
        println!(
            "{} {:#010x}..{:#010x} ({} functions, {} headers)",
            source_file.name,
            source_file.address_begin,
            source_file.address_end,
            source_file.functions.len(),
            source_file.header_files.len()
        );
    }
}

fn print_namespaces(model: &ProgramModel) {
    fn print_tree(model: &ProgramModel, index: usize, depth: usize) {
        let namespace = &model.namespaces[index];
        println!(
            "{}{} ({} classes, {} functions)",
            "    ".repeat(depth),
            namespace.short_name,
            namespace.classes.len(),
            namespace.functions.len()
        );
        for child in &namespace.child_namespaces {
            if let Some(child_index) = child.get() {
                print_tree(model, child_index, depth + 1);
            }
        }
    }

    for (index, namespace) in model.namespaces.iter().enumerate() {
        if namespace.parent_namespace == EntityIndex::INVALID {
            print_tree(model, index, 0);
        }
    }
}
