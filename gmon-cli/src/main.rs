mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use gmon_core::{is_gprof_compatible, Binary, GmonDecoder, GprofSupport, ProgramContext};
use report::CallGraphReport;
use serde::Serialize;
use std::path::PathBuf;
use tabled::Table;
use tabled::settings::Style;

/// gprof profile inspection CLI
#[derive(Parser)]
#[command(
    name = "gmon",
    about = "Inspect gprof-instrumented ELF binaries and their gmon.out call graphs",
    version,
    author
)]
struct Cli {
    /// Path to the profiled program
    #[arg(required = true)]
    path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the program was built with -pg
    Check,
    /// Show all functions addresses can resolve to
    Functions,
    /// Decode a gmon.out file and show the call graph
    CallGraph {
        /// Profile data written by the program
        #[arg(default_value = "gmon.out")]
        gmon: PathBuf,
        /// Emit JSON instead of tables
        #[arg(long)]
        json: bool,
        /// Project name recorded with the arcs
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Serialize)]
struct JsonReport<'a> {
    program: String,
    format: String,
    records: u64,
    dropped: u64,
    functions: &'a [report::FunctionRow],
    arcs: &'a [report::ArcRow],
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let bin = Binary::open(&cli.path)?;

    match cli.command {
        Command::Check => {
            let support = GprofSupport::of(&bin);
            let verdict = if support.is_compatible() {
                "gprof-compatible".green()
            } else {
                "not built with -pg".red()
            };
            println!("{}: {}", cli.path.display(), verdict);
            println!("  mcount:   {}", support.mcount);
            println!("  mcleanup: {}", support.mcleanup);
            println!("  entry:    {:#x}", bin.entry);
            println!(
                "  symbols:  {}",
                if bin.is_stripped { ".eh_frame" } else { ".symtab" }
            );
            println!(
                "  lines:    {}",
                if bin.has_line_info() { "DWARF" } else { "none" }
            );
        }

        Command::Functions => {
            if bin.symbols.is_empty() {
                println!("No functions found (.symtab and .eh_frame missing).");
            } else {
                println!(
                    "{:<32} {:<18} {:<18} {:<10}",
                    "Function", "Start", "End", "Size"
                );
                println!("{}", "-".repeat(80));
                for (_, func) in bin.symbols.iter() {
                    println!(
                        "{:<32} 0x{:<16x} 0x{:<16x} {:<10}",
                        func.name, func.start, func.end, func.size
                    );
                }
            }
        }

        Command::CallGraph {
            gmon,
            json,
            project,
        } => {
            if !is_gprof_compatible(&bin) {
                log::warn!(
                    "{} does not reference mcount/mcleanup; was it built with -pg?",
                    cli.path.display()
                );
            }

            let mut context = ProgramContext::new(&cli.path);
            if let Some(project) = project {
                context = context.with_project(project);
            }

            let profile = GmonDecoder::for_binary(&bin, context)
                .read_file(&gmon)
                .with_context(|| format!("Failed to decode {}", gmon.display()))?;

            let mut report = CallGraphReport::new(&bin, profile.histogram.as_ref());
            profile.call_graph.populate(&mut report);
            let report = report.finish();

            if json {
                let out = JsonReport {
                    program: cli.path.display().to_string(),
                    format: format!("{:?}", profile.format),
                    records: profile.stats.records,
                    dropped: profile.stats.dropped,
                    functions: &report.functions,
                    arcs: &report.arcs,
                };
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }

            if report.functions.is_empty() {
                println!("No call-graph arcs resolved to known functions.");
            } else {
                println!("{}", "Functions".bold());
                let mut table = Table::new(&report.functions);
                table.with(Style::rounded());
                println!("{table}");

                println!("{}", "Call graph".bold());
                let mut table = Table::new(&report.arcs);
                table.with(Style::rounded());
                println!("{table}");
            }
            println!(
                "{} records, {} dropped (no symbol)",
                profile.stats.records, profile.stats.dropped
            );
        }
    }

    Ok(())
}
