//! uppc - Upp compiler driver.
//!
//! Loads source files, runs the front-end, and renders the error list.
//! With `--dump-program` the resolved program tree is printed; back-ends
//! consume the same data programmatically.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "uppc", version, about = "Upp language compiler front-end")]
struct Args {
    /// Source files to compile
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Print the resolved program tree
    #[arg(long)]
    dump_program: bool,

    /// Print the editor-info index summary
    #[arg(long)]
    dump_editor_info: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let args = Args::parse();
    match run(args) {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let mut sources = Vec::new();
    for path in &args.files {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        sources.push((path.display().to_string(), text));
    }
    let borrowed: Vec<(&str, &str)> = sources
        .iter()
        .map(|(path, text)| (path.as_str(), text.as_str()))
        .collect();

    info!(files = sources.len(), "compiling");
    let comp = upp_sem::compile_sources(&borrowed);

    let errors = comp.error_list();
    for error in &errors {
        let path = &comp.units[error.unit].buffer.path;
        eprintln!(
            "{}:{}:{}: error: {}",
            path,
            error.text_index.line + 1,
            error.text_index.character + 1,
            error.message
        );
    }

    if args.dump_program {
        dump_program(&comp);
    }
    if args.dump_editor_info {
        dump_editor_info(&comp);
    }

    let main_ok = comp
        .program
        .main_function
        .map(|main| comp.program.functions[main].is_runnable)
        .unwrap_or(false);
    if !main_ok {
        eprintln!("program is not runnable");
    }
    Ok(errors.is_empty() && main_ok)
}

fn dump_program(comp: &upp_sem::Compiler) {
    println!("functions ({}):", comp.program.functions.len());
    for (id, function) in comp.program.functions.iter_enumerated() {
        let signature = comp.types.signature(function.signature);
        let parameters: Vec<String> = signature
            .parameters
            .iter()
            .map(|p| {
                format!(
                    "{}: {}",
                    comp.pool.get(p.name),
                    comp.types.format_type(p.type_id, &comp.pool)
                )
            })
            .collect();
        let return_text = signature
            .return_type
            .map(|r| comp.types.format_type(r, &comp.pool))
            .unwrap_or_else(|| "()".to_string());
        let calls: Vec<String> = function
            .calls
            .iter()
            .map(|&callee| comp.pool.get(comp.program.functions[callee].name).to_string())
            .collect();
        println!(
            "  #{} {} :: ({}) -> {} [runnable: {}, errors: {}] calls: [{}]",
            id.0,
            comp.pool.get(function.name),
            parameters.join(", "),
            return_text,
            function.is_runnable,
            function.contains_errors,
            calls.join(", ")
        );
    }
    println!("globals ({}):", comp.program.globals.len());
    for (id, global) in comp.program.globals.iter_enumerated() {
        println!(
            "  #{} : {}",
            id.0,
            comp.types.format_type(global.type_id, &comp.pool)
        );
    }
    match comp.program.main_function {
        Some(main) => println!("main: #{}", main.0),
        None => println!("main: <none>"),
    }
}

fn dump_editor_info(comp: &upp_sem::Compiler) {
    println!("editor infos: {}", comp.editor.infos.len());
    for unit in comp.units.indices() {
        let line_count = comp.units[unit].buffer.line_count();
        for line in 0..line_count {
            let references = comp.editor.references_at(unit, line);
            if !references.is_empty() {
                println!(
                    "  {}:{} -> {} references",
                    comp.units[unit].buffer.path,
                    line + 1,
                    references.len()
                );
            }
        }
    }
}
