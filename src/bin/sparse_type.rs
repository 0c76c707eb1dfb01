//! Developer tool for textual sparse buffer types.
//!
//! `check` parses every line of a file (or stdin), validates it and prints the
//! canonical form. `tile` extracts a dense or strided tile from one type.

use std::fs;
use std::io::{self, Read};
use std::process;

use clap::{Parser, Subcommand};
use sparse_buffer::asm::try_parse_sparse_buffer;
use sparse_buffer::core::{Shape, TypeUniquer};
use sparse_buffer::types::NdType;

#[derive(Parser, Debug)]
#[command(name = "sparse-type", about = "Parse, validate and tile sparse buffer types")]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate one type per line and print its canonical form
    Check {
        /// Input file; stdin when omitted
        file: Option<String>,
    },
    /// Extract a tile from a type
    Tile {
        #[arg(long, value_delimiter = ',', required = true)]
        offsets: Vec<i64>,

        #[arg(long, value_delimiter = ',', required = true)]
        shape: Vec<i64>,

        /// Element strides; produces a strided view instead of a dense tile
        #[arg(long, value_delimiter = ',')]
        strides: Option<Vec<i64>>,

        /// The type to tile
        ty: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let result = match cli.command {
        Command::Check { file } => run_check(file.as_deref()),
        Command::Tile {
            offsets,
            shape,
            strides,
            ty,
        } => run_tile(&ty, Shape::new(offsets), Shape::new(shape), strides.as_deref()),
    };
    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn read_input(file: Option<&str>) -> io::Result<String> {
    match file {
        Some(path) => fs::read_to_string(path),
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn run_check(file: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let text = read_input(file)?;
    let uniquer = TypeUniquer::new();
    let mut failures = 0;
    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        match try_parse_sparse_buffer(line) {
            Ok(ty) => {
                println!("{ty}");
                uniquer.get_or_intern(ty);
            }
            Err(e) => {
                eprintln!("line {}: {e}", line_no + 1);
                failures += 1;
            }
        }
    }
    log::info!("{} distinct types", uniquer.stats().unique_types);
    if failures > 0 {
        return Err(format!("{failures} invalid type(s)").into());
    }
    Ok(())
}

fn run_tile(
    text: &str,
    offsets: Shape,
    shape: Shape,
    strides: Option<&[i64]>,
) -> Result<(), Box<dyn std::error::Error>> {
    let ty = try_parse_sparse_buffer(text)?;
    let tile = match strides {
        Some(strides) => ty.extract_view_tile(&offsets, &shape, strides)?,
        None => ty.extract_dense_tile(&offsets, &shape)?,
    };
    println!("{tile}");
    Ok(())
}
