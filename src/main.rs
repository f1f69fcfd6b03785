use std::path::PathBuf;

use clap::{Parser, Subcommand};
use symgen::codegen::C99CodeGen;
use symgen::cr3bp;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Derive the CR3BP routines and write C99 sources
  Generate {
    /// Directory to write c_CR3BP.c and c_CR3BP.h into
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
  },
}

fn main() -> anyhow::Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Generate { out_dir } => {
      let routines = cr3bp::routines()?;
      let prefix = out_dir.join("c_CR3BP");
      C99CodeGen::new().write(&routines, &prefix)?;
      println!("wrote {}.c and {}.h", prefix.display(), prefix.display());
    }
  }

  Ok(())
}
