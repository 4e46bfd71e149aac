use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sm_music_core::Extractor;

#[derive(Parser, Debug)]
#[command(author, version, about = "Extract Super Metroid's music engine data as JSON", long_about = None)]
struct Args {
    /// ROM file to read (unmodified; this binary never writes to it)
    rom_path: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let Some(rom_path) = args.rom_path else {
        eprintln!("error: must specify a rom file, e.g. `extract rom.sfc`");
        return ExitCode::from(1);
    };

    info!("reading rom: {}", rom_path.display());
    let rom_bytes = match fs::read(&rom_path) {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("error: could not read {}: {err}", rom_path.display());
            return ExitCode::FAILURE;
        }
    };

    let romname = rom_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| rom_path.display().to_string());

    match Extractor::extract(&rom_bytes, &romname) {
        Ok(music) => match serde_json::to_writer_pretty(std::io::stdout(), &music) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                eprintln!("error: could not write json: {err}");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!("extraction failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
