use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use log::{error, info};
use sm_music_core::{MusicJson, Rule};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum RuleArg {
    /// Re-randomize the first 4 voices' melodic intervals per song
    IntervalRandomize,
    /// Reverse the first 3 voices' note sequence per song
    Reverse,
    /// Write each note's own pitch back unchanged (idempotence check)
    Identity,
}

impl From<RuleArg> for Rule {
    fn from(arg: RuleArg) -> Rule {
        match arg {
            RuleArg::IntervalRandomize => Rule::IntervalRandomize,
            RuleArg::Reverse => Rule::ReverseSequence,
            RuleArg::Identity => Rule::Identity,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Rewrite note bytes in a ROM from a previously extracted music.json", long_about = None)]
struct Args {
    /// ROM file to rewrite in place
    rom_path: Option<PathBuf>,

    /// Which rewriting rule to apply
    #[arg(long, value_enum, default_value_t = RuleArg::IntervalRandomize)]
    rule: RuleArg,

    /// Where to read the previously extracted JSON tree from
    #[arg(long, default_value = "music.json")]
    json_path: PathBuf,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let Some(rom_path) = args.rom_path else {
        eprintln!("error: must specify a rom file whose music WILL BE OVERWRITTEN");
        return ExitCode::from(1);
    };

    let json_text = match fs::read_to_string(&args.json_path) {
        Ok(text) => text,
        Err(err) => {
            eprintln!("error: could not read {}: {err}", args.json_path.display());
            return ExitCode::FAILURE;
        }
    };
    let music: MusicJson = match serde_json::from_str(&json_text) {
        Ok(music) => music,
        Err(err) => {
            eprintln!("error: {} did not parse as music json: {err}", args.json_path.display());
            return ExitCode::FAILURE;
        }
    };

    info!("rewriting {} with rule {:?}", rom_path.display(), args.rule);
    match sm_music_core::modify::apply(&music, &rom_path, args.rule.into()) {
        Ok(()) => {
            println!("Done. Your ROM was modified.");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("modification failed: {err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
