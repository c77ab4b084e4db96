use crate::config::load_config;
use crate::placement::place_scene;
use crate::placement_dump::{write_placement_dump, write_placement_dump_file};
use crate::scene::Scene;
use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "symplace", version, about = "Place map labels for one frame and dump the result")]
pub struct Args {
    /// Scene file (JSON or JSON5) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Output file. Defaults to stdout.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Config JSON file
    #[arg(short = 'c', long = "configFile")]
    pub config: Option<PathBuf>,

    /// Pretty-print the JSON output
    #[arg(long = "pretty")]
    pub pretty: bool,

    /// Override the viewport width
    #[arg(short = 'w', long = "width")]
    pub width: Option<f64>,

    /// Override the viewport height
    #[arg(short = 'H', long = "height")]
    pub height: Option<f64>,
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    let input = read_input(args.input.as_deref())?;
    let mut scene = Scene::parse(&input).context("invalid scene")?;
    if let Some(width) = args.width {
        scene.transform.width = width;
    }
    if let Some(height) = args.height {
        scene.transform.height = height;
    }

    let result = place_scene(&mut scene, &config).context("invalid scene")?;
    match args.output.as_deref() {
        Some(path) => write_placement_dump_file(path, &result, args.pretty)?,
        None => {
            let stdout = io::stdout();
            write_placement_dump(stdout.lock(), &result, args.pretty)?;
            println!();
        }
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path {
        if path != Path::new("-") {
            return std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()));
        }
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
