use clap::{ArgGroup, Parser};
use spz_gltf_lib::common::{ZSTD_DEFAULT_COMPRESSION_LVL, ZSTD_DEFAULT_WORKERS};
use spz_gltf_lib::{convert_json, convert_json_async, convert_ply, convert_ply_async};
use spz_gltf_lib::CompressOptions;
use std::error::Error;
use std::fs;
use std::io;
use std::path::Path;
use std::process;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(
    name = "SPZ glTF Converter",
    version = "1.0",
    author = "Denis Avvakumov",
    about = "Converts PLY or JSON splats into an SPZ-compressed glTF-Binary file",
    after_help = "Example: spz-gltf --input-ply input.ply --output output.glb"
)]
#[command(group(
    ArgGroup::new("input").required(true).args(&["input_ply", "input_json"])
))]
struct Cli {
    #[arg(
        long = "input-ply",
        visible_alias = "ip",
        value_name = "PLY",
        help = "PLY file to convert to an SPZ glTF."
    )]
    input_ply: Option<String>,

    #[arg(
        long = "input-json",
        visible_alias = "ij",
        value_name = "JSON",
        help = "JSON file to convert to an SPZ glTF."
    )]
    input_json: Option<String>,

    #[arg(
        short = 'o',
        long = "output",
        value_name = "OUTPUT",
        required = true,
        help = "Destination file for generated glTF."
    )]
    output: String,

    #[arg(
        short = 'c',
        long = "compression-level",
        value_name = "LEVEL",
        default_value_t = ZSTD_DEFAULT_COMPRESSION_LVL,
        help = "Set the compression level."
    )]
    compression_level: u32,

    #[arg(
        short = 'w',
        long = "workers",
        value_name = "WORKERS",
        default_value_t = ZSTD_DEFAULT_WORKERS,
        help = "Set the workers count for ZSTD."
    )]
    workers: u32,

    #[arg(
        short = 'a',
        long = "async",
        default_value = "false",
        help = "Enable asynchronous conversion mode."
    )]
    async_mode: bool,
}

#[derive(Debug, Clone, Copy)]
enum Input<'a> {
    Ply(&'a str),
    Json(&'a str),
}

impl Cli {
    fn input(&self) -> Option<Input<'_>> {
        match (&self.input_ply, &self.input_json) {
            (Some(ply), _) => Some(Input::Ply(ply)),
            (None, Some(json)) => Some(Input::Json(json)),
            (None, None) => None,
        }
    }

    fn compress_options(&self) -> CompressOptions {
        CompressOptions {
            level: self.compression_level,
            workers: self.workers,
        }
    }
}

impl Input<'_> {
    fn path(&self) -> &str {
        match self {
            Input::Ply(p) | Input::Json(p) => p,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Input::Ply(_) => "PLY",
            Input::Json(_) => "JSON",
        }
    }
}

/// Picks the input file and checks that it exists.
fn resolve_input(cli: &Cli) -> Result<Input<'_>, String> {
    let input = cli
        .input()
        .ok_or_else(|| "Error: either PLY or JSON input file required".to_string())?;
    if !Path::new(input.path()).exists() {
        return Err(format!("Error: File {} does not exist.", input.path()));
    }
    Ok(input)
}

fn write_error(output: &str, e: io::Error) -> String {
    format!("Error writing output '{}': {}", output, e)
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    process::exit(1);
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    env_logger::init();
    let cli = Cli::parse();
    let input = resolve_input(&cli).unwrap_or_else(|msg| fail(msg));

    let raw_data = fs::read(input.path()).unwrap_or_else(|e| {
        fail(format!("Error reading input file {}: {}", input.path(), e))
    });

    let mode = if cli.async_mode {
        "Asynchronous"
    } else {
        "Synchronous"
    };
    let options = cli.compress_options();

    println!(
        "Mode: {} {} conversion\nInput: {} | Output: {} | Level: {}",
        mode,
        input.kind(),
        input.path(),
        cli.output,
        options.clamped_level()
    );
    log::debug!("Compression options: {:?}", options);

    let start = Instant::now();

    let result: Vec<u8> = if cli.async_mode {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            let glb = match input {
                Input::Ply(_) => convert_ply_async(&raw_data, &options).await,
                Input::Json(_) => convert_json_async(&raw_data, &options).await,
            }
            .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
            tokio::fs::write(&cli.output, &glb)
                .await
                .unwrap_or_else(|e| fail(write_error(&cli.output, e)));
            Ok::<Vec<u8>, Box<dyn Error + Send + Sync>>(glb)
        })?
    } else {
        let glb = match input {
            Input::Ply(_) => convert_ply(&raw_data, &options),
            Input::Json(_) => convert_json(&raw_data, &options),
        }
        .map_err(|e| Box::new(e) as Box<dyn Error + Send + Sync>)?;
        fs::write(&cli.output, &glb).unwrap_or_else(|e| fail(write_error(&cli.output, e)));
        glb
    };

    let elapsed = start.elapsed().as_millis();
    println!("Conversion Time: {} ms ({} bytes)", elapsed, result.len());
    println!("wrote gltf to {}", cli.output);

    Ok(())
}
