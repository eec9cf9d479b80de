use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::info;

use exr_passes::config::{default_config_path, load_config};
use exr_passes::io::{export_preview, read_summary, PassManifest, PreviewFormat};
use exr_passes::processing::patterns::{fill_pattern, pattern_image};
use exr_passes::utils::DEFAULT_LAYER;
use exr_passes::{BlendMode, ExrProcessor, ImageData, Pattern, ProcessorConfig, RenderPass, ToneMapMode};

const USAGE: &str = "\
Usage: exr-passes [--config <file.json>] <command> [args]

Commands:
  info <file.exr> [--json]
  pack <out.exr> <in.exr>... [--manifest <out.json>]
  split <in.exr> <out_dir>
  preview <in.exr> <out.png|out.tiff> [--layer <name>] [--exposure <stops>] [--gamma <g>] [--tonemap <curve>]
  demo <out_dir> [--size <pixels>]";

/// Bad command line; reported with the usage text and exit code 2.
#[derive(Debug)]
struct UsageError(String);

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for UsageError {}

fn usage(message: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(UsageError(message.into()))
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        if let Some(usage_err) = err.downcast_ref::<UsageError>() {
            eprintln!("Error: {usage_err}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

enum Command {
    Help,
    Info { input: PathBuf, json: bool },
    Pack { output: PathBuf, inputs: Vec<PathBuf>, manifest: Option<PathBuf> },
    Split { input: PathBuf, out_dir: PathBuf },
    Preview {
        input: PathBuf,
        output: PathBuf,
        layer: Option<String>,
        exposure: Option<f32>,
        gamma: Option<f32>,
        tonemap: Option<ToneMapMode>,
    },
    Demo { out_dir: PathBuf, size: usize },
}

struct CliOptions {
    config: Option<PathBuf>,
    command: Command,
}

fn take_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| usage(format!("{flag} needs a value")))
}

fn parse_number<T: std::str::FromStr>(value: &str, flag: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| usage(format!("{flag} expects a number, got '{value}'")))
}

impl CliOptions {
    fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut config = None;
        let mut flags: Vec<(String, Option<String>)> = Vec::new();
        let mut positional: Vec<String> = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-h" | "--help" => return Ok(Self { config, command: Command::Help }),
                "--config" => config = Some(PathBuf::from(take_value(&mut args, "--config")?)),
                "--json" => flags.push((arg.clone(), None)),
                "--manifest" | "--layer" | "--exposure" | "--gamma" | "--tonemap" | "--size" => {
                    let value = take_value(&mut args, &arg)?;
                    flags.push((arg.clone(), Some(value)));
                }
                other if other.starts_with("--") => return Err(usage(format!("unknown option {other}"))),
                _ => positional.push(arg.clone()),
            }
        }

        let flag = |name: &str| flags.iter().find(|(f, _)| f == name).map(|(_, v)| v.clone());

        let mut positional = positional.into_iter();
        let name = positional.next().ok_or_else(|| usage("missing command"))?;
        let rest: Vec<PathBuf> = positional.map(PathBuf::from).collect();

        let command = match name.as_str() {
            "info" => {
                allow_flags(&flags, &["--json"])?;
                let [input] = expect_paths::<1>(rest, "info <file.exr>")?;
                Command::Info { input, json: flag("--json").is_some() }
            }
            "pack" => {
                allow_flags(&flags, &["--manifest"])?;
                if rest.len() < 2 {
                    return Err(usage("pack needs an output file and at least one input"));
                }
                let mut rest = rest.into_iter();
                let output = rest.next().ok_or_else(|| usage("pack needs an output file"))?;
                Command::Pack {
                    output,
                    inputs: rest.collect(),
                    manifest: flag("--manifest").flatten().map(PathBuf::from),
                }
            }
            "split" => {
                allow_flags(&flags, &[])?;
                let [input, out_dir] = expect_paths::<2>(rest, "split <in.exr> <out_dir>")?;
                Command::Split { input, out_dir }
            }
            "preview" => {
                allow_flags(&flags, &["--layer", "--exposure", "--gamma", "--tonemap"])?;
                let [input, output] = expect_paths::<2>(rest, "preview <in.exr> <out.png>")?;
                let exposure = flag("--exposure").flatten().map(|v| parse_number(&v, "--exposure")).transpose()?;
                let gamma = flag("--gamma").flatten().map(|v| parse_number(&v, "--gamma")).transpose()?;
                let tonemap = flag("--tonemap")
                    .flatten()
                    .map(|v| v.parse::<ToneMapMode>().map_err(|e| usage(e.to_string())))
                    .transpose()?;
                Command::Preview { input, output, layer: flag("--layer").flatten(), exposure, gamma, tonemap }
            }
            "demo" => {
                allow_flags(&flags, &["--size"])?;
                let [out_dir] = expect_paths::<1>(rest, "demo <out_dir>")?;
                let size = match flag("--size").flatten() {
                    Some(v) => parse_number::<usize>(&v, "--size")?,
                    None => 256,
                };
                if size == 0 {
                    return Err(usage("--size must be positive"));
                }
                Command::Demo { out_dir, size }
            }
            other => return Err(usage(format!("unknown command '{other}'"))),
        };
        Ok(Self { config, command })
    }
}

fn allow_flags(flags: &[(String, Option<String>)], allowed: &[&str]) -> Result<()> {
    match flags.iter().find(|(f, _)| !allowed.contains(&f.as_str())) {
        Some((f, _)) => Err(usage(format!("option {f} does not apply to this command"))),
        None => Ok(()),
    }
}

fn expect_paths<const N: usize>(paths: Vec<PathBuf>, shape: &str) -> Result<[PathBuf; N]> {
    let count = paths.len();
    paths
        .try_into()
        .map_err(|_| usage(format!("expected {shape} ({N} argument(s), got {count})")))
}

fn load_settings(explicit: Option<&Path>) -> Result<ProcessorConfig> {
    if let Some(path) = explicit {
        return load_config(path).with_context(|| format!("failed to load config {}", path.display()));
    }
    match default_config_path() {
        Ok(path) if path.exists() => {
            load_config(&path).with_context(|| format!("failed to load config {}", path.display()))
        }
        _ => Ok(ProcessorConfig::default()),
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    if let Command::Help = options.command {
        println!("{USAGE}");
        return Ok(());
    }

    let config = load_settings(options.config.as_deref())?;
    let threads = config.threads.unwrap_or_else(num_cpus::get).max(1);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .context("failed to initialize thread pool")?;

    let processor = ExrProcessor::with_write_options(config.write);
    match options.command {
        Command::Help => Ok(()),
        Command::Info { input, json } => cmd_info(&input, json),
        Command::Pack { output, inputs, manifest } => cmd_pack(&processor, &output, &inputs, manifest.as_deref()),
        Command::Split { input, out_dir } => cmd_split(&processor, &input, &out_dir),
        Command::Preview { input, output, layer, exposure, gamma, tonemap } => {
            let mut params = config.preview;
            params.exposure = exposure.unwrap_or(params.exposure);
            params.gamma = gamma.unwrap_or(params.gamma);
            params.tonemap = tonemap.unwrap_or(params.tonemap);
            let format = PreviewFormat::from_path(&output)
                .ok_or_else(|| usage(format!("cannot tell preview format from {}", output.display())))?;
            let passes = processor
                .load_multi_plane_exr(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let pass = pick_layer(&passes, layer.as_deref())?;
            export_preview(&pass.image, &output, format, &params)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!("OK: {} ({})", output.display(), pass.name);
            Ok(())
        }
        Command::Demo { out_dir, size } => cmd_demo(processor, &config, &out_dir, size),
    }
}

fn cmd_info(input: &Path, json: bool) -> Result<()> {
    let summary = read_summary(input).with_context(|| format!("failed to read {}", input.display()))?;
    if json {
        let manifest = PassManifest::from_summary(&summary);
        println!("{}", manifest.to_json().context("failed to serialize manifest")?);
    } else {
        for line in summary.lines() {
            println!("{line}");
        }
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_LAYER.to_string())
}

fn cmd_pack(processor: &ExrProcessor, output: &Path, inputs: &[PathBuf], manifest: Option<&Path>) -> Result<()> {
    let mut passes: Vec<RenderPass> = Vec::new();
    for input in inputs {
        let loaded = processor
            .load_multi_plane_exr(input)
            .with_context(|| format!("failed to read {}", input.display()))?;
        for mut pass in loaded {
            // un-prefixed channels are named after their file
            if pass.name == DEFAULT_LAYER {
                let stem = file_stem(input);
                pass.name = stem.clone();
                pass.layer_name = stem;
            }
            passes.push(pass);
        }
    }
    processor
        .save_multi_plane_exr(output, &passes)
        .with_context(|| format!("failed to write {}", output.display()))?;
    if let Some(manifest_path) = manifest {
        PassManifest::from_passes(output, &passes)
            .write(manifest_path)
            .with_context(|| format!("failed to write {}", manifest_path.display()))?;
    }
    println!("OK: {} ({} passes)", output.display(), passes.len());
    Ok(())
}

fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c == ':' { '_' } else { c })
        .collect()
}

fn cmd_split(processor: &ExrProcessor, input: &Path, out_dir: &Path) -> Result<()> {
    let passes = processor
        .load_multi_plane_exr(input)
        .with_context(|| format!("failed to read {}", input.display()))?;
    fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    for pass in &passes {
        let path = out_dir.join(format!("{}.exr", safe_file_name(&pass.name)));
        processor
            .save_exr(&path, &pass.image.to_rgba())
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("{}", path.display());
    }
    Ok(())
}

fn pick_layer<'a>(passes: &'a [RenderPass], layer: Option<&str>) -> Result<&'a RenderPass> {
    match layer {
        Some(name) => passes
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| anyhow!("layer '{name}' not found")),
        None => passes
            .iter()
            .find(|p| p.name == DEFAULT_LAYER)
            .or_else(|| passes.first())
            .ok_or_else(|| anyhow!("file has no layers")),
    }
}

fn emission_glow(image: &mut ImageData) {
    let (width, height) = image.dimensions();
    let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
    let radius = width.min(height) as f32 / 2.5;
    for y in 0..height {
        for x in 0..width {
            let dist = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
            let intensity = (1.0 - dist / radius).max(0.0);
            image.pixel_mut(x, y).copy_from_slice(&[intensity * 2.0, intensity * 0.5, intensity * 0.1]);
        }
    }
}

fn cmd_demo(mut processor: ExrProcessor, config: &ProcessorConfig, out_dir: &Path, size: usize) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("failed to create {}", out_dir.display()))?;
    let save = |processor: &ExrProcessor, name: &str, image: &ImageData| -> Result<()> {
        let path = out_dir.join(name);
        processor
            .save_exr(&path, &image.to_rgba())
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("wrote {}", path.display());
        Ok(())
    };

    // multi-pass render
    let layout = [
        ("beauty", 4, Pattern::Gradient),
        ("depth", 1, Pattern::Radial),
        ("normal", 3, Pattern::Checker { cell: 32 }),
        ("albedo", 3, Pattern::Solid { r: 0.6, g: 0.45, b: 0.3 }),
        ("specular", 3, Pattern::Solid { r: 0.8, g: 0.8, b: 0.9 }),
    ];
    for (name, channels, pattern) in layout {
        fill_pattern(&mut processor.add_render_pass(name, size, size, channels, false).image, pattern);
    }
    emission_glow(&mut processor.add_render_pass("emission", size, size, 3, false).image);

    let names = ["beauty", "depth", "normal", "albedo", "specular", "emission"];
    for name in names {
        if let Some(pass) = processor.render_pass(name) {
            save(&processor, &format!("pass_{name}.exr"), &pass.image)?;
        }
    }
    let composite = processor.composite_passes(&names)?;
    save(&processor, "composite_all_passes.exr", &composite)?;

    let multipass = out_dir.join("multipass.exr");
    processor
        .save_registered_passes(&multipass, &names)
        .with_context(|| format!("failed to write {}", multipass.display()))?;
    let passes: Vec<RenderPass> = names.iter().filter_map(|n| processor.render_pass(n).cloned()).collect();
    PassManifest::from_passes(&multipass, &passes).write(&out_dir.join("multipass.json"))?;

    // filters
    let filters = &config.filters;
    let test_image = pattern_image(size, size, Pattern::Checker { cell: 16 });
    save(&processor, "filter_original.exr", &test_image)?;

    let mut blurred = test_image.clone();
    processor.apply_gaussian_blur(&mut blurred, filters.blur_sigma)?;
    save(&processor, "filter_gaussian_blur.exr", &blurred)?;

    let mut sharpened = test_image.clone();
    processor.apply_sharpen(&mut sharpened, filters.sharpen_strength);
    save(&processor, "filter_sharpen.exr", &sharpened)?;

    let mut unsharp = blurred.clone();
    processor.apply_unsharp_mask(&mut unsharp, filters.unsharp_radius, filters.unsharp_amount, filters.unsharp_threshold)?;
    save(&processor, "filter_unsharp.exr", &unsharp)?;

    let mut edges = blurred.clone();
    processor.apply_edge_detection(&mut edges)?;
    save(&processor, "filter_edges.exr", &edges)?;

    let mut toned = composite.clone();
    processor.apply_tone_mapping(&mut toned, config.tone_mapping.exposure, config.tone_mapping.gamma);
    save(&processor, "filter_tonemap.exr", &toned)?;

    // blend modes
    let base = pattern_image(size, size, Pattern::Gradient);
    let overlay = pattern_image(size, size, Pattern::Radial);
    for mode in BlendMode::ALL {
        let mut result = base.clone();
        processor.blend_pass(&RenderPass::from_image("overlay", overlay.clone(), false), &mut result, mode, 0.7)?;
        save(&processor, &format!("composite_{mode}.exr"), &result)?;
    }

    let preview = out_dir.join("composite_all_passes.png");
    export_preview(&composite, &preview, PreviewFormat::Png16, &config.preview)
        .with_context(|| format!("failed to write {}", preview.display()))?;

    println!("OK: demo written to {}", out_dir.display());
    Ok(())
}
