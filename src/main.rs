//! Tonestack CLI - tile-parallel filters and exposure-fusion tone mapping.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tonestack::prelude::*;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        return;
    }

    let result = match args[1].as_str() {
        "list" => list_filters(args.iter().any(|a| a == "--json")),
        "info" => match args.get(2) {
            Some(id) => filter_info(id),
            None => Err(anyhow::anyhow!("Please specify a filter ID")),
        },
        "process" => {
            if args.len() < 5 {
                eprintln!(
                    "Usage: {} process <filter> <input> <output> [--config <file>] [--tile <WxH>] [--sequential]",
                    args[0]
                );
                std::process::exit(2);
            }
            process_image(&args[2..])
        }
        "tonemap" => {
            if args.len() < 3 {
                eprintln!(
                    "Usage: {} tonemap <output> <input>... [--stack <glob|dir>] [--config <file>] [--tile <WxH>] [--sequential]",
                    args[0]
                );
                std::process::exit(2);
            }
            tone_map(&args[2..])
        }
        "help" | "--help" | "-h" => {
            print_usage(&args[0]);
            Ok(())
        }
        _ => {
            eprintln!("Unknown command: {}", args[1]);
            print_usage(&args[0]);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("❌ {:#}", e);
        std::process::exit(1);
    }
}

fn print_usage(program: &str) {
    println!("🎞️  Tonestack v{}", tonestack::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list [--json]                         List all available filters");
    println!("  info <filter>                         Show detailed info about a filter");
    println!("  process <filter> <in> <out> [opts]    Run one filter on an image");
    println!("  tonemap <out> <in>... [opts]          Tone map an HDR image or fuse an exposure stack");
    println!("  help                                  Show this help message");
    println!();
    println!("Options:");
    println!("  --config <file>     TOML settings file");
    println!("  --tile <WxH>        Tile size (default: 128x128)");
    println!("  --sequential        Process tiles on one thread");
    println!("  --stack <glob|dir>  Add every image matching a pattern or inside a directory");
}

/// Options shared by `process` and `tonemap`.
struct RunOptions {
    settings: Settings,
    positional: Vec<String>,
    stack_sources: Vec<String>,
}

fn parse_options(args: &[String]) -> Result<RunOptions> {
    let mut settings = Settings::default();
    let mut tile: Option<(usize, usize)> = None;
    let mut sequential = false;
    let mut positional = Vec::new();
    let mut stack_sources = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                settings = Settings::load(&args[i + 1])
                    .with_context(|| format!("Failed to load settings from {}", args[i + 1]))?;
                i += 2;
            }
            "--tile" if i + 1 < args.len() => {
                tile = Some(
                    parse_dimensions(&args[i + 1])
                        .with_context(|| format!("Invalid tile size '{}'", args[i + 1]))?,
                );
                i += 2;
            }
            "--stack" if i + 1 < args.len() => {
                stack_sources.push(args[i + 1].clone());
                i += 2;
            }
            "--sequential" => {
                sequential = true;
                i += 1;
            }
            option if option.starts_with("--") => bail!("Unknown option: {}", option),
            value => {
                positional.push(value.to_string());
                i += 1;
            }
        }
    }

    // Command line flags override the settings file.
    if let Some((w, h)) = tile {
        settings.processing = settings.processing.with_tile_size(w, h);
    }
    if sequential {
        settings.processing = settings.processing.with_parallel(false);
    }

    Ok(RunOptions {
        settings,
        positional,
        stack_sources,
    })
}

fn parse_dimensions(s: &str) -> Option<(usize, usize)> {
    let (w, h) = s.split_once('x')?;
    let (w, h) = (w.parse().ok()?, h.parse().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

fn list_filters(json: bool) -> Result<()> {
    let registry = FilterRegistry::with_builtins();

    if json {
        let metadata: Vec<&FilterMetadata> = registry
            .filters()
            .filter(|(_, entry)| entry.enabled)
            .map(|(_, entry)| &entry.metadata)
            .collect();
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        return Ok(());
    }

    println!("Available filters ({} total):", registry.len());
    println!();
    for (category, filters) in registry.grouped_by_category() {
        println!("  📁 {}", category.display_name());
        for metadata in filters {
            println!("      • {} - {}", metadata.id, metadata.description);
        }
        println!();
    }
    Ok(())
}

fn filter_info(filter_id: &str) -> Result<()> {
    let registry = FilterRegistry::with_builtins();
    let Some(metadata) = registry.get_metadata(filter_id) else {
        eprintln!("Use 'list' to see available filters.");
        bail!("Filter not found: {}", filter_id);
    };

    println!("Filter: {}", metadata.name);
    println!("ID: {}", metadata.id);
    println!("Category: {}", metadata.category.display_name());
    println!("Minimum inputs: {}", metadata.min_inputs);
    println!();
    println!("Description:");
    println!("  {}", metadata.description);
    Ok(())
}

fn process_image(args: &[String]) -> Result<()> {
    let options = parse_options(args)?;
    let [filter_id, input_path, output_path] = options.positional.as_slice() else {
        bail!("Expected <filter> <input> <output>, got {:?}", options.positional);
    };

    let registry = FilterRegistry::with_builtins();
    let mut filter = registry
        .create(filter_id, &options.settings)
        .with_context(|| format!("Cannot create filter '{}'", filter_id))?;

    let input = tonestack::io::load(input_path).with_context(|| format!("Failed to load {}", input_path))?;
    println!("⚙️  {} {} ({}) -> {}", filter_id, input_path, input.shape(), output_path);

    let start = std::time::Instant::now();
    let Some(output) = filter.execute_with(&[&input], None, &options.settings.processing)? else {
        bail!("Filter '{}' produced no output for {}", filter_id, input.shape());
    };

    tonestack::io::save(&output, output_path).with_context(|| format!("Failed to save {}", output_path))?;
    println!("✅ Complete in {}ms ({})", start.elapsed().as_millis(), output.shape());
    Ok(())
}

fn tone_map(args: &[String]) -> Result<()> {
    let options = parse_options(args)?;
    let Some((output_path, inputs)) = options.positional.split_first() else {
        bail!("Expected <output> <input>...");
    };

    let mut paths: Vec<PathBuf> = inputs.iter().map(PathBuf::from).collect();
    for source in &options.stack_sources {
        let expanded = tonestack::io::expand_stack_source(source)
            .with_context(|| format!("Failed to expand stack source '{}'", source))?;
        if expanded.is_empty() {
            println!("⚠️  No images found for '{}'", source);
        }
        paths.extend(expanded);
    }
    if paths.is_empty() {
        bail!("No input images");
    }

    println!("🔍 Loading {} image(s)...", paths.len());
    let images = tonestack::io::load_stack(&paths).context("Failed to load input images")?;
    let refs: Vec<&Image> = images.iter().collect();
    if refs.len() > 1 {
        let status = StackStatus::of(&refs);
        if !status.is_ready() {
            bail!("Cannot fuse stack: {}", status);
        }
    }

    let mut tmo = RamanTmo::from_settings(&options.settings)?;
    println!(
        "⚙️  Tone mapping {} -> {}",
        if refs.len() == 1 { "HDR image" } else { "exposure stack" },
        output_path
    );

    let start = std::time::Instant::now();
    let output = tmo
        .process(&refs, None)?
        .context("Tone mapping produced no output")?;

    tonestack::io::save(&output, output_path).with_context(|| format!("Failed to save {}", output_path))?;
    println!("✅ Complete in {}ms", start.elapsed().as_millis());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_dimensions() {
        assert_eq!(parse_dimensions("64x32"), Some((64, 32)));
        assert_eq!(parse_dimensions("0x32"), None);
        assert_eq!(parse_dimensions("64"), None);
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options(&strings(&[
            "out.png",
            "--tile",
            "16x8",
            "a.png",
            "--sequential",
            "--stack",
            "dir/*.png",
        ]))
        .unwrap();

        assert_eq!(options.positional, vec!["out.png", "a.png"]);
        assert_eq!(options.stack_sources, vec!["dir/*.png"]);
        assert!(!options.settings.processing.parallel);
        assert_eq!(
            options.settings.processing.strategy,
            TilingStrategy::Blocks { width: 16, height: 8 }
        );
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(parse_options(&strings(&["--bogus"])).is_err());
    }
}
