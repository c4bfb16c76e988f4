mod cli;

use camkeep::{config, run};
use ck_av::{ToolRegistry, FFMPEG, UNTRUNC};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "camkeep=trace,ck_core=trace,ck_av=trace,ck_capture=trace,ck_repair=trace".to_string()
        } else {
            "camkeep=info,ck_core=info,ck_av=info,ck_capture=info,ck_repair=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Capture => {
            let (_, config) = config::load(cli.config.as_deref())?;
            let tools = ToolRegistry::discover(&config.tools);
            tools.require(FFMPEG)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::capture(&config, &tools))
        }
        Commands::Repair { once } => {
            let (_, config) = config::load(cli.config.as_deref())?;
            let tools = ToolRegistry::discover(&config.tools);
            tools.require(FFMPEG)?;
            tools.require(UNTRUNC)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::repair(&config, &tools, once))
        }
        Commands::CheckTools { json } => check_tools(cli.config.as_deref(), json),
        Commands::Validate => validate_config(cli.config.as_deref()),
        Commands::Version => {
            println!("camkeep {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn check_tools(config_path: Option<&Path>, json: bool) -> Result<()> {
    // Tool paths may be overridden in the config; fall back to PATH without one.
    let tools_config = match config::locate(config_path) {
        Ok(path) => ck_core::config::Config::load(&path)?.tools,
        Err(_) => ck_core::config::ToolsConfig::default(),
    };
    let tools = ToolRegistry::discover(&tools_config).check_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(());
    }

    println!("Checking external tools...\n");
    let mut all_ok = true;
    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. capture needs ffmpeg; repair needs ffmpeg and untrunc.");
    }
    Ok(())
}

fn validate_config(config_path: Option<&Path>) -> Result<()> {
    let (path, config) = config::load(config_path)?;

    println!("Validating config: {:?}", path);
    println!("✓ Configuration is valid");
    println!("  Capture root: {}", config.capture_root().display());
    println!(
        "  Segments: {}s, wrap {}",
        config.segment.length_secs, config.segment.wrap
    );
    println!(
        "  Health: poll {}s, dead after {}s",
        config.health.poll_interval_secs, config.health.dead_time_secs
    );
    println!("  Min free disk: {}%", config.disk.min_free_percent);
    println!("  Repair interval: {}s", config.repair.interval_secs);
    println!("  Cameras: {}", config.cameras.len());
    for camera in &config.cameras {
        let streams: Vec<&str> = camera.streams.iter().map(|s| s.name.as_str()).collect();
        println!(
            "    {} ({}): streams [{}]{}",
            camera.name,
            camera.ip,
            streams.join(", "),
            if camera.reboots_on_failure() {
                ", reboot on failure"
            } else {
                ""
            }
        );
    }

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("  Warnings:");
        for warning in warnings {
            println!("    - {warning}");
        }
    }
    Ok(())
}
