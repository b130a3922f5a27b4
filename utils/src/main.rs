use crate::{
    cli::{Cli, CliAction, ConfigAction},
    watch::SimulatedCore,
};
use clap::Parser;
use memscope_config::{CONFIG_LOCATION, InspectorConfig, STORAGE_DIRECTORY};
use memscope_runtime::{Inspector, memory::Address, session::InspectorSession};
use std::{
    error::Error,
    fs::{File, create_dir_all},
    ops::Deref,
    path::Path,
    process::ExitCode,
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cli;
mod watch;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Cli::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("{}", error);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<(), Box<dyn Error>> {
    let config_location = args
        .config
        .clone()
        .unwrap_or_else(|| CONFIG_LOCATION.deref().clone());

    if let CliAction::Config(ConfigAction::Init) = args.action {
        let _ = create_dir_all(STORAGE_DIRECTORY.deref());
        InspectorConfig::default().save(File::create(&config_location)?)?;
        tracing::info!("Wrote default config to {}", config_location.display());

        return Ok(());
    }

    let config = load_config(&config_location)?;

    if let CliAction::Config(ConfigAction::Show) = args.action {
        return Ok(config.save(std::io::stdout().lock())?);
    }

    let inspector = Inspector::from_config(&config)?;

    for (name, path) in &args.images {
        let region = inspector
            .address_space
            .regions()
            .by_name(name)
            .ok_or_else(|| format!("No region named {name:?}"))?;
        let contents = std::fs::read(path)?;

        inspector.address_space.load(region.base(), &contents)?;
        tracing::info!(
            "Loaded {} bytes from {} into {}",
            contents.len(),
            path.display(),
            name
        );
    }

    match args.action {
        CliAction::Regions => {
            for region in inspector.address_space.regions().iter() {
                println!(
                    "{:>4}  {:08X}-{:08X}  {}{}  {}",
                    region.id().to_string(),
                    region.range().start(),
                    region.range().end(),
                    if region.readable() { 'r' } else { '-' },
                    if region.writable() { 'w' } else { '-' },
                    region.name()
                );
            }
        }
        CliAction::Dump {
            address,
            rows,
            width,
        } => {
            let mut session = inspector.open_session();

            if let Some(width) = width {
                session.set_cell_width(width)?;
            }
            if let Some(rows) = rows {
                session.set_rows(rows)?;
            }
            show_from(&mut session, address)?;
            print_rows(&mut session)?;
        }
        CliAction::Poke { address, bytes } => {
            inspector.editor.apply_bytes(address, &bytes)?;

            let mut session = inspector.open_session();
            session.set_rows(1)?;
            show_from(&mut session, address)?;
            print_rows(&mut session)?;
        }
        CliAction::Watch { address, frames } => {
            watch(&inspector, address, frames)?;
        }
        CliAction::Config(_) => {}
    }

    Ok(())
}

fn load_config(location: &Path) -> Result<InspectorConfig, Box<dyn Error>> {
    if !location.exists() {
        tracing::debug!("No config at {}, using defaults", location.display());
        return Ok(InspectorConfig::default());
    }

    Ok(InspectorConfig::load(File::open(location)?)?)
}

/// Put the row holding `address` at the top of the view
fn show_from(session: &mut InspectorSession, address: Address) -> Result<(), Box<dyn Error>> {
    session.goto(address)?;

    let base = session
        .viewport()
        .map(|viewport| viewport.region_base)
        .ok_or("No region selected")?;
    session.scroll_to(address - base)?;

    Ok(())
}

fn print_rows(session: &mut InspectorSession) -> Result<(), Box<dyn Error>> {
    let headers = session.column_headers().join(" ");

    println!("{:8}  {}", "", headers);

    for row in session.rows()? {
        println!("{row}");
    }

    Ok(())
}

fn watch(inspector: &Inspector, address: Address, frames: u32) -> Result<(), Box<dyn Error>> {
    let mut session = inspector.open_session();
    session.goto(address)?;

    let visible = session
        .viewport()
        .map(|viewport| viewport.visible_range())
        .ok_or("Nothing to watch")?;
    let core = SimulatedCore::spawn(
        inspector.address_space.clone(),
        *visible.start(),
        visible.end() - visible.start() + 1,
    );

    for _ in 0..frames {
        let Some(tick) = core.next_frame() else {
            return Err("Simulated core stopped".into());
        };

        session.on_tick()?;
        let rows = session.rows()?;

        println!("tick {tick}");
        for row in rows.iter().take(4) {
            println!("{row}");
        }
    }

    tracing::info!("Watched {} frames", frames);

    Ok(())
}
