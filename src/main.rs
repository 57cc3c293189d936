//! Mallet - polyphonic marimba and xylophone synthesizer

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use log::{info, warn};
use mallet::config::{self, load_preset, save_preset, MalletConfig, Preset};
use mallet::engine::midi::{connect_input, list_input_ports};
use mallet::engine::player::{default_device_name, list_output_devices, output_device, Player};
use mallet::engine::sequence::{play_sequence, render_sequence, Sequence};
use mallet::engine::Engine;
use mallet::synth::{Instrument, ParameterStore};
use mallet::viz::{run_viz, VizState};

mod cli;

use cli::{Cli, Commands};

/// Looked for when no configuration path is given
const DEFAULT_CONFIG: &str = "mallet.yaml";

/// Samples kept for the output scope
const SCOPE_SAMPLES: usize = 4096;

fn main() -> Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            config: config_path,
            instrument,
            preset,
            sequence,
            no_viz,
        } => {
            let cfg = load_or_default(config_path.as_deref(), instrument)?;
            play(&cfg, preset.as_deref(), sequence, no_viz)?;
        }

        Commands::Render {
            config: config_path,
            instrument,
            preset,
            tail,
        } => {
            let cfg = load_or_default(config_path.as_deref(), instrument)?;
            render(&cfg, preset.as_deref(), tail)?;
        }

        Commands::Check { config: config_path } => {
            println!("Checking configuration at {:?}...", config_path);

            match config::load_config(&config_path) {
                Ok(cfg) => {
                    println!("Configuration is valid!");
                    println!("  Instrument: {}", cfg.instrument);
                    println!("  Sample rate: {} Hz", cfg.audio.sample_rate);
                    println!("  Block size: {}", cfg.audio.block_size);
                    println!("  Polyphony: {} ({:?} when full)", cfg.audio.polyphony, cfg.audio.stealing);
                    println!("  Master volume: {:.0}%", cfg.master.volume * 100.0);
                    println!("  Tuning: A4 = {} Hz", cfg.tuning.a4);
                    println!("  Parameters: {}", cfg.parameters.len());
                    for (name, value) in &cfg.parameters {
                        println!("    - {} = {}", name, value);
                    }
                    println!("  Controllers: {}", cfg.midi.controllers.len());
                    for binding in &cfg.midi.controllers {
                        println!("    - CC{} -> {}", binding.controller, binding.parameter);
                    }
                    println!(
                        "  Sequence: {} notes, {:.1}s",
                        cfg.sequence.len(),
                        cfg.sequence_length()
                    );
                }
                Err(e) => {
                    println!("Configuration is invalid: {:#}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Init => {
            let example_config = include_str!("../mallet.example.yaml");

            if Path::new(DEFAULT_CONFIG).exists() {
                println!("{} already exists. Not overwriting.", DEFAULT_CONFIG);
            } else {
                std::fs::write(DEFAULT_CONFIG, example_config)?;
                println!("Created {} with example configuration.", DEFAULT_CONFIG);
            }
        }

        Commands::Devices => {
            println!("Available audio devices:\n");

            if let Some(name) = default_device_name() {
                println!("Default output: {}\n", name);
            }

            println!("Output devices:");
            for (name, config) in list_output_devices() {
                println!(
                    "  - {} ({} Hz, {} ch)",
                    name, config.sample_rate.0, config.channels
                );
            }
        }

        Commands::MidiPorts => {
            let ports = list_input_ports()?;
            if ports.is_empty() {
                println!("No MIDI input ports found.");
            } else {
                println!("MIDI input ports:");
                for name in ports {
                    println!("  - {}", name);
                }
            }
        }

        Commands::Preset {
            config: config_path,
            instrument,
            output,
        } => {
            let cfg = load_or_default(config_path.as_deref(), instrument)?;
            let store = cfg.instrument.definition().store()?;
            seed_controls(&cfg, &store, None)?;
            save_preset(&Preset::capture(cfg.instrument, &store), &output)?;
            println!("Saved {} preset to {:?}", cfg.instrument, output);
        }
    }

    Ok(())
}

/// Load `path`, or mallet.yaml if it exists, or the defaults
fn load_or_default(path: Option<&Path>, instrument: Option<Instrument>) -> Result<MalletConfig> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG)).filter(|p| p.exists()));

    let mut cfg = match path {
        Some(path) => {
            info!("loading configuration from {}", path.display());
            config::load_config(&path)?
        }
        None => {
            info!("no configuration file, using defaults");
            MalletConfig::default()
        }
    };

    if let Some(instrument) = instrument {
        cfg.instrument = instrument;
        cfg.validate()
            .with_context(|| format!("configuration does not fit {}", instrument))?;
    }
    Ok(cfg)
}

/// Write the configured values, then the preset, into `store`
fn seed_controls(cfg: &MalletConfig, store: &ParameterStore, preset: Option<&Path>) -> Result<()> {
    for (key, value) in cfg.initial_parameters()? {
        store.set(key, value);
    }
    if let Some(path) = preset {
        load_preset(path)?.apply(cfg.instrument, store)?;
    }
    Ok(())
}

fn play(cfg: &MalletConfig, preset: Option<&Path>, with_sequence: bool, no_viz: bool) -> Result<()> {
    let (device, stream_config) = output_device(cfg.audio.device.as_deref())?;
    let device_rate = stream_config.sample_rate().0;
    if device_rate != cfg.audio.sample_rate {
        warn!(
            "device runs at {} Hz, not the configured {} Hz",
            device_rate, cfg.audio.sample_rate
        );
    }

    let mut settings = cfg.engine_settings();
    settings.sample_rate = device_rate as f64;
    let (engine, mut handle) = Engine::new(cfg.instrument, settings)?;
    seed_controls(cfg, handle.controls(), preset)?;
    handle.set_controllers(cfg.controller_map(handle.controls())?);
    for binding in handle.controllers().bindings() {
        info!("CC{} -> {}", binding.controller, binding.parameter);
    }

    info!(
        "starting {} with {} voices at {} Hz",
        cfg.instrument, settings.polyphony, device_rate
    );

    let state = Arc::new(VizState::new(
        SCOPE_SAMPLES,
        engine.voice_views(),
        handle.controls().clone(),
        handle.stats().clone(),
        cfg.instrument.to_string(),
    ));

    let running = state.running.clone();
    ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;

    let mut player = Player::new();
    let scope = (!no_viz).then(|| state.sample_buffer.clone());
    player.start(&device, stream_config, engine, scope)?;

    // The handle goes to exactly one producer: the sequence or MIDI input
    let (sequencer, _midi) = if with_sequence {
        let sequence = Sequence::new(&cfg.sequence);
        let running = state.running.clone();
        let sequencer = thread::spawn(move || {
            play_sequence(&mut handle, &sequence, &running);
        });
        (Some(sequencer), None)
    } else {
        let connection = connect_input(cfg.midi.port.as_deref(), handle)
            .map_err(|e| warn!("no MIDI input: {:#}", e))
            .ok();
        (None, connection)
    };

    if no_viz {
        info!("playing, press Ctrl-C to stop");
        while state.is_running() {
            thread::sleep(Duration::from_millis(100));
        }
    } else {
        run_viz(&state)?;
    }

    state.stop();
    player.stop();
    if let Some(sequencer) = sequencer {
        let _ = sequencer.join();
    }

    let stats = &state.stats;
    info!(
        "stopped ({} notes dropped, {} voices stolen)",
        stats.dropped_notes(),
        stats.stolen_voices()
    );
    Ok(())
}

fn render(cfg: &MalletConfig, preset: Option<&Path>, tail: f64) -> Result<()> {
    let (mut engine, handle) = Engine::new(cfg.instrument, cfg.engine_settings())?;
    seed_controls(cfg, handle.controls(), preset)?;

    if cfg.sequence.is_empty() {
        warn!("configuration has no sequence, rendering silence");
    }
    let sequence = Sequence::new(&cfg.sequence);
    let duration = cfg.sequence_length() + tail.max(0.0);
    info!(
        "rendering {:.1}s of {} ({} events)",
        duration,
        cfg.instrument,
        sequence.events().len()
    );

    let reports = render_sequence(&mut engine, &sequence, duration);

    println!("  {:>5}  {:>8}  {:>10}  {:>8}  {:>6}", "time", "peak", "peak dBFS", "rms", "voices");
    for report in &reports {
        println!(
            "  {:>4}s  {:>8.4}  {:>10.1}  {:>8.4}  {:>6}",
            report.second,
            report.peak,
            report.peak_db(),
            report.rms,
            report.voices
        );
    }

    let peak = reports.iter().map(|r| r.peak).fold(0.0, f32::max);
    let stats = engine.stats();
    info!(
        "rendered {} s, peak {:.4}, {} notes dropped, {} voices stolen",
        reports.len(),
        peak,
        stats.dropped_notes(),
        stats.stolen_voices()
    );
    if peak > 1.0 {
        warn!("output clipped; lower master volume or amplitude");
    }
    Ok(())
}
