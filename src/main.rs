#[cfg(feature = "gui")]
use eframe::egui;

use std::path::PathBuf;
use std::sync::Arc;
#[cfg(not(feature = "gui"))]
use std::thread;
use std::time::Duration;

use anyhow::Context as _;
use log::info;
#[cfg(feature = "gui")]
use log::warn;

#[cfg(feature = "gui")]
use ndseq::PortId;
use ndseq::{AudioHost, Config, ControlCell, Engine, PortRouter};

/// Everything that must stay alive while the sequencer runs.
struct Session {
    router: PortRouter,
    audio: AudioHost,
    control: Arc<ControlCell>,
}

fn start_session(config: &Config) -> anyhow::Result<Session> {
    let (inputs, outputs) = PortRouter::available_ports(&config.client_name);
    info!("MIDI inputs: {:?}", inputs);
    info!("MIDI outputs: {:?}", outputs);

    let (router, ports) = PortRouter::connect(config).context("routing MIDI ports")?;
    let mut audio = AudioHost::new().context("opening audio device")?;

    let engine = Engine::from_config(config, audio.sample_rate()).context("creating engine")?;
    let control = engine.control();
    audio.start(engine, ports).context("starting audio stream")?;
    info!("Running at {} BPM", config.tempo_bpm);

    Ok(Session {
        router,
        audio,
        control,
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref()).context("loading config")?;
    let session = start_session(&config)?;

    #[cfg(feature = "gui")]
    return run_gui(session);

    #[cfg(not(feature = "gui"))]
    return run_headless(session);
}

#[cfg(not(feature = "gui"))]
fn run_headless(mut session: Session) -> anyhow::Result<()> {
    while !session.audio.is_faulted() {
        thread::sleep(Duration::from_millis(100));
    }
    session.audio.stop();
    session.router.shutdown();
    info!(
        "{} outbound events and {} inbound messages dropped",
        session.control.dropped_events(),
        session.router.inbound_dropped()
    );
    anyhow::bail!(
        "real-time fault, engine disconnected at step {}",
        session.control.current_step()
    )
}

#[cfg(feature = "gui")]
fn run_gui(session: Session) -> anyhow::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([520.0, 620.0])
            .with_title("NDSEQ - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "NDSEQ",
        options,
        Box::new(move |_cc| Ok(Box::new(SequencerApp::new(session)))),
    )
    .map_err(|e| anyhow::anyhow!("GUI error: {}", e))
}

#[cfg(feature = "gui")]
struct SequencerApp {
    session: Session,

    // UI state
    tempo: u32,
    fault_logged: bool,
}

#[cfg(feature = "gui")]
impl SequencerApp {
    fn new(session: Session) -> Self {
        let tempo = session.control.requested_tempo();
        Self {
            session,
            tempo,
            fault_logged: false,
        }
    }

    fn port_label(&self, port: PortId) -> String {
        match self.session.router.bound_device(port) {
            Some(device) => format!("{}: {}", port.name(), device),
            None => format!("{}: not connected", port.name()),
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for SequencerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(Duration::from_millis(15));

        let faulted = self.session.audio.is_faulted();
        if faulted && !self.fault_logged {
            warn!("Real-time fault, engine disconnected");
            self.fault_logged = true;
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("NDSEQ - Step Sequencer");
            ui.add_space(10.0);

            // Port bindings
            for port in PortId::ALL {
                ui.label(self.port_label(port));
            }

            ui.add_space(10.0);

            // Tempo goes to the engine through the control cell
            ui.horizontal(|ui| {
                ui.label("BPM:");
                if ui
                    .add(egui::Slider::new(&mut self.tempo, 20..=300))
                    .changed()
                {
                    if let Err(e) = self.session.control.request_tempo(self.tempo) {
                        warn!("{}", e);
                    }
                }
            });

            ui.add_space(20.0);

            // Same layout as the controller lights: columns of 8 steps
            let current = self.session.control.current_step();
            ui.horizontal(|ui| {
                for column in 0..8 {
                    ui.vertical(|ui| {
                        for row in 0..8 {
                            let step = column * 8 + row;
                            let fill = if step == current {
                                egui::Color32::from_rgb(100, 200, 100)
                            } else {
                                egui::Color32::from_rgb(40, 40, 40)
                            };
                            let button = egui::Button::new(format!("{}", step + 1))
                                .min_size(egui::vec2(50.0, 50.0))
                                .fill(fill);
                            ui.add_enabled(false, button);
                        }
                    });
                }
            });

            ui.separator();
            ui.label("Press pads on the controller to toggle steps");
            let dropped = self.session.control.dropped_events();
            if dropped > 0 {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!("⚠ {} outbound events dropped", dropped),
                );
            }
            let missed = self.session.router.inbound_dropped();
            if missed > 0 {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    format!("⚠ {} controller messages dropped", missed),
                );
            }
            if faulted {
                ui.colored_label(egui::Color32::RED, "Engine disconnected after a real-time fault");
            }
        });
    }
}
