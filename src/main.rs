#[cfg(feature = "gui")]
use std::sync::Arc;
#[cfg(feature = "gui")]
use std::thread;

#[cfg(feature = "gui")]
use crossbeam_channel::{unbounded, Receiver, Sender};
#[cfg(feature = "gui")]
use eframe::egui;
#[cfg(feature = "gui")]
use log::{info, warn};

#[cfg(feature = "gui")]
use drumgrid::generate::{GENRE_PRESETS, PRESET_SUGGESTIONS};
#[cfg(feature = "gui")]
use drumgrid::sequencer::pattern::{BPM_PRESETS, MAX_BPM, MIN_BPM};
#[cfg(feature = "gui")]
use drumgrid::{
    AudioOutput, CommandGenerator, Config, GeneratedPattern, GenerationError, InstrumentId,
    Layered, MidiOutputDevice, MidiSampleBank, Pattern, PatternGenerator, PlaybackController,
    SampleBank, SilentBank, STEPS,
};

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("drumgrid=info"))
        .init();

    let config = Config::read();
    let app = DrumMachineApp::new(config)?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 640.0])
            .with_title("drumgrid"),
        ..Default::default()
    };

    eframe::run_native("drumgrid", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| anyhow::anyhow!("{e}"))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
type GenerationResult = Result<GeneratedPattern, GenerationError>;

#[cfg(feature = "gui")]
struct DrumMachineApp {
    controller: PlaybackController,
    // keeps the device stream open
    audio_output: Option<AudioOutput>,
    midi: Arc<MidiSampleBank>,
    generator: Option<Arc<CommandGenerator>>,

    // generation runs off the UI thread
    generated_tx: Sender<GenerationResult>,
    generated_rx: Receiver<GenerationResult>,
    generating: bool,

    // UI state
    prompt: String,
    status: Option<String>,
    volume: u8,
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    current_visual_step: Option<usize>,
}

#[cfg(feature = "gui")]
impl DrumMachineApp {
    fn new(config: Config) -> anyhow::Result<Self> {
        let audio_output = match AudioOutput::open(config.output_device.as_deref()) {
            Ok(output) => Some(output),
            Err(err) => {
                warn!("no audio output, playing silently: {err}");
                None
            }
        };

        let audio: Box<dyn SampleBank> = match &audio_output {
            Some(output) => {
                let bank = output.bank();
                bank.set_volume(config.volume);
                let failed = bank.load_all(&config.samples);
                if !failed.is_empty() {
                    warn!("{} samples failed to load", failed.len());
                }
                Box::new(bank)
            }
            None => Box::new(SilentBank),
        };

        let midi = Arc::new(MidiSampleBank::new());
        let available_midi_ports = MidiOutputDevice::available_ports();
        let mut selected_port = None;
        if let Some(name) = &config.midi_port {
            match midi.connect_named(name) {
                Ok(()) => selected_port = available_midi_ports.iter().position(|p| p == name),
                Err(err) => warn!("{err}"),
            }
        }

        let mut pattern = Pattern::new();
        if let Err(err) = pattern.set_bpm(config.bpm) {
            warn!("{err}");
        }
        let controller =
            PlaybackController::with_pattern(pattern, Layered::new(audio, Arc::clone(&midi)))?;

        let generator =
            CommandGenerator::from_command_line(&config.generator_command).map(Arc::new);
        if generator.is_none() {
            info!("no generator_command configured, prompts are disabled");
        }

        let (generated_tx, generated_rx) = unbounded();

        Ok(Self {
            controller,
            audio_output,
            midi,
            generator,
            generated_tx,
            generated_rx,
            generating: false,
            prompt: String::new(),
            status: None,
            volume: config.volume,
            available_midi_ports,
            selected_port,
            current_visual_step: None,
        })
    }

    fn handle_playback_events(&mut self) {
        // the snapshot is authoritative; events only need draining
        self.controller.poll_events();
        // Stop parks on step 0, pause clears the highlight
        self.current_visual_step = self.controller.snapshot().current_step;
    }

    fn handle_generated(&mut self) {
        for result in self.generated_rx.try_iter() {
            self.generating = false;
            let outcome =
                result.and_then(|incoming| Ok(self.controller.load_generated(&incoming)?));
            self.status = match outcome {
                Ok(()) => Some(self.controller.pattern().description().to_owned()),
                Err(err) => Some(format!("Generation failed: {err}")),
            };
        }
    }

    fn request_pattern(&mut self, prompt: String) {
        let Some(generator) = self.generator.clone() else {
            self.status = Some("No generator configured".into());
            return;
        };
        if prompt.trim().is_empty() || self.generating {
            return;
        }

        self.generating = true;
        self.status = None;
        let tx = self.generated_tx.clone();
        let spawned = thread::Builder::new()
            .name("drumgrid-generate".into())
            .spawn(move || {
                let _ = tx.send(generator.generate(&prompt));
            });
        if let Err(err) = spawned {
            self.generating = false;
            self.status = Some(format!("Generation failed: {err}"));
        }
    }

    fn prompt_ui(&mut self, ui: &mut egui::Ui) {
        let mut requested = None;

        ui.horizontal(|ui| {
            let response = ui.add(
                egui::TextEdit::singleline(&mut self.prompt)
                    .hint_text("Describe a beat...")
                    .desired_width(420.0),
            );
            let submitted =
                response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            let can_generate = !self.generating && !self.prompt.trim().is_empty();
            if ui
                .add_enabled(can_generate, egui::Button::new("Generate"))
                .clicked()
                || (submitted && can_generate)
            {
                requested = Some(self.prompt.clone());
            }
            if self.generating {
                ui.spinner();
            }
        });

        ui.horizontal_wrapped(|ui| {
            for suggestion in PRESET_SUGGESTIONS {
                if ui.small_button(suggestion).clicked() {
                    self.prompt = suggestion.to_owned();
                    requested = Some(suggestion.to_owned());
                }
            }
        });

        ui.horizontal(|ui| {
            for preset in &GENRE_PRESETS {
                if ui
                    .button(preset.name)
                    .on_hover_text(preset.description)
                    .clicked()
                {
                    requested = Some(preset.prompt());
                }
            }
        });

        if let Some(prompt) = requested {
            self.request_pattern(prompt);
        }
    }

    fn transport_ui(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let label = if self.controller.is_playing() {
                "⏸ Pause"
            } else {
                "▶ Play"
            };
            if ui.button(label).clicked() {
                self.controller.toggle_play();
            }
            if ui.button("⏹ Stop").clicked() {
                self.controller.stop();
            }
            if ui.button("Clear").clicked() {
                self.controller.clear();
            }

            ui.add_space(20.0);

            ui.label("BPM:");
            let mut bpm = self.controller.bpm();
            if ui
                .add(egui::Slider::new(&mut bpm, MIN_BPM..=MAX_BPM).step_by(1.0))
                .changed()
            {
                if let Err(err) = self.controller.set_bpm(bpm) {
                    warn!("{err}");
                }
            }
            for preset in BPM_PRESETS {
                if ui
                    .selectable_label(bpm == preset, preset.to_string())
                    .clicked()
                {
                    if let Err(err) = self.controller.set_bpm(preset) {
                        warn!("{err}");
                    }
                }
            }
        });

        ui.horizontal(|ui| {
            ui.label("Volume:");
            let slider = egui::Slider::new(&mut self.volume, 0..=100).suffix("%");
            let enabled = self.audio_output.is_some();
            if ui.add_enabled(enabled, slider).changed() {
                if let Some(output) = &self.audio_output {
                    output.bank().set_volume(self.volume);
                }
            }

            ui.add_space(20.0);

            // MIDI Port Selection
            ui.label("MIDI Output:");
            let mut selected_port_changed = None;
            if self.available_midi_ports.is_empty() {
                ui.label("No MIDI ports available");
            } else {
                egui::ComboBox::from_id_source("midi_port")
                    .selected_text(
                        self.selected_port
                            .and_then(|i| self.available_midi_ports.get(i))
                            .map_or("Select port...", String::as_str),
                    )
                    .show_ui(ui, |ui| {
                        for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                            if ui
                                .selectable_label(self.selected_port == Some(i), port_name)
                                .clicked()
                            {
                                selected_port_changed = Some(i);
                            }
                        }
                    });
            }

            if let Some(port_idx) = selected_port_changed {
                match self.midi.connect(port_idx) {
                    Ok(()) => self.selected_port = Some(port_idx),
                    Err(err) => self.status = Some(err.to_string()),
                }
            }
        });
    }

    fn grid_ui(&mut self, ui: &mut egui::Ui) {
        let pattern = self.controller.pattern();

        egui::Grid::new("pattern_grid")
            .spacing(egui::vec2(4.0, 4.0))
            .show(ui, |ui| {
                ui.label("");
                for step in 0..STEPS {
                    ui.label(format!("{}", step + 1));
                }
                ui.end_row();

                for instrument in InstrumentId::all() {
                    ui.label(instrument.label());
                    for step in 0..STEPS {
                        let is_current = self.current_visual_step == Some(step);
                        let active = pattern.is_active(instrument, step);

                        let button = egui::Button::new("")
                            .min_size(egui::vec2(36.0, 36.0))
                            .fill(match (active, is_current) {
                                (true, true) => egui::Color32::from_rgb(120, 230, 120),
                                (true, false) => egui::Color32::from_rgb(60, 60, 200),
                                (false, true) => egui::Color32::from_rgb(70, 90, 70),
                                (false, false) if step % 4 == 0 => {
                                    egui::Color32::from_rgb(55, 55, 55)
                                }
                                (false, false) => egui::Color32::from_rgb(40, 40, 40),
                            });

                        if ui.add(button).clicked() {
                            if let Err(err) = self.controller.toggle_step(instrument, step) {
                                warn!("{err}");
                            }
                        }
                    }
                    ui.end_row();
                }
            });
    }
}

#[cfg(feature = "gui")]
impl eframe::App for DrumMachineApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.handle_playback_events();
        self.handle_generated();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("drumgrid");
            ui.add_space(10.0);

            self.prompt_ui(ui);
            ui.add_space(10.0);

            self.transport_ui(ui);
            ui.add_space(20.0);

            self.grid_ui(ui);

            // Info
            ui.separator();
            if let Some(status) = &self.status {
                ui.label(status);
            }
            if self.audio_output.is_none() {
                ui.colored_label(
                    egui::Color32::YELLOW,
                    "⚠ No audio output - the grid plays silently",
                );
            }
        });
    }
}
