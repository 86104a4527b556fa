//! Headless session driver: both processes of the experiment wired back to
//! back over the loopback link, a scripted operator working through the
//! schedule and a scripted participant doing what the headset asks.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use ambex_experiment::ExperimentManager;
use ambex_net::{SessionStage, SessionSummary, channel_pair};
use ambex_session::{HeadsetProcess, OperatorConsole};
use ambex_timing::{VirtualClock, precise_sleep};
use anyhow::{Context as _, Result, bail};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::settings::AppSettings;
use crate::sim::{SimHeadset, SimParticipant, SimRig};

/// One 90 Hz headset frame.
const FRAME: Duration = Duration::from_micros(11_111);
/// How long the scripted operator lets a training run before stopping it.
const TRAINING_WINDOW: Duration = Duration::from_secs(10);
/// Hard stop in case the script ever wedges.
const MAX_FRAMES: u64 = 10_000_000;

/// Knobs the command line exposes.
#[derive(Debug, Clone)]
pub struct Options {
    pub settings: AppSettings,
    pub data_dir: Option<PathBuf>,
    pub participant_id: i32,
    pub left_handed: bool,
    pub realtime: bool,
    pub step_limit: Option<usize>,
    pub seed: u64,
}

pub struct App {
    console: OperatorConsole,
    process: SimHeadset,
    rig: SimRig,
    clock: VirtualClock,
    participant: SimParticipant,
    options: Options,
    data_dir: PathBuf,
    elapsed: Duration,
    frames: u64,
    initial_done: u32,
    prepared: Option<i32>,
    started: Option<i32>,
    step_started_at: Option<Duration>,
    last_reported: Option<(i32, SessionStage)>,
}

impl App {
    pub fn new(options: Options) -> Result<Self> {
        let mut config = options.settings.experiment.clone();
        if let Some(dir) = &options.data_dir {
            config.data_dir = dir.clone();
        }
        let data_dir = config.data_dir.clone();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let rig = SimRig::default();
        let clock = VirtualClock::new();
        let manager = ExperimentManager::new(
            config,
            rig.clone(),
            rig.clone(),
            rig.clone(),
            rig.clone(),
            clock.clone(),
            StdRng::seed_from_u64(options.seed),
        );
        let (operator, headset) = channel_pair();
        let process = HeadsetProcess::new(&data_dir, manager, headset)
            .context("starting the headset process")?;
        let mut console = OperatorConsole::new(operator);
        console.pump()?;

        let mut app = Self {
            console,
            process,
            rig,
            clock,
            participant: SimParticipant::new(options.seed ^ 0x5eed),
            data_dir,
            elapsed: Duration::ZERO,
            frames: 0,
            initial_done: 0,
            prepared: None,
            started: None,
            step_started_at: None,
            last_reported: None,
            options,
        };
        app.adopt_identity()?;
        Ok(app)
    }

    /// Lines the headset up with the participant named on the command line.
    fn adopt_identity(&mut self) -> Result<()> {
        self.console.set_participant_id(self.options.participant_id)?;
        self.console.set_left_handed(self.options.left_handed)?;
        self.process.tick()?;
        self.console.pump()?;
        let summary = self
            .console
            .summary()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("no summary after the identity handshake"))?;
        self.initial_done = summary.done_bitmap.count_ones();
        Ok(())
    }

    pub fn run(mut self) -> Result<()> {
        self.print_banner();
        loop {
            self.frame()?;
            if self.session_complete() {
                break;
            }
            if self.frames >= MAX_FRAMES {
                bail!("session script made no progress after {MAX_FRAMES} frames");
            }
        }
        self.console.save_prefs()?;
        self.process.tick()?;
        self.console.pump()?;
        self.print_closing();
        Ok(())
    }

    fn frame(&mut self) -> Result<()> {
        self.frames += 1;
        self.clock.advance(FRAME);
        self.elapsed += FRAME;
        self.rig.drive_pose(self.elapsed);
        self.process.tick()?;
        self.participant
            .act(self.elapsed, &self.rig, self.process.experiment());
        self.console.pump()?;
        self.report_progress();
        self.drive_operator()?;
        if self.options.realtime {
            precise_sleep(FRAME);
        }
        Ok(())
    }

    /// The operator side of the script: prepare and start the next undone
    /// step, stop trainings after their rehearsal window, accept every
    /// block that asks for a verdict.
    fn drive_operator(&mut self) -> Result<()> {
        if self.console.awaiting_validation() {
            self.console.validate_trial()?;
            return Ok(());
        }
        let Some(summary) = self.console.summary().copied() else {
            return Ok(());
        };
        match summary.stage {
            SessionStage::Idle => {
                self.started = None;
                self.step_started_at = None;
                if self.limit_reached(&summary) {
                    return Ok(());
                }
                if let Some(next) = self.console.next_undone_step() {
                    if self.prepared != Some(next) {
                        self.console.point_at(next);
                        self.console.prepare_pointed_step()?;
                        self.prepared = Some(next);
                    }
                }
            }
            SessionStage::Preparing => {
                if self.started != Some(summary.index) {
                    self.console.start_pointed_step()?;
                    self.started = Some(summary.index);
                    self.step_started_at = Some(self.elapsed);
                }
            }
            SessionStage::Running => {
                self.prepared = None;
                let step = usize::try_from(summary.index)
                    .ok()
                    .and_then(|i| self.console.steps().get(i))
                    .copied();
                if let (Some(step), Some(started_at)) = (step, self.step_started_at) {
                    if step.is_any_training() && self.elapsed - started_at >= TRAINING_WINDOW {
                        self.console.finish_pointed_training()?;
                        self.step_started_at = None;
                    }
                }
            }
            SessionStage::Validation => {}
        }
        Ok(())
    }

    fn limit_reached(&self, summary: &SessionSummary) -> bool {
        match self.options.step_limit {
            Some(limit) => {
                summary.done_bitmap.count_ones().saturating_sub(self.initial_done) as usize >= limit
            }
            None => false,
        }
    }

    fn session_complete(&self) -> bool {
        let Some(summary) = self.console.summary() else {
            return false;
        };
        if summary.stage != SessionStage::Idle {
            return false;
        }
        self.console.next_undone_step().is_none() || self.limit_reached(summary)
    }

    fn report_progress(&mut self) {
        let Some(summary) = self.console.summary().copied() else {
            return;
        };
        let key = (summary.index, summary.stage);
        if self.last_reported == Some(key) {
            return;
        }
        self.last_reported = Some(key);
        let label = usize::try_from(summary.index)
            .ok()
            .and_then(|i| self.console.steps().get(i))
            .map(|step| step.label())
            .unwrap_or_default();
        println!(
            "[{:>8.2}s] {:<10} step {:>2}  {label}",
            self.elapsed.as_secs_f64(),
            summary.stage.name(),
            summary.index,
        );
    }

    fn print_banner(&self) {
        println!("=== AMBULATORY TARGET SELECTION EXPERIMENT ===");
        println!("Participant: {}", self.options.participant_id);
        println!(
            "Dominant hand: {}",
            if self.options.left_handed { "left" } else { "right" }
        );
        println!("Data directory: {}", self.data_dir.display());
        println!(
            "Pace: {}",
            if self.options.realtime {
                "realtime (90 Hz)"
            } else {
                "fast-forward"
            }
        );
        println!("\nSession schedule:");
        for line in self.console.schedule_lines() {
            println!("{line}");
        }
        println!();
    }

    fn print_closing(&self) {
        println!("\nFinal schedule state:");
        for line in self.console.schedule_lines() {
            println!("{line}");
        }
        println!();
        let id = self.options.participant_id;
        for name in [
            format!("{id}_selections.csv"),
            format!("{id}_highFrequency.csv"),
            format!("{id}_prefs"),
        ] {
            let path = self.data_dir.join(&name);
            match fs::metadata(&path) {
                Ok(meta) => println!("  {} ({} bytes)", path.display(), meta.len()),
                Err(_) => println!("  {} (not written)", path.display()),
            }
        }
        println!(
            "\nRan {:.1} virtual seconds in {} frames. Results saved. Thank you!",
            self.elapsed.as_secs_f64(),
            self.frames
        );
    }
}
