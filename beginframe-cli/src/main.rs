//! Runs a BeginFrame source in real time and prints what it did.
//!
//! In `delay` mode a delay-based source ticks on its own timer. In
//! `external` mode a vsync thread plays the platform: it waits for the
//! source to ask for frames and feeds it BeginFrames over a channel.

mod cli;

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};
use serde::Serialize;
use tracing::{debug, info, warn};

use beginframe_args::{
    BeginFrameArgs, BeginFrameArgsGenerator, MetricsSnapshot, SourceCommand, SourceEvent,
    SourceStateSnapshot, MANUAL_SOURCE_ID,
};
use beginframe_engine::{
    BeginFrameSource, ChannelClient, FrameConsumer, SchedulerConfig, SourceFactory,
    SystemTickClock, TrackedObserver, EXTERNAL_BEGIN_FRAME_LATENCY,
};

use cli::{Cli, Mode};

/// Consecutive vsync intervals without a frame before giving up.
const MAX_MISSED_VSYNCS: u32 = 8;

/// Counts the frames it is given and logs each one.
struct LoggingConsumer {
    name: &'static str,
    frames: Cell<u64>,
}

impl LoggingConsumer {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            frames: Cell::new(0),
        }
    }

    fn frames(&self) -> u64 {
        self.frames.get()
    }
}

impl FrameConsumer for LoggingConsumer {
    fn consume_begin_frame(&self, args: &BeginFrameArgs) -> bool {
        self.frames.set(self.frames.get() + 1);
        debug!(
            observer = self.name,
            source_id = args.source_id(),
            sequence_number = args.sequence_number(),
            args_type = args.args_type.name(),
            "BeginFrame"
        );
        true
    }

    fn on_begin_frame_source_paused_changed(&self, paused: bool) {
        debug!(observer = self.name, paused, "Source pause state changed");
    }
}

type LoggingObserver = TrackedObserver<LoggingConsumer>;

/// Printed as JSON when the run ends.
#[derive(Serialize)]
struct Report {
    mode: &'static str,
    frames_delivered: u64,
    frames_dropped: u64,
    elapsed_ms: u64,
    source: SourceStateSnapshot,
    metrics: MetricsSnapshot,
}

impl Report {
    fn new(
        mode: Mode,
        started: Instant,
        source: &dyn BeginFrameSource,
        observer: &LoggingObserver,
        factory: &SourceFactory,
    ) -> Self {
        Self {
            mode: mode.name(),
            frames_delivered: observer.consumer().frames(),
            frames_dropped: observer.dropped_begin_frame_args(),
            elapsed_ms: started.elapsed().as_millis() as u64,
            source: source.state_snapshot(),
            metrics: factory.metrics().snapshot(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SchedulerConfig::default(),
    };

    info!(
        mode = cli.mode.name(),
        frames = cli.frames,
        interval_us = config.default_interval_us,
        "Starting BeginFrame scheduler"
    );

    let factory = SourceFactory::new(config, Rc::new(SystemTickClock));
    let report = match cli.mode {
        Mode::Delay => run_delay_based(&factory, cli.frames),
        Mode::External => run_external(&factory, cli.frames)?,
    };

    info!(
        frames = report.frames_delivered,
        elapsed_ms = report.elapsed_ms,
        "Scheduler stopped"
    );
    if let Some(latency) = report.metrics.histogram(EXTERNAL_BEGIN_FRAME_LATENCY) {
        info!(
            samples = latency.count,
            mean_us = latency.mean(),
            max_us = latency.max,
            "BeginFrame latency"
        );
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_delay_based(factory: &SourceFactory, frames: u64) -> Report {
    let started = Instant::now();
    let source = factory.create_delay_based(Some(factory.clock().now()));
    let observer = Rc::new(TrackedObserver::new(LoggingConsumer::new("compositor")));
    source.add_observer(observer.clone());

    while observer.consumer().frames() < frames {
        let Some(next_tick_time) = source.next_tick_time() else {
            warn!("Timer stopped before all frames were delivered");
            break;
        };
        let now = Instant::now();
        if next_tick_time > now {
            thread::sleep(next_tick_time - now);
        }
        source.poll_timer();
    }

    let report = Report::new(Mode::Delay, started, &source, &observer, factory);
    source.remove_observer(&*observer);
    report
}

fn run_external(factory: &SourceFactory, frames: u64) -> Result<Report> {
    let started = Instant::now();
    let interval = factory.config().default_interval();
    let (command_tx, command_rx) = beginframe_args::command_channel();
    let (event_tx, event_rx) = beginframe_args::event_channel();

    let reporter = ChannelClient::new(event_tx.clone());
    let source = factory.create_external(Box::new(ChannelClient::new(event_tx)));

    let vsync = thread::Builder::new()
        .name("vsync".into())
        .spawn(move || run_vsync(interval, &event_rx, &command_tx))
        .context("Failed to spawn vsync thread")?;

    let observer = Rc::new(TrackedObserver::new(LoggingConsumer::new("compositor")));
    source.add_observer(observer.clone());

    let mut missed_vsyncs = 0;
    while observer.consumer().frames() < frames {
        match command_rx.recv_timeout(interval * 2) {
            Ok(command) => {
                missed_vsyncs = 0;
                source.handle_command(command);
            }
            Err(RecvTimeoutError::Timeout) => {
                missed_vsyncs += 1;
                warn!(missed_vsyncs, "No BeginFrame from vsync thread");
                if missed_vsyncs >= MAX_MISSED_VSYNCS {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Vsync thread exited early");
                break;
            }
        }
    }

    let report = Report::new(Mode::External, started, &source, &observer, factory);
    if let Err(e) = reporter.send(SourceEvent::State(Box::new(report.source.clone()))) {
        warn!("Failed to send event: {}", e);
    }

    // Stopping upstream and dropping every event sender lets the vsync
    // thread finish.
    source.remove_observer(&*observer);
    drop(source);
    drop(reporter);
    vsync
        .join()
        .map_err(|_| anyhow!("Vsync thread panicked"))?;

    Ok(report)
}

/// Produce BeginFrames every `interval` while the source wants them.
fn run_vsync(interval: Duration, events: &Receiver<SourceEvent>, commands: &Sender<SourceCommand>) {
    let mut generator = BeginFrameArgsGenerator::new();
    let mut needs_begin_frames = false;
    let mut next_vsync = Instant::now();
    let mut produced = 0u64;

    loop {
        if !needs_begin_frames {
            match events.recv() {
                Ok(event) => needs_begin_frames = apply_event(event, needs_begin_frames),
                Err(_) => break,
            }
            next_vsync = Instant::now();
            continue;
        }

        match events.try_recv() {
            Ok(event) => {
                needs_begin_frames = apply_event(event, needs_begin_frames);
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        let now = Instant::now();
        if next_vsync > now {
            thread::sleep(next_vsync - now);
        }
        let frame_time = next_vsync;
        next_vsync += interval;

        let args = generator.generate(MANUAL_SOURCE_ID, frame_time, next_vsync, interval);
        match commands.try_send(SourceCommand::BeginFrame(args)) {
            Ok(()) => produced += 1,
            Err(TrySendError::Full(_)) => {
                warn!(sequence_number = args.sequence_number(), "Source not keeping up, dropping vsync");
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    debug!(produced, "Vsync thread exiting");
}

fn apply_event(event: SourceEvent, needs_begin_frames: bool) -> bool {
    match event {
        SourceEvent::NeedsBeginFrames(needs) => {
            info!(needs, "Source changed its need for BeginFrames");
            needs
        }
        SourceEvent::State(state) => {
            info!(
                source_id = state.source_id,
                kind = state.kind.name(),
                observers = state.observer_count,
                throttle = state.throttle_state.name(),
                "Source state"
            );
            needs_begin_frames
        }
    }
}
