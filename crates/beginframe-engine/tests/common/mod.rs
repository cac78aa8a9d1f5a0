//! Shared helpers for the scenario tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use beginframe_args::BeginFrameArgs;
use beginframe_engine::{
    FrameConsumer, ManualTickClock, SchedulerConfig, SourceFactory, TrackedObserver,
};

/// Something an observer saw, in the order it saw it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    BeginFrame(&'static str, BeginFrameArgs),
    PausedChanged(&'static str, bool),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

type FrameHook = Box<dyn Fn(&BeginFrameArgs)>;

/// Consumer that appends everything it sees to a log shared by all
/// observers of a test, and optionally runs a hook on each frame.
pub struct LoggingConsumer {
    name: &'static str,
    log: EventLog,
    root: bool,
    hook: RefCell<Option<FrameHook>>,
}

impl LoggingConsumer {
    /// Run `hook` after logging each frame.
    pub fn set_on_begin_frame(&self, hook: impl Fn(&BeginFrameArgs) + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }
}

impl FrameConsumer for LoggingConsumer {
    fn consume_begin_frame(&self, args: &BeginFrameArgs) -> bool {
        self.log.borrow_mut().push(Event::BeginFrame(self.name, *args));
        if let Some(hook) = self.hook.borrow().as_ref() {
            hook(args);
        }
        true
    }

    fn on_begin_frame_source_paused_changed(&self, paused: bool) {
        self.log
            .borrow_mut()
            .push(Event::PausedChanged(self.name, paused));
    }

    fn is_root(&self) -> bool {
        self.root
    }
}

pub type LoggingObserver = TrackedObserver<LoggingConsumer>;

pub fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn logging_observer(name: &'static str, log: &EventLog) -> Rc<LoggingObserver> {
    Rc::new(TrackedObserver::new(LoggingConsumer {
        name,
        log: Rc::clone(log),
        root: false,
        hook: RefCell::new(None),
    }))
}

pub fn root_observer(name: &'static str, log: &EventLog) -> Rc<LoggingObserver> {
    Rc::new(TrackedObserver::new(LoggingConsumer {
        name,
        log: Rc::clone(log),
        root: true,
        hook: RefCell::new(None),
    }))
}

/// Frames delivered to `name`, in delivery order.
pub fn frames_of(log: &EventLog, name: &str) -> Vec<BeginFrameArgs> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::BeginFrame(observer, args) if *observer == name => Some(*args),
            _ => None,
        })
        .collect()
}

/// Which observer received each frame, in delivery order.
pub fn delivery_order(log: &EventLog) -> Vec<&'static str> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            Event::BeginFrame(observer, _) => Some(*observer),
            Event::PausedChanged(..) => None,
        })
        .collect()
}

/// A factory over a manual clock.
pub fn setup(config: SchedulerConfig) -> (Rc<ManualTickClock>, SourceFactory) {
    let clock = Rc::new(ManualTickClock::new());
    let factory = SourceFactory::new(config, clock.clone());
    (clock, factory)
}
