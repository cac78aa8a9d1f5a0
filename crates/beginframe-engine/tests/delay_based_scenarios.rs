mod common;

use std::rc::Rc;
use std::time::Duration;

use beginframe_args::ArgsType;
use beginframe_engine::{
    BeginFrameSource, FeatureFlags, SchedulerConfig, TickClock, VRR_FRAME_COUNT,
};

use common::{frames_of, logging_observer, new_log, setup, Event};

const INTERVAL: Duration = Duration::from_millis(16);

fn config() -> SchedulerConfig {
    SchedulerConfig {
        default_interval_us: 16_000,
        ..Default::default()
    }
}

#[test]
fn test_vsync_paced_observer() {
    let (clock, factory) = setup(config());
    let t0 = clock.now();
    let source = factory.create_delay_based(Some(t0));
    let log = new_log();
    let o1 = logging_observer("o1", &log);

    source.add_observer(o1.clone());

    // Joining gets a MISSED frame for the tick that just passed.
    let frames = frames_of(&log, "o1");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].args_type, ArgsType::Missed);
    assert_eq!(frames[0].frame_time, t0);
    assert_eq!(log.borrow()[0], Event::PausedChanged("o1", false));

    clock.advance(INTERVAL);
    assert!(source.poll_timer());
    clock.advance(INTERVAL);
    assert!(source.poll_timer());

    let frames = frames_of(&log, "o1");
    assert_eq!(frames.len(), 3);
    let (first, second) = (frames[1], frames[2]);
    assert_eq!(first.args_type, ArgsType::Normal);
    assert_eq!(second.args_type, ArgsType::Normal);
    assert_eq!(second.sequence_number(), first.sequence_number() + 1);
    assert_eq!(second.frame_time - first.frame_time, INTERVAL);
    assert_eq!(first.deadline, second.frame_time);

    source.remove_observer(&*o1);
}

#[test]
fn test_missed_frame_after_idle_period() {
    let (clock, factory) = setup(config());
    let t0 = clock.now();
    let source = factory.create_delay_based(Some(t0));
    let log = new_log();
    let early = logging_observer("early", &log);
    source.add_observer(early.clone());
    clock.advance(INTERVAL);
    assert!(source.poll_timer());
    source.remove_observer(&*early);

    clock.advance(INTERVAL * 3 + Duration::from_millis(5));
    let late = logging_observer("late", &log);
    source.add_observer(late.clone());

    let frames = frames_of(&log, "late");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].args_type, ArgsType::Missed);
    assert_eq!(frames[0].frame_time, t0 + INTERVAL * 4);
    let last_early = frames_of(&log, "early").last().copied().unwrap();
    assert!(frames[0].sequence_number() > last_early.sequence_number());
}

#[test]
fn test_missed_frame_kill_switch() {
    let (clock, factory) = setup(SchedulerConfig {
        features: FeatureFlags {
            skip_missed_frame_on_add_observer: true,
            ..Default::default()
        },
        ..config()
    });
    let source = factory.create_delay_based(Some(clock.now()));
    let log = new_log();
    let observer = logging_observer("o1", &log);

    clock.advance(INTERVAL * 5 + Duration::from_millis(3));
    source.add_observer(observer.clone());
    assert!(frames_of(&log, "o1").is_empty());

    clock.advance(INTERVAL);
    assert!(source.poll_timer());
    let frames = frames_of(&log, "o1");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].args_type, ArgsType::Normal);
}

#[test]
fn test_observer_removed_during_dispatch_sees_current_tick_only() {
    let (clock, factory) = setup(config());
    let source = Rc::new(factory.create_delay_based(Some(clock.now())));
    let log = new_log();
    let remover = logging_observer("remover", &log);
    let victim = logging_observer("victim", &log);
    source.add_observer(remover.clone());
    source.add_observer(victim.clone());
    {
        let source = Rc::clone(&source);
        let victim = Rc::downgrade(&victim);
        remover.consumer().set_on_begin_frame(move |_args| {
            if let Some(victim) = victim.upgrade() {
                source.remove_observer(&*victim);
            }
        });
    }

    clock.advance(INTERVAL);
    assert!(source.poll_timer());
    clock.advance(INTERVAL);
    assert!(source.poll_timer());

    assert_eq!(frames_of(&log, "remover").len(), 3);
    assert_eq!(frames_of(&log, "victim").len(), 2);
    assert_eq!(source.state_snapshot().observer_count, 1);
}

#[test]
fn test_vrr_session_reports_frame_count() {
    let (clock, factory) = setup(SchedulerConfig {
        max_vrr_interval_us: Some(33_000),
        ..config()
    });
    let source = factory.create_delay_based(Some(clock.now()));
    let log = new_log();
    let observer = logging_observer("o1", &log);
    source.add_observer(observer.clone());

    for _ in 0..4 {
        clock.advance(INTERVAL);
        assert!(source.poll_timer());
    }
    let frames = frames_of(&log, "o1");
    assert_eq!(frames.len(), 5);
    assert!(frames
        .iter()
        .all(|args| args.interval == Duration::from_millis(33)));

    source.set_max_vrr_interval(None);
    let vrr_frames = factory.metrics().histogram(VRR_FRAME_COUNT).unwrap();
    assert_eq!(vrr_frames.sum, 4);

    clock.advance(INTERVAL);
    assert!(source.poll_timer());
    assert_eq!(frames_of(&log, "o1").last().unwrap().interval, INTERVAL);
}
