mod common;

use common::{log, Harness};
use scrolly_core::progress::{map_progress, ProgressMapper, SceneSpan};
use scrolly_core::{RawEvent, WindowSize};

#[test]
fn test_progress_clamps_outside_the_domain() {
    let span = SceneSpan {
        offset_screens: 1.0,
        screen_lengths: 2.0,
    };
    // Domain for an 800px screen: [850, 850 + 1600 + 800]
    assert_eq!(map_progress(span, 0.0, 800.0, 50.0, 0.0), 0.0);
    assert_eq!(map_progress(span, 849.0, 800.0, 50.0, 0.0), 0.0);
    assert_eq!(map_progress(span, 9000.0, 800.0, 50.0, 0.0), 1.0);
    assert_eq!(map_progress(span, 850.0 + 1200.0, 800.0, 50.0, 0.0), 0.5);
    for y in [-500.0, 0.0, 400.0, 2000.0, 3250.0, 1.0e9] {
        let p = map_progress(span, y, 800.0, 50.0, 0.0);
        assert!((0.0..=1.0).contains(&p), "{p} out of range at {y}");
    }
}

#[test]
fn test_repeated_progress_is_not_re_emitted() {
    let h = Harness::new();
    h.block("5000px");
    let streams = h.engine.streams();
    let anchor = scrolly_core::Channel::with_value(0.0);
    let mapper = ProgressMapper::new(
        h.engine.host().clone(),
        streams.scroll().clone(),
        streams.screen_height().clone(),
        anchor,
        0.0,
    );
    let progress = mapper.progress(SceneSpan {
        offset_screens: 0.0,
        screen_lengths: 1.0,
    });

    let seen = log();
    let s = seen.clone();
    let _sub = progress.subscribe(move |p| s.borrow_mut().push(*p));

    // Both positions are past the end of the scene
    h.scroll_to(3000.0);
    h.scroll_to(3500.0);
    h.scroll_to(3500.0);
    assert_eq!(*seen.borrow(), vec![0.0, 1.0]);
}

#[test]
fn test_resize_burst_produces_one_update_with_the_last_size() {
    let h = Harness::new();
    let seen = log();
    let s = seen.clone();
    let _sub = h
        .engine
        .streams()
        .resize()
        .subscribe(move |w: &WindowSize| s.borrow_mut().push(w.height));

    for i in 0..10 {
        h.page.set_window_size(WindowSize::new(1000.0, 700.0 + i as f64));
        h.engine.dispatch(RawEvent::Resize);
        h.engine.advance(5);
    }
    assert_eq!(*seen.borrow(), vec![800.0]);

    h.engine.advance(200);
    assert_eq!(*seen.borrow(), vec![800.0, 709.0]);
}

#[test]
fn test_fallback_toggles_on_key_sequence_only_when_armed() {
    let h = Harness::new();
    let streams = h.engine.streams();
    let sequence = scrolly_core::signals::KONAMI_CODE;

    for code in sequence {
        h.engine.dispatch(RawEvent::KeyDown(code));
    }
    assert!(!streams.current_fallback());

    let _armed = streams.arm_fallback_toggle();
    for code in sequence {
        h.engine.dispatch(RawEvent::KeyDown(code));
    }
    assert!(streams.current_fallback());
}
