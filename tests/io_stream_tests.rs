//! Blocking-pool and stream tests against real files
//!
//! These exercise the wall-clock configuration: completions are delivered by
//! the poll phase whenever the filesystem gets around to it, so the
//! assertions here are about content and cardinality, not cross-phase order.

mod common;

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use common::Recorder;
use looplab::prelude::*;

fn wall_loop() -> EventLoop {
    common::init_test_env();
    EventLoop::with_config(LoopConfig {
        clock: ClockMode::Wall,
        io_threads: 2,
    })
    .unwrap()
}

#[test]
fn write_then_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("round_trip.txt");

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();
    let contents = Rc::new(RefCell::new(None));

    let h = handle.clone();
    let seen = contents.clone();
    let read_path = path.clone();
    handle
        .write_file(&path, b"written through the pool".to_vec(), move |result| {
            result.unwrap();
            h.read_file(read_path, move |result| {
                *seen.borrow_mut() = Some(result.unwrap());
            })
            .unwrap();
        })
        .unwrap();

    event_loop.run();
    assert_eq!(
        contents.borrow().as_deref(),
        Some(b"written through the pool".as_slice())
    );
}

#[test]
fn read_failure_is_delivered_to_the_callback() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();
    let outcome = Rc::new(RefCell::new(None));

    let seen = outcome.clone();
    handle
        .read_file(&missing, move |result| {
            *seen.borrow_mut() = Some(result);
        })
        .unwrap();

    // The failure reaches the callback; the loop itself is unaffected
    event_loop.run();
    match outcome.borrow_mut().take() {
        Some(Err(Error::Io { path, .. })) => assert!(path.contains("missing.txt")),
        other => panic!("expected an Io error, got {:?}", other),
    };
}

#[test]
fn rewriting_the_dummy_file_overwrites_instead_of_appending() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dummy.txt");

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();

    let h = handle.clone();
    let second_path = path.clone();
    handle
        .write_file(
            &path,
            b"Hello from the event loop!".to_vec(),
            move |result| {
                result.unwrap();
                h.write_file(
                    second_path,
                    b"Hello from the event loop!".to_vec(),
                    |result| result.unwrap(),
                )
                .unwrap();
            },
        )
        .unwrap();

    event_loop.run();
    assert_eq!(fs::read(&path).unwrap(), b"Hello from the event loop!");
}

#[test]
fn stream_emits_data_end_close_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streamed.txt");
    fs::write(&path, b"stream me").unwrap();

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();
    let recorder = Recorder::new();

    let stream = ReadStream::open(&handle, &path);
    let r = recorder.clone();
    stream.on_data(move |bytes| {
        assert_eq!(bytes, b"stream me");
        r.push("data");
    });
    stream.on_end(recorder.mark("end"));
    stream.on_close(recorder.mark("close"));

    stream.start().unwrap();
    assert_eq!(stream.stage(), StreamStage::Reading);

    event_loop.run();
    assert_eq!(recorder.snapshot(), vec!["data", "end", "close"]);
    assert_eq!(stream.stage(), StreamStage::Closed);
}

#[test]
fn destroyed_stream_emits_exactly_one_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streamed.txt");
    fs::write(&path, b"never delivered").unwrap();

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();
    let closes = Rc::new(RefCell::new(0));
    let data_seen = Rc::new(RefCell::new(false));

    let stream = ReadStream::open(&handle, &path);
    let c = closes.clone();
    stream.on_close(move || *c.borrow_mut() += 1);
    let d = data_seen.clone();
    stream.on_data(move |_| *d.borrow_mut() = true);

    stream.start().unwrap();
    stream.destroy().unwrap();
    stream.destroy().unwrap();

    event_loop.run();
    assert_eq!(*closes.borrow(), 1);
    assert!(!*data_seen.borrow());
}

#[test]
fn second_start_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("streamed.txt");
    fs::write(&path, b"once").unwrap();

    let mut event_loop = wall_loop();
    let handle = event_loop.handle();
    let data_count = Rc::new(RefCell::new(0));

    let stream = ReadStream::open(&handle, &path);
    let d = data_count.clone();
    stream.on_data(move |_| *d.borrow_mut() += 1);

    stream.start().unwrap();
    stream.start().unwrap();

    event_loop.run();
    assert_eq!(*data_count.borrow(), 1);
    assert_eq!(event_loop.stats().poll_run, 1);
}
