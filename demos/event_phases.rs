//! Phase-ordering demonstration against the wall clock
//!
//! Schedules one callback of every kind, prints each as it runs, and lets
//! the loop drain. The mainline lines always come first, then both deferred
//! callbacks, then both microtasks, then the phases: the zero-delay timer,
//! the file-read completion, the immediate, and the stream's close event.
//! `RUST_LOG=looplab=trace` exposes the per-callback trace on stderr without
//! touching the demonstration lines.

use std::fs;
use std::path::Path;

use looplab::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let mut event_loop = EventLoop::new()?;
    let handle = event_loop.handle();

    println!("--- Start of script (mainline) ---");

    // A dummy file for the I/O-completion callback
    let dummy = std::env::temp_dir().join("looplab_dummy.txt");
    fs::write(&dummy, b"Hello from the event loop!").map_err(|e| Error::io(&dummy, e))?;

    // Timers phase
    handle.set_timeout(0, || println!("set_timeout 0ms (Timers phase)"))?;

    // Poll phase
    handle.read_file(&dummy, |result| {
        let _ = result;
        println!("read_file completion (Poll phase)");
    })?;

    // Check phase
    handle.set_immediate(|| println!("set_immediate (Check phase)"))?;

    // Close phase: a stream over this demo's own executable, torn down
    // before it ever starts reading
    let own_binary =
        std::env::current_exe().map_err(|e| Error::io(Path::new("current_exe"), e))?;
    let stream = ReadStream::open(&handle, own_binary);
    stream.on_close(|| println!("stream close event (Close phase)"));

    // The queue-jumpers: deferred callbacks run before any microtask, and
    // both run before the first phase
    handle.defer(|| println!("defer 1 (highest priority)"))?;
    Promise::fulfilled(&handle, ()).then(|_| println!("promise then 1 (microtask)"));
    handle.defer(|| println!("defer 2 (highest priority)"))?;
    Promise::fulfilled(&handle, ()).then(|_| println!("promise then 2 (microtask)"));

    // Destroy schedules the close event for a future turn, never inline
    stream.destroy()?;

    println!("--- End of script (mainline) ---");

    event_loop.run();
    Ok(())
}
