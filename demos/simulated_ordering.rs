//! The same phase-ordering scenario, replayed on the virtual clock
//!
//! No wall-clock time passes: the loop's clock starts at 0 ms and advances
//! only when the loop would otherwise sleep, and the poll phase waits for
//! outstanding completions instead of racing them. The printed order is
//! therefore identical on every run and every machine.

use std::cell::RefCell;
use std::fs;
use std::rc::Rc;

use looplab::prelude::*;

fn main() -> Result<()> {
    env_logger::init();

    let mut event_loop = EventLoop::with_config(LoopConfig {
        clock: ClockMode::Virtual,
        ..LoopConfig::default()
    })?;
    let handle = event_loop.handle();

    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let mark = |label: &'static str| {
        let order = order.clone();
        move || order.borrow_mut().push(label)
    };

    order.borrow_mut().push("mainline: start");

    let dummy = std::env::temp_dir().join("looplab_sim_dummy.txt");
    fs::write(&dummy, b"Hello from the event loop!").map_err(|e| Error::io(&dummy, e))?;

    handle.set_timeout(0, mark("timers phase: set_timeout 0ms"))?;

    let o = order.clone();
    handle.read_file(&dummy, move |result| {
        let _ = result;
        o.borrow_mut().push("poll phase: read_file completion");
    })?;

    handle.set_immediate(mark("check phase: set_immediate"))?;

    let stream = ReadStream::open(&handle, &dummy);
    stream.on_close(mark("close phase: stream close event"));

    handle.defer(mark("deferred 1"))?;
    let o = order.clone();
    Promise::fulfilled(&handle, ()).then(move |_| o.borrow_mut().push("microtask 1"));
    handle.defer(mark("deferred 2"))?;
    let o = order.clone();
    Promise::fulfilled(&handle, ()).then(move |_| o.borrow_mut().push("microtask 2"));

    stream.destroy()?;
    order.borrow_mut().push("mainline: end");

    event_loop.run();

    println!("Simulated order ({} turns):", event_loop.stats().turns);
    for (i, label) in order.borrow().iter().enumerate() {
        println!("{:2}. {}", i + 1, label);
    }
    Ok(())
}
