//! Two-thread producer/consumer handoff
//!
//! The parent spawns one worker bound to a fixed counting task, keeps doing
//! its own (much smaller) work without waiting, and receives the worker's
//! single result message when it is ready. The worker's loop has no yield
//! points — blocking its own thread is the point, and it never blocks the
//! parent.

use looplab::prelude::*;
use looplab::worker;

fn main() -> Result<()> {
    env_logger::init();

    println!("Main thread: Starting.");

    let worker = worker::spawn(
        WorkerConfig {
            name: "heavy-counter".to_string(),
            stack_size: None,
        },
        |ctx| {
            println!("Worker thread: I'm starting my heavy task!");
            let mut total: u64 = 0;
            for _ in 0..10_000_000_000u64 {
                total += 1;
            }
            println!("Worker thread: Heavy task finished.");
            let _ = ctx.post_message(format!("The final count is {}", total));
        },
    );

    println!("Main thread: Worker started. I can do other things now.");

    let mut total = 0;
    for _ in 0..1000 {
        total += 1;
    }
    println!("{}", total);

    match worker.recv()? {
        WorkerEvent::Message(message) => {
            println!("Main thread: Received message from worker - {}", message);
        }
        WorkerEvent::Error(error) => return Err(error),
    }

    worker.join()
}
