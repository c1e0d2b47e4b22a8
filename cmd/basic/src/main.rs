//! Basic asyncwq example
//!
//! Queues a handful of ordered items whose primaries finish out of order
//! and shows that completions are still delivered in submission order.

use asyncwq::{kinfo, Owner, Work, Workqueue, WqFlags};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn main() {
    asyncwq::init_logging();
    println!("=== asyncwq Basic Example ===\n");

    let owner = Owner::new("demo");
    let wq = match Workqueue::alloc(&owner, "endio", WqFlags::HIGHPRI, 4, 32) {
        Ok(wq) => wq,
        Err(e) => {
            eprintln!("failed to create workqueue: {}", e);
            std::process::exit(1);
        }
    };

    let delivered = Arc::new(Mutex::new(Vec::new()));

    for i in 0..8u64 {
        let d = Arc::clone(&delivered);
        let mut work = Work::with_ordered(
            move || {
                // Later items finish first
                thread::sleep(Duration::from_millis(40 - i * 5));
                println!("  func {} done on {}", i, thread::current().name().unwrap_or("?"));
            },
            move || {
                println!("  ordered {}", i);
                d.lock().unwrap().push(i);
            },
            move || kinfo!("free {}", i),
        );
        if i == 7 {
            work.set_high_priority();
        }
        wq.queue_work(work);
    }

    // A high-priority item without ordering
    let mut urgent = Work::new(|| println!("  urgent work on {}", thread::current().name().unwrap_or("?")));
    urgent.set_high_priority();
    let handle = wq.queue_work(urgent);

    wq.flush();

    println!("\nDelivered: {:?}", delivered.lock().unwrap());
    println!("Urgent ran on pool {:?}, state {}", handle.pool_name(), handle.state());

    let stats = wq.stats();
    println!("Normal pool: {:?}", stats.normal);
    if let Some(high) = stats.high {
        println!("High pool:   {:?}", high);
    }

    wq.destroy();
    println!("\n=== Example Complete ===");
}
