//! Stress test - many work items
//!
//! Floods a thresholded workqueue with ordered items, watching the
//! active-worker count follow the backlog and checking that every
//! completion arrives in order.
//!
//! Usage: stress [items] [limit_active] [thresh]

use asyncwq::{Owner, Work, Workqueue, WqFlags};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn arg(n: usize, default: usize) -> usize {
    std::env::args()
        .nth(n)
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn main() {
    asyncwq::init_logging();
    println!("=== asyncwq Stress Test ===\n");

    let num_items = arg(1, 100_000);
    let limit_active = arg(2, 8);
    let thresh = arg(3, 64);

    let wq = match Workqueue::alloc(
        &Owner::new("stress"),
        "flood",
        WqFlags::HIGHPRI,
        limit_active,
        thresh,
    ) {
        Ok(wq) => wq,
        Err(e) => {
            eprintln!("failed to create workqueue: {}", e);
            std::process::exit(1);
        }
    };

    println!(
        "Queueing {} items (limit_active={}, thresh={})...",
        num_items, limit_active, thresh
    );

    let completed = Arc::new(AtomicU64::new(0));
    let out_of_order = Arc::new(AtomicUsize::new(0));
    // Ordering holds per pool, so each pool gets its own sequence
    let delivered = [Arc::new(AtomicU64::new(0)), Arc::new(AtomicU64::new(0))];
    let mut submitted = [0u64; 2];
    let mut congested = 0usize;

    let start = Instant::now();
    for i in 0..num_items as u64 {
        let high = i % 1000 == 999;
        let class = usize::from(high);
        let seq = submitted[class];
        submitted[class] += 1;

        let c = Arc::clone(&completed);
        let (d, o) = (Arc::clone(&delivered[class]), Arc::clone(&out_of_order));
        let mut work = Work::with_ordered(
            move || {
                // A little CPU work
                let mut x = i;
                for _ in 0..100 {
                    x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
                }
                std::hint::black_box(x);
                c.fetch_add(1, Ordering::Relaxed);
            },
            move || {
                if d.fetch_add(1, Ordering::Relaxed) != seq {
                    o.fetch_add(1, Ordering::Relaxed);
                }
            },
            || {},
        );
        if high {
            work.set_high_priority();
        }
        wq.queue_work(work);

        if wq.normal_congested() {
            congested += 1;
        }
        if (i + 1) % 10_000 == 0 {
            print!("\rQueued: {}/{}  active={}", i + 1, num_items, wq.normal().current_active());
        }
    }
    let queue_time = start.elapsed();

    println!("\n\nWaiting for completion...");
    let run_start = Instant::now();
    while (completed.load(Ordering::Relaxed) as usize) < num_items {
        if run_start.elapsed().as_secs() > 30 {
            println!("Timeout! Only {}/{} completed", completed.load(Ordering::Relaxed), num_items);
            break;
        }
        print!(
            "\rCompleted: {}/{}  active={}",
            completed.load(Ordering::Relaxed),
            num_items,
            wq.normal().current_active()
        );
        std::thread::sleep(Duration::from_millis(100));
    }
    wq.flush();

    let total_time = start.elapsed();
    let stats = wq.stats();

    println!("\n\n=== Results ===");
    println!("Total items:     {}", num_items);
    println!("Completed:       {}", completed.load(Ordering::Relaxed));
    println!("Congested hits:  {}", congested);
    println!("Out of order:    {}", out_of_order.load(Ordering::Relaxed));
    println!("Normal pool:     {:?}", stats.normal);
    if let Some(high) = stats.high {
        println!("High pool:       {:?}", high);
    }
    println!("Queue time:      {:?}", queue_time);
    println!("Total time:      {:?}", total_time);
    println!(
        "Throughput:      {:.0} items/sec",
        num_items as f64 / total_time.as_secs_f64()
    );

    wq.destroy();
    println!("\n=== Stress Test Complete ===");
}
