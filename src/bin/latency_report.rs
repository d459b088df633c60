use hdrhistogram::Histogram;
use pulse_lob::{AddOrder, MatchCore, OutputEvent, PoolMode, Side, SubmitRequest};
use std::time::Instant;

fn main() {
    tracing_subscriber::fmt::init();

    println!("Preparing latency benchmark...");

    let mut core = MatchCore::new(100_000, PoolMode::Strict);
    core.warm_up();

    let mut histogram = Histogram::<u64>::new_with_bounds(1, 100_000, 3).unwrap();

    const ITERATIONS: u64 = 1_000_000;
    const BUFFER_SIZE: usize = 10_000;

    // Pre-generate requests to keep RNG/alloc noise out of the timed loop
    println!("Pre-generating {} requests...", BUFFER_SIZE);
    let mut requests = Vec::with_capacity(BUFFER_SIZE);
    for i in 0..BUFFER_SIZE {
        let id = (i + 1) as u64;
        let side = if i % 2 == 0 { Side::Buy } else { Side::Sell };
        requests.push(SubmitRequest::Add(AddOrder::good_till_cancel(
            id,
            side,
            10_000 + (id % 100),
            10,
        )));
    }

    // Warm the branch predictor before measuring
    println!("Warming up ({} ops)...", BUFFER_SIZE);
    let mut events: Vec<OutputEvent> = Vec::with_capacity(64);
    for request in requests.iter() {
        events.clear();
        std::hint::black_box(core.apply(*request, &mut events));
    }

    println!("Running {} iterations...", ITERATIONS);

    let mut total_duration = std::time::Duration::new(0, 0);
    let mut request_cycle = requests.into_iter().cycle();

    for _ in 0..ITERATIONS {
        let request = request_cycle.next().unwrap();
        events.clear();

        let start = Instant::now();
        std::hint::black_box(core.apply(request, &mut events));
        let elapsed = start.elapsed();

        histogram.record(elapsed.as_nanos() as u64).unwrap_or(());
        total_duration += elapsed;
    }

    println!("\n=== Latency Report (ns) ===");
    println!("Total Ops:  {}", ITERATIONS);
    println!(
        "Throughput: {:.2} ops/sec",
        ITERATIONS as f64 / total_duration.as_secs_f64()
    );
    println!("---------------------------");
    println!("Min:    {:6} ns", histogram.min());
    println!("P50:    {:6} ns", histogram.value_at_quantile(0.50));
    println!("P90:    {:6} ns", histogram.value_at_quantile(0.90));
    println!("P99:    {:6} ns", histogram.value_at_quantile(0.99));
    println!("P99.9:  {:6} ns", histogram.value_at_quantile(0.999));
    println!("Max:    {:6} ns", histogram.max());
    println!("---------------------------");

    println!("\nDistribution:");
    for v in histogram.iter_log(100_000, 2.0) {
        let count = v.count_at_value();
        if count > 0 {
            println!(
                "{:6} ns: {:10} count",
                v.value_iterated_to(),
                count
            );
        }
    }
}
