//! How retain capacity trades hit rate for memory.
//!
//! Replays one skewed trace (90 % of accesses to a hot tenth of the keys)
//! against caches of the same capacity that keep fewer and fewer values
//! alive on their own.  Values the cache lets go of are reclaimed and their
//! entries swept, so lookups miss on keys that capacity alone would keep.
//!
//!     cargo run --example hit_rate --release

use std::time::{Duration, Instant};

use softcache::{Cache, CacheBuilder, Metrics};

const CAP: u64 = 8_192;
const KEYS: u64 = 65_536;
const HOT: u64 = KEYS / 10;
const TRACE: usize = 400_000;

/// splitmix64
fn next(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn trace(seed: u64) -> Vec<u64> {
    let mut state = seed;
    (0..TRACE)
        .map(|_| {
            let r = next(&mut state);
            if r % 10 < 9 {
                (r >> 8) % HOT
            } else {
                HOT + (r >> 8) % (KEYS - HOT)
            }
        })
        .collect()
}

fn replay(trace: &[u64], retain: u64) -> softcache::Result<(Metrics, Duration, usize)> {
    let cache: Cache<u64, u64> = CacheBuilder::new(CAP).retain_capacity(retain).build()?;
    let start = Instant::now();
    for &key in trace {
        if cache.get(&key).is_none() {
            cache.put(key, key)?;
        }
    }
    let elapsed = start.elapsed();
    // Let the sweeper catch up before reading the counters.
    std::thread::sleep(Duration::from_millis(50));
    Ok((cache.stats(), elapsed, cache.len()))
}

fn main() -> softcache::Result<()> {
    println!("capacity {CAP}, {KEYS} keys ({HOT} hot), {TRACE} accesses");
    println!();
    println!(
        "{:>8} {:>9} {:>10} {:>10} {:>8} {:>9}",
        "retain", "hit rate", "evicted", "reclaimed", "entries", "time ms"
    );

    let trace = trace(0x5EED);
    for retain in [CAP, CAP / 2, CAP / 8, CAP / 32] {
        let (stats, elapsed, entries) = replay(&trace, retain)?;
        println!(
            "{:>8} {:>8.2}% {:>10} {:>10} {:>8} {:>9}",
            retain,
            stats.hit_rate() * 100.0,
            stats.evictions,
            stats.reclaimed,
            entries,
            elapsed.as_millis(),
        );
    }
    Ok(())
}
