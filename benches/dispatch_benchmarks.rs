//! Dispatch benchmarks.
//!
//! Measures the cost of the paths every script call goes through:
//! - Direct and inherited method calls
//! - Property reads and writes
//! - Construction and finalization
//! - Argument packs spread from a table
//!
//! ## Profiling with Puffin
//!
//! With the `profile-with-puffin` feature the dispatch hooks record scopes and
//! a per-hook summary is printed after the run:
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- inherited
//! ```

use criterion::{Criterion, criterion_group, criterion_main};
use nativebind::{NativeType, RegistrationError, State, Table, Value, base_of};
use std::hint::black_box;

#[cfg(feature = "profile-with-puffin")]
use std::collections::HashMap;

#[cfg(feature = "profile-with-puffin")]
static FRAME_VIEW: std::sync::OnceLock<puffin::GlobalFrameView> = std::sync::OnceLock::new();

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
    FRAME_VIEW.get_or_init(puffin::GlobalFrameView::default);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

/// Call at the end of each iteration to flush profiling data.
#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

/// Print average time per top-level scope across the recorded frames.
#[cfg(feature = "profile-with-puffin")]
fn print_profiling_stats() {
    use puffin::Reader;

    let Some(frame_view) = FRAME_VIEW.get() else {
        return;
    };
    let view = frame_view.lock();
    let scope_collection = view.scope_collection();

    let mut timings: HashMap<String, i64> = HashMap::new();
    let mut frame_count = 0i64;
    for frame in view.recent_frames() {
        frame_count += 1;
        let Ok(unpacked) = frame.unpacked() else {
            continue;
        };
        for (_thread, stream_info) in unpacked.thread_streams.iter() {
            let Ok(scopes) = Reader::from_start(&stream_info.stream).read_top_scopes() else {
                continue;
            };
            for scope in scopes {
                if let Some(details) = scope_collection.fetch_by_id(&scope.id) {
                    *timings.entry(details.name().to_string()).or_insert(0) +=
                        scope.record.duration_ns;
                }
            }
        }
    }

    println!("\n=== Dispatch Profile ({frame_count} frames) ===");
    let mut entries: Vec<_> = timings.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    for (name, ns) in entries {
        let avg = ns / frame_count.max(1);
        println!(
            "  {:40} {:>10.2?} avg",
            name,
            std::time::Duration::from_nanos(avg as u64)
        );
    }
}

#[cfg(not(feature = "profile-with-puffin"))]
fn print_profiling_stats() {}

#[derive(Clone)]
struct Mover {
    x: f64,
    y: f64,
}
impl NativeType for Mover {}

struct Creature {
    hp: i32,
}
impl NativeType for Creature {}

struct Animal {
    creature: Creature,
    mover: Mover,
}
impl NativeType for Animal {}

fn bind(state: &mut State) -> Result<(), RegistrationError> {
    state
        .register::<Creature>("Creature")?
        .property("hp", |c: &Creature| c.hp, |c: &mut Creature, hp: i32| c.hp = hp)?
        .build()?;
    state
        .register::<Mover>("Mover")?
        .constructor(|x: f64, y: f64| Mover { x, y })?
        .method("move", |m: &mut Mover, dx: f64, dy: f64| {
            m.x += dx;
            m.y += dy;
        })?
        .property("x", |m: &Mover| m.x, |m: &mut Mover, x: f64| m.x = x)?
        .cloneable()?
        .build()?;
    state
        .register::<Animal>("Animal")?
        .inherits(base_of!(Animal, creature: Creature))?
        .inherits(base_of!(Animal, mover: Mover))?
        .constructor(|| Animal {
            creature: Creature { hp: 10 },
            mover: Mover { x: 0.0, y: 0.0 },
        })?
        .build()
}

fn dispatch_benchmarks(c: &mut Criterion) {
    setup_profiler();

    let mut state = State::new();
    bind(&mut state).unwrap();
    let mover = state
        .call_static("Mover", "new", &[Value::Number(0.0), Value::Number(0.0)])
        .unwrap()
        .remove(0);
    let animal = state.call_static("Animal", "new", &[]).unwrap().remove(0);
    let step = [Value::Number(1.0), Value::Number(1.0)];
    let x = Value::from("x");

    let mut group = c.benchmark_group("dispatch/methods");
    group.bench_function("direct", |b| {
        b.iter(|| {
            state.call_method(black_box(&mover), "move", &step).unwrap();
            end_profiling_frame();
        });
    });
    group.bench_function("inherited", |b| {
        b.iter(|| {
            state.call_method(black_box(&animal), "move", &step).unwrap();
            end_profiling_frame();
        });
    });
    group.bench_function("table_spread", |b| {
        let packed = Value::table(Table::from_sequence(step.clone()));
        b.iter(|| {
            state
                .call_method(black_box(&mover), "move", std::slice::from_ref(&packed))
                .unwrap();
            end_profiling_frame();
        });
    });
    group.finish();

    let mut group = c.benchmark_group("dispatch/properties");
    group.bench_function("read", |b| {
        b.iter(|| black_box(state.index(&mover, &x).unwrap()));
    });
    group.bench_function("read_inherited", |b| {
        b.iter(|| black_box(state.index(&animal, &x).unwrap()));
    });
    group.bench_function("write", |b| {
        b.iter(|| state.set_index(&mover, &x, Value::Number(2.0)).unwrap());
    });
    group.finish();

    let mut group = c.benchmark_group("dispatch/lifecycle");
    group.bench_function("construct_finalize", |b| {
        b.iter(|| {
            let mover = state
                .call_static("Mover", "new", &[Value::Number(1.0), Value::Number(2.0)])
                .unwrap()
                .remove(0);
            state.finalize(&mover).unwrap();
            end_profiling_frame();
        });
    });
    group.bench_function("clone", |b| {
        b.iter(|| black_box(state.call_static("Mover", "clone", &[mover.clone()]).unwrap()));
    });
    group.finish();

    print_profiling_stats();
}

criterion_group!(benches, dispatch_benchmarks);
criterion_main!(benches);
