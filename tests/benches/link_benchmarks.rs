//! # Actuator Link Benchmarks
//!
//! | Path | Budget |
//! |------|--------|
//! | LowCmd framing (808 bytes) | well under the 2 ms command period |
//! | LowState verification (1176 bytes) | well under the 2 ms state period |
//! | Correlated call over the in-process transport | < 100 µs |

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::time::Duration;

use link_clients::{Ack, SportMotion};
use link_lowlevel::{checksum_bytes, frame, verify, Framed, LOW_CMD_FRAME_LEN};
use link_runtime::{LinkRuntime, LoopbackActuator, RuntimeConfig};
use link_types::topics::SPORT_REQUEST;
use link_types::{LowCmd, LowState};

// ============================================================================
// Checksum framing
// ============================================================================

fn bench_checksum(c: &mut Criterion) {
    let mut group = c.benchmark_group("checksum");
    group.measurement_time(Duration::from_secs(5));

    let mut cmd = LowCmd::with_header();
    for (i, motor) in cmd.motor_cmd.iter_mut().enumerate() {
        motor.q = i as f32 * 0.1;
        motor.kp = 20.0;
    }
    group.throughput(Throughput::Bytes(LOW_CMD_FRAME_LEN as u64));
    group.bench_function("frame_low_cmd", |b| b.iter(|| black_box(frame(black_box(&cmd)))));

    let bytes = cmd.frame_bytes();
    group.bench_function("checksum_raw_bytes", |b| {
        b.iter(|| black_box(checksum_bytes(black_box(&bytes))))
    });

    let mut state = LowState::default();
    state.tick = 42;
    link_lowlevel::seal(&mut state);
    group.bench_function("verify_low_state", |b| b.iter(|| black_box(verify(black_box(&state)))));

    group.finish();
}

// ============================================================================
// Request/reply round trip
// ============================================================================

fn bench_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let (runtime, _actuator) = rt.block_on(async {
        let runtime = LinkRuntime::new(RuntimeConfig::default()).unwrap();
        let actuator = LoopbackActuator::new(runtime.transport_handle());
        actuator.serve(SPORT_REQUEST).unwrap();
        (runtime, actuator)
    });

    let mut group = c.benchmark_group("request_reply");
    group.bench_function("sport_hello_round_trip", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    runtime
                        .sport()
                        .perform(SportMotion::Hello, Ack::Wait)
                        .await
                        .unwrap(),
                )
            })
        })
    });
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_round_trip);
criterion_main!(benches);
