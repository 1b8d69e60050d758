use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mcm_core::codec::{Command, decode_position};
use mcm_core::mocks::position_report;
use mcm_core::{ControllerBuilder, StageSpec, UnitConverter};
use mcm_hardware::SimulatedMcm3000;

fn bench_codec(c: &mut Criterion) {
    let report = position_report(1, -123_456);
    c.bench_function("encode_move_absolute", |b| {
        b.iter(|| {
            Command::MoveAbsolute {
                channel: black_box(1),
                counts: black_box(47),
            }
            .encode()
        })
    });
    c.bench_function("decode_position", |b| {
        b.iter(|| decode_position(black_box(1), black_box(&report)))
    });
}

fn bench_units(c: &mut Criterion) {
    let conv = UnitConverter::new(&StageSpec::new(0.2116667, 12_700.0).unwrap(), true);
    c.bench_function("legalize_um", |b| {
        b.iter(|| conv.legalize(black_box(1234.5678)))
    });
}

fn bench_refresh(c: &mut Criterion) {
    let mut ctrl = ControllerBuilder::new()
        .with_transport(SimulatedMcm3000::new().with_counts(0, 47))
        .with_channel(0, "ZFM2020", false)
        .build()
        .unwrap();
    c.bench_function("refresh_simulated", |b| {
        b.iter(|| ctrl.refresh(black_box(0)).unwrap())
    });
}

criterion_group!(benches, bench_codec, bench_units, bench_refresh);
criterion_main!(benches);
