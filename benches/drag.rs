use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use draggable_svg::script::{Script, Step, run_script, simulation};
use draggable_svg::{
    DragConfig, Point, PointerEvent, SvgLayout, Vector, geometry::parse_transform, screen_to_local,
};
use std::hint::black_box;

fn gallery_source(svgs: usize, marked_per_svg: usize) -> String {
    let mut out = String::from("<main>");
    for i in 0..svgs {
        out.push_str(&format!(
            "<svg id=\"sheet-{i}\" width=\"400\" height=\"200\" viewBox=\"0 0 200 100\">"
        ));
        for j in 0..marked_per_svg {
            let x = (j * 17) % 180;
            let y = (j * 11) % 80;
            out.push_str(&format!(
                "<g id=\"sticker-{i}-{j}\" data-draggable=\"\" transform=\"rotate({j} {x} {y})\">\
                 <rect x=\"{x}\" y=\"{y}\" width=\"20\" height=\"20\"/>\
                 <path d=\"M{x} {y} c5 -5 10 5 15 0 s5 10 0 15 z\"/></g>"
            ));
        }
        out.push_str("</svg>");
    }
    out.push_str("</main>");
    out
}

fn drag_script(moves: usize) -> Script {
    let mut steps = vec![Step::Down {
        element: "sticker-0-0".to_string(),
    }];
    for i in 0..moves {
        let dx = if i % 2 == 0 { 3.0 } else { -1.0 };
        steps.push(Step::Move { dx, dy: 1.5 });
    }
    steps.push(Step::Up);
    Script { steps }
}

fn bench_activate(c: &mut Criterion) {
    let mut group = c.benchmark_group("activate");
    for (svgs, marked) in [(1, 4), (4, 16), (16, 32)] {
        let input = gallery_source(svgs, marked);
        let name = format!("{svgs}x{marked}");
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, data| {
            b.iter(|| {
                let mut manager =
                    simulation(black_box(data), SvgLayout::default(), DragConfig::default())
                        .expect("load failed");
                black_box(manager.initialize().expect("activate failed"));
            });
        });
    }
    group.finish();
}

fn bench_drag(c: &mut Criterion) {
    let mut group = c.benchmark_group("drag");
    let input = gallery_source(4, 16);
    for moves in [10, 100, 1000] {
        let script = drag_script(moves);
        group.bench_with_input(BenchmarkId::from_parameter(moves), &script, |b, script| {
            b.iter(|| {
                let report = run_script(&input, SvgLayout::default(), DragConfig::default(), script)
                    .expect("script failed");
                black_box(report.controllers.len());
            });
        });
    }
    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let mut group = c.benchmark_group("convert");
    let input = gallery_source(4, 16);
    let mut manager =
        simulation(&input, SvgLayout::new(Point::new(8.0, 8.0)), DragConfig::default())
            .expect("load failed");
    manager.initialize().expect("activate failed");
    let target = manager
        .document()
        .element_by_id("sticker-3-15")
        .expect("fixture element");

    group.bench_function("screen_to_local", |b| {
        b.iter(|| {
            let local = screen_to_local(
                manager.document(),
                manager.geometry(),
                black_box(Point::new(120.0, 640.0)),
                &target,
            )
            .expect("convert failed");
            black_box(local);
        });
    });
    group.bench_function("parse_transform", |b| {
        b.iter(|| {
            black_box(parse_transform(black_box(
                "translate(10,5) rotate(30 4 4) scale(2) skewX(10) matrix(1 0 0 1 3 4)",
            )));
        });
    });
    group.finish();

    let mut manager =
        simulation(&input, SvgLayout::default(), DragConfig::default()).expect("load failed");
    manager.initialize().expect("activate failed");
    let source = manager
        .document()
        .element_by_id("sticker-0-0")
        .expect("fixture element");
    let proxy = *manager.controller_for(&source).expect("registered").proxy();
    manager
        .dispatch(PointerEvent::Down { target: proxy })
        .expect("pointer down");
    c.bench_function("pointer_move", |b| {
        b.iter(|| {
            manager
                .dispatch(PointerEvent::Move {
                    movement: black_box(Vector::new(0.5, -0.25)),
                })
                .expect("pointer move");
        });
    });
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_activate, bench_drag, bench_convert
);
criterion_main!(benches);
