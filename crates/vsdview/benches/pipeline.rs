use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use vsdview::{SvgRenderOptions, convert, open_bytes, sanitize_svg_id};
use vsdview_core::ParseOptions;
use vsdview_core::testing::{PackageBuilder, PageSpec, rect_shape};

/// A grid of `n × n` rectangles with a straight connector between horizontal neighbours.
fn grid_package(n: u32) -> Vec<u8> {
    let mut shapes = String::new();
    let mut connects = String::new();
    let mut next_id = 1;
    for row in 0..n {
        for col in 0..n {
            let id = row * n + col + 1;
            shapes.push_str(&rect_shape(
                id,
                1.0 + f64::from(col) * 2.0,
                1.0 + f64::from(row) * 2.0,
                1.0,
                0.75,
            ));
            next_id = next_id.max(id + 1);
        }
    }
    for row in 0..n {
        for col in 0..n.saturating_sub(1) {
            let from = row * n + col + 1;
            let connector = next_id;
            next_id += 1;
            shapes.push_str(&format!(r#"<Shape ID="{connector}" Type="Shape"/>"#));
            connects.push_str(&format!(
                r#"<Connect FromSheet="{connector}" FromCell="BeginX" ToSheet="{from}" ToCell="PinX"/><Connect FromSheet="{connector}" FromCell="EndX" ToSheet="{}" ToCell="PinX"/>"#,
                from + 1
            ));
        }
    }
    let side = f64::from(n) * 2.0;
    PackageBuilder::new()
        .page(PageSpec::new(0, "Grid", side, side).shapes(&shapes).connects(&connects))
        .build()
}

fn fixtures() -> Vec<(&'static str, Vec<u8>)> {
    vec![("grid_4", grid_package(4)), ("grid_16", grid_package(16))]
}

fn bench_convert(c: &mut Criterion) {
    let parse = ParseOptions::default();
    let mut group = c.benchmark_group("convert");
    for (name, bytes) in fixtures() {
        let svg = SvgRenderOptions {
            diagram_id: Some(sanitize_svg_id(name)),
            ..SvgRenderOptions::default()
        };
        group.bench_function(name, |b| {
            b.iter_batched(
                || bytes.as_slice(),
                |bytes| {
                    let doc = open_bytes(bytes, &parse).unwrap();
                    let _pages = convert(&doc, &svg).unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_render_only(c: &mut Criterion) {
    let parse = ParseOptions::default();
    let svg = SvgRenderOptions::default();
    let mut group = c.benchmark_group("render_only");
    for (name, bytes) in fixtures() {
        let doc = open_bytes(&bytes, &parse).unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let _ = convert(&doc, &svg).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_convert, bench_render_only);
criterion_main!(benches);
