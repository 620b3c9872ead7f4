//! Benchmark: reaction fan-out and handler dispatch

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cubomx_core::{Document, Event, Record, Runtime};

fn page(bound: usize) -> (Runtime, Document) {
    let spans: String = (0..bound).map(|_| r#"<span :text="n">0</span>"#).collect();
    let html = format!(r#"<div mx-data="c">{spans}<button @click="n++">+</button></div>"#);
    let doc = Document::parse(&html);
    let runtime = Runtime::new(doc.clone());
    runtime
        .component("c", Record::new())
        .expect("fresh runtime");
    runtime.start();
    (runtime, doc)
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for bound in [1usize, 16, 256] {
        let (runtime, _doc) = page(bound);
        let proxy = runtime.instance("c").expect("component");
        let mut n = 0;
        group.bench_function(format!("set_{bound}"), |b| {
            b.iter(|| {
                n += 1;
                proxy.set("n", black_box(n));
            })
        });
    }
    group.finish();
}

fn bench_click(c: &mut Criterion) {
    let (runtime, doc) = page(16);
    let button = doc
        .query_selector(doc.root(), "button")
        .expect("button");
    c.bench_function("click_increment", |b| {
        b.iter(|| runtime.dispatch(black_box(button), &Event::new("click")))
    });
}

fn bench_eval(c: &mut Criterion) {
    let (runtime, _doc) = page(1);
    c.bench_function("eval_global_write", |b| {
        b.iter(|| runtime.eval(black_box("CuboMX.c.n = CuboMX.c.n + 1")))
    });
}

criterion_group!(benches, bench_fan_out, bench_click, bench_eval);
criterion_main!(benches);
