//! Render benchmarks
//!
//! Measures one compile of a list template and one full render cycle
//! through a mounted app.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use aura_core::{create_app, CompileOptions, Compiler, Context, Document, Host, Ref, Runtime, Value};

const LIST: &str = r#"<ul :class="{ empty: !items.length }"><li v-for="(item, i) in items" :key="item.id" :class="{ odd: i % 2 }">{{ item.name }}</li></ul>"#;

fn items(n: usize) -> serde_json::Value {
    let rows: Vec<_> = (0..n).map(|i| json!({ "id": i, "name": format!("row {i}") })).collect();
    serde_json::Value::Array(rows)
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for n in [10, 100, 1000] {
        let rt = Runtime::new();
        let compiler = Compiler::new(&rt, CompileOptions::default());
        let ctx = Context::new().with("items", Value::from(items(n)));
        group.bench_with_input(BenchmarkId::new("list", n), &n, |b, _| {
            b.iter(|| black_box(compiler.compile_str(LIST, &ctx)));
        });
    }
    group.finish();
}

fn bench_render_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_cycle");
    for n in [10, 100] {
        let doc = Document::parse(r#"<div id="app"></div>"#);
        let host: Arc<dyn Host> = Arc::new(doc.clone());
        let app = create_app().template(LIST).setup(move |cx| {
            Context::new().with("items", Ref::new(cx.runtime(), items(n)))
        });
        let mounted = app.mount(host, "#app").expect("mount");
        group.bench_with_input(BenchmarkId::new("update", n), &n, |b, _| {
            b.iter(|| mounted.renderer().update());
        });
        mounted.unmount();
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_render_cycle);
criterion_main!(benches);
