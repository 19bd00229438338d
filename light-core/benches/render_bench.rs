//! Benchmarks for config rendering and message formatting

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use light_core::{
    format_message, ConfigDocument, FileDestinationOptions, FileSourceOptions, HarnessConfig, LogMessageFields,
    MessageFormat, MessageGenerator, ResourceRegistry,
};

fn document(registry: &Arc<ResourceRegistry>, pairs: usize) -> ConfigDocument {
    let mut doc = ConfigDocument::new(Arc::clone(registry), &HarnessConfig::default());
    for _ in 0..pairs {
        let source = doc.file_source(FileSourceOptions::new().follow_freq(1)).unwrap();
        let rewrite = doc.rewrite_set_tag("bench").unwrap();
        let destination = doc
            .file_destination(FileDestinationOptions::new().template("$ISODATE $MSG\n"))
            .unwrap();
        doc.create_logpath([source.id(), &rewrite, destination.id()]).unwrap();
    }
    doc
}

fn bench_render(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ResourceRegistry::new(dir.path()).unwrap());
    let mut group = c.benchmark_group("render");

    for pairs in [1, 10, 100] {
        let doc = document(&registry, pairs);
        group.bench_with_input(BenchmarkId::new("logpaths", pairs), &doc, |b, doc| {
            b.iter(|| black_box(doc.render().unwrap()))
        });
    }
    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let bsd = LogMessageFields::bsd_defaults().hostname("bench-host");
    let ietf = LogMessageFields::ietf_defaults()
        .hostname("bench-host")
        .message("árvíztűrő tükörfúrógép");

    c.bench_function("format_bsd", |b| {
        b.iter(|| black_box(format_message(&bsd, MessageFormat::Bsd, true)))
    });
    c.bench_function("format_ietf", |b| {
        b.iter(|| black_box(format_message(&ietf, MessageFormat::Ietf, true)))
    });

    let generator = MessageGenerator::ietf();
    c.bench_function("generate_1000", |b| b.iter(|| black_box(generator.generate(1000))));
}

criterion_group!(benches, bench_render, bench_format);
criterion_main!(benches);
