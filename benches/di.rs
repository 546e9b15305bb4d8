use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use ferrous_inject::*;
use futures::executor::block_on;

// ===== Micro Benchmarks =====

fn bench_singleton_hit(c: &mut Criterion) {
    let app = ModuleDefinition::new("App").provider(Provider::value("ANSWER", 42u64));
    let container = block_on(Container::builder(app).build()).unwrap();
    let token = Token::named("ANSWER");

    c.bench_function("singleton_hit_u64", |b| {
        b.iter(|| {
            let v = block_on(container.get::<u64>(&token)).unwrap();
            black_box(v);
        })
    });
}

fn bench_bootstrap(c: &mut Criterion) {
    struct ExpensiveToCreate {
        data: Vec<u64>,
    }

    c.bench_function("bootstrap_eager_expensive", |b| {
        b.iter_batched(
            || {
                ModuleDefinition::new("App").provider(Provider::class::<ExpensiveToCreate, _>(|_| {
                    Ok(ExpensiveToCreate {
                        data: (0..1000).collect(),
                    })
                }))
            },
            |app| {
                let container = block_on(Container::builder(app).build()).unwrap();
                let v = block_on(container.get_required::<ExpensiveToCreate>()).unwrap();
                black_box(v.data.len());
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_request_vs_transient(c: &mut Criterion) {
    struct Service {
        data: [u8; 64],
    }

    let mut group = c.benchmark_group("request_vs_transient");
    let token = Token::of::<Service>();

    let app = ModuleDefinition::new("App")
        .provider(Provider::class::<Service, _>(|_| Ok(Service { data: [0; 64] })).scope(Scope::Request));
    let container = block_on(Container::builder(app).build()).unwrap();
    let context = container.context_ids().create();

    group.bench_function("request_hit", |b| {
        b.iter(|| {
            let v = block_on(container.resolve::<Service>(&token, Some(&context))).unwrap();
            black_box(&v.data);
        })
    });

    group.bench_function("request_fresh_context", |b| {
        b.iter(|| {
            let v = block_on(container.resolve::<Service>(&token, None)).unwrap();
            black_box(&v.data);
        })
    });

    let app = ModuleDefinition::new("App")
        .provider(Provider::class::<Service, _>(|_| Ok(Service { data: [0; 64] })).scope(Scope::Transient));
    let container = block_on(Container::builder(app).build()).unwrap();

    group.bench_function("transient", |b| {
        b.iter(|| {
            let v = block_on(container.resolve::<Service>(&token, None)).unwrap();
            black_box(&v.data);
        })
    });

    group.finish();
}

fn bench_multi_provider_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("multi_provider_scaling");

    for count in [1usize, 8, 64] {
        let app = (0..count).fold(ModuleDefinition::new("App"), |module, i| {
            module.provider(Provider::factory("HANDLERS", move |_| async move { Ok(i) }).multi())
        });
        let container = block_on(Container::builder(app).build()).unwrap();
        let token = Token::named("HANDLERS");

        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                let all = block_on(container.get_all::<usize>(&token)).unwrap();
                black_box(all.len());
            })
        });
    }

    group.finish();
}

// ===== Macro Benchmarks =====

/// Request-scoped chain `L0 -> L1 -> ... -> L{depth-1}` resolved in a fresh
/// context per iteration.
fn bench_request_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("request_chain_depth");

    for depth in [2usize, 8, 32] {
        let app = (0..depth).fold(ModuleDefinition::new("App"), |module, i| {
            let name = format!("L{}", i);
            let provider = if i + 1 < depth {
                Provider::factory(name, |deps| async move { Ok(*deps.get::<usize>(0)? + 1) })
                    .inject(Token::named(format!("L{}", i + 1)))
            } else {
                Provider::factory(name, |_| async { Ok(0usize) }).scope(Scope::Request)
            };
            module.provider(provider)
        });
        let container = block_on(Container::builder(app).build()).unwrap();
        let token = Token::named("L0");

        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| {
                let context = container.context_ids().create();
                let v = block_on(container.resolve::<usize>(&token, Some(&context))).unwrap();
                black_box(*v);
            })
        });
    }

    group.finish();
}

fn bench_module_graph_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("module_graph_scan");

    for modules in [4usize, 32] {
        group.bench_with_input(BenchmarkId::from_parameter(modules), &modules, |b, &modules| {
            b.iter_batched(
                || {
                    let mut builder = ContainerBuilder::new(
                        (0..modules).fold(ModuleDefinition::new("App"), |app, i| app.import(format!("M{}", i))),
                    )
                    .options(ContainerOptions::default().lazy());
                    for i in 0..modules {
                        let mut module = ModuleDefinition::new(format!("M{}", i))
                            .provider(Provider::value(format!("V{}", i), i))
                            .export(format!("V{}", i));
                        if i > 0 {
                            module = module.import(format!("M{}", i - 1));
                        }
                        builder = builder.declare(module);
                    }
                    builder
                },
                |builder| {
                    let container = block_on(builder.build()).unwrap();
                    black_box(container.graph().len());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_contention(c: &mut Criterion) {
    let app = ModuleDefinition::new("App").provider(Provider::value("SHARED", 7u64));
    let container = block_on(Container::builder(app).build()).unwrap();

    c.bench_function("contention_get_8_threads", |b| {
        b.iter(|| {
            std::thread::scope(|scope| {
                for _ in 0..8 {
                    scope.spawn(|| {
                        let token = Token::named("SHARED");
                        for _ in 0..100 {
                            black_box(block_on(container.get::<u64>(&token)).unwrap());
                        }
                    });
                }
            });
        })
    });
}

criterion_group!(
    micro_benches,
    bench_singleton_hit,
    bench_bootstrap,
    bench_request_vs_transient,
    bench_multi_provider_scaling
);

criterion_group!(macro_benches, bench_request_chain_depth, bench_module_graph_scan, bench_contention);

criterion_main!(micro_benches, macro_benches);
