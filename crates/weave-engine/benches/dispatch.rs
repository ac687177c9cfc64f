use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use weave_engine::{
    AdvicePolicy, AdviceSpec, EngineConfig, FnTarget, Invocation, MethodDescriptor, Proxy,
    ProxyFactory, Target, TargetDescriptor, TypeRef, Value,
};

fn descriptor() -> Arc<TargetDescriptor> {
    Arc::new(
        TargetDescriptor::builder("Counter")
            .method(MethodDescriptor::new("add", vec![TypeRef::I32, TypeRef::I32], TypeRef::I32))
            .method(MethodDescriptor::new("label", vec![TypeRef::Str], TypeRef::Str))
            .build(),
    )
}

fn target() -> Arc<dyn Target> {
    Arc::new(FnTarget::new("Counter", |method: &MethodDescriptor, args: &[Value]| {
        match (method.name(), args) {
            ("add", [Value::I32(a), Value::I32(b)]) => Ok(Value::I32(a + b)),
            (_, [value]) => Ok(value.clone()),
            _ => Ok(Value::Void),
        }
    }))
}

fn advised_policy() -> AdvicePolicy {
    AdvicePolicy::new()
        .with(AdviceSpec::before("noop", |_| Ok(())))
        .with(AdviceSpec::around("pass", |inv: &mut Invocation<'_>| inv.proceed()))
}

fn proxy(config: EngineConfig, policy: &AdvicePolicy) -> Proxy {
    ProxyFactory::with_config(config)
        .create_proxy(&descriptor(), target(), policy)
        .unwrap()
}

fn bench_direct_vs_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");
    let args = [Value::I32(20), Value::I32(22)];

    let direct = proxy(EngineConfig::default(), &AdvicePolicy::new());
    group.bench_function("direct", |b| {
        b.iter(|| direct.invoke(black_box("add"), black_box(&args)).unwrap());
    });

    let chained = proxy(EngineConfig::default(), &advised_policy());
    group.bench_function("chain", |b| {
        b.iter(|| chained.invoke(black_box("add"), black_box(&args)).unwrap());
    });

    group.finish();
}

fn bench_fused_vs_interpreted(c: &mut Criterion) {
    let mut group = c.benchmark_group("stubs");
    let args = [Value::I32(1), Value::I32(2)];

    for fuse_stubs in [true, false] {
        let config = EngineConfig {
            fuse_stubs,
            ..EngineConfig::default()
        };
        let proxy = proxy(config, &advised_policy());
        let label = if fuse_stubs { "fused" } else { "interpreted" };
        group.bench_with_input(BenchmarkId::new("chain", label), &proxy, |b, proxy| {
            b.iter(|| proxy.invoke(black_box("add"), black_box(&args)).unwrap());
        });
    }

    group.finish();
}

fn bench_create_proxy(c: &mut Criterion) {
    let factory = ProxyFactory::new();
    let descriptor = descriptor();
    let policy = advised_policy();
    factory.create_proxy(&descriptor, target(), &policy).unwrap();

    c.bench_function("create_proxy_cached", |b| {
        b.iter(|| {
            factory
                .create_proxy(black_box(&descriptor), target(), &policy)
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_direct_vs_chain, bench_fused_vs_interpreted, bench_create_proxy);
criterion_main!(benches);
