//! End-to-end `check()` benchmarks across bundle sizes, action-fanout, and
//! cache configurations.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use cretoai_authz::{EngineConfig, Metadata, PolicyEngine, Principal, Request, Resource, ResourcePolicy, ResourceRule, Effect};
use std::sync::atomic::AtomicBool;

fn build_engine(policy_count: usize, cache_enabled: bool) -> PolicyEngine {
    let config = EngineConfig { cache_enabled, ..EngineConfig::default() };
    let engine = PolicyEngine::new(config).unwrap();
    let policies: Vec<ResourcePolicy> = (0..policy_count)
        .map(|i| ResourcePolicy {
            api_version: "v1".to_string(),
            metadata: Metadata::new(format!("policy-{i}")),
            resource: format!("document-{}", i % 100),
            scope: None,
            rules: vec![ResourceRule {
                name: None,
                actions: vec!["read".to_string()],
                effect: if i % 2 == 0 { Effect::Allow } else { Effect::Deny },
                roles: vec!["user".to_string()],
                derived_roles: vec![],
                condition: None,
            }],
        })
        .collect();
    engine.load_resource_policies(policies).unwrap();
    engine
}

fn bench_check_by_bundle_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_by_bundle_size");
    for policy_count in [10usize, 100, 1000] {
        let engine = build_engine(policy_count, false);
        let request = Request::new(
            Principal::new("alice").with_roles(["user".to_string()]),
            Resource::new("document-0", "d1"),
            vec!["read".to_string()],
        );
        let cancelled = AtomicBool::new(false);
        group.bench_with_input(BenchmarkId::new("policies", policy_count), &policy_count, |b, _| {
            b.iter(|| engine.check(black_box(&request), &cancelled).unwrap());
        });
    }
    group.finish();
}

fn bench_check_by_action_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_by_action_fanout");
    let engine = build_engine(50, false);
    for fanout in [1usize, 4, 16] {
        let actions: Vec<String> = (0..fanout).map(|_| "read".to_string()).collect();
        let request = Request::new(
            Principal::new("alice").with_roles(["user".to_string()]),
            Resource::new("document-0", "d1"),
            actions,
        );
        let cancelled = AtomicBool::new(false);
        group.bench_with_input(BenchmarkId::new("actions", fanout), &fanout, |b, _| {
            b.iter(|| engine.check(black_box(&request), &cancelled).unwrap());
        });
    }
    group.finish();
}

fn bench_cache_hit_vs_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hit_vs_miss");
    let engine = build_engine(100, true);
    let request = Request::new(
        Principal::new("alice").with_roles(["user".to_string()]),
        Resource::new("document-0", "d1"),
        vec!["read".to_string()],
    );
    let cancelled = AtomicBool::new(false);
    engine.check(&request, &cancelled).unwrap();
    group.bench_function("cache_hit", |b| {
        b.iter(|| engine.check(black_box(&request), &cancelled).unwrap());
    });
    group.finish();
}

criterion_group!(benches, bench_check_by_bundle_size, bench_check_by_action_fanout, bench_cache_hit_vs_miss);
criterion_main!(benches);
