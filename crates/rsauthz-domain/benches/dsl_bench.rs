//! Benchmarks for schema compilation and permission checks.
//!
//! Run with: cargo bench -p rsauthz-domain --bench dsl_bench

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use rsauthz_domain::cel::CelEvaluator;
use rsauthz_domain::compile_schema;
use rsauthz_domain::dsl::{parse, tokenize};
use rsauthz_domain::error::{DomainError, DomainResult};
use rsauthz_domain::model::{AttributeValue, RelationFilter, RelationTuple, Schema};
use rsauthz_domain::resolver::{
    AttributeReader, CheckRequest, Checker, Evaluator, RelationReader, ResolverConfig,
    SchemaReader,
};

const SCHEMA: &str = r#"
rule is_adult(subject) {
    subject.age >= 18
}

entity user {
    attribute age int
}

entity group {
    relation member @user
}

entity folder {
    relation owner @user
    relation viewer @user @group#member
    relation parent @folder

    permission view = owner or viewer or parent.view
}

entity document {
    relation owner @user
    relation editor @user @group#member
    relation banned @user
    relation parent @folder

    attribute is_public bool

    permission edit = owner or editor
    permission view = (edit or parent.view) and not banned
    permission read = rule(resource.is_public == true) or (view and is_adult(subject))
}
"#;

// =============================================================================
// Benchmark-specific readers
// =============================================================================

struct BenchRelations {
    tuples: Vec<RelationTuple>,
}

#[async_trait]
impl RelationReader for BenchRelations {
    async fn read_relations(
        &self,
        _tenant_id: &str,
        filter: &RelationFilter,
    ) -> DomainResult<Vec<RelationTuple>> {
        Ok(self
            .tuples
            .iter()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect())
    }
}

struct BenchAttributes;

#[async_trait]
impl AttributeReader for BenchAttributes {
    async fn read_attributes(
        &self,
        _tenant_id: &str,
        entity_type: &str,
        _entity_id: &str,
    ) -> DomainResult<HashMap<String, AttributeValue>> {
        let mut attributes = HashMap::new();
        match entity_type {
            "user" => attributes.insert("age".to_string(), AttributeValue::Int(30)),
            _ => attributes.insert("is_public".to_string(), AttributeValue::Bool(false)),
        };
        Ok(attributes)
    }
}

struct BenchSchemas {
    schema: Arc<Schema>,
}

#[async_trait]
impl SchemaReader for BenchSchemas {
    async fn latest_schema(&self, _tenant_id: &str) -> DomainResult<Arc<Schema>> {
        Ok(Arc::clone(&self.schema))
    }

    async fn schema_by_version(
        &self,
        tenant_id: &str,
        version: &str,
    ) -> DomainResult<Arc<Schema>> {
        Err(DomainError::SchemaNotFound {
            tenant_id: tenant_id.to_string(),
            version: Some(version.to_string()),
        })
    }
}

fn folder_chain(depth: usize) -> Vec<RelationTuple> {
    let mut tuples: Vec<RelationTuple> = (0..depth)
        .map(|i| {
            RelationTuple::new(
                "folder",
                format!("f{i}"),
                "parent",
                "folder",
                format!("f{}", i + 1),
            )
        })
        .collect();
    tuples.push(RelationTuple::new("document", "d1", "parent", "folder", "f0"));
    tuples.push(
        RelationTuple::new("folder", format!("f{depth}"), "viewer", "group", "eng")
            .with_subject_relation("member"),
    );
    tuples.push(RelationTuple::new("group", "eng", "member", "user", "alice"));
    tuples
}

// =============================================================================
// Benchmarks
// =============================================================================

fn dsl_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dsl");
    group.bench_function("tokenize", |b| b.iter(|| tokenize(black_box(SCHEMA))));
    group.bench_function("parse", |b| b.iter(|| parse(black_box(SCHEMA))));
    group.bench_function("compile", |b| {
        b.iter(|| compile_schema("bench", "v1", black_box(SCHEMA), Utc::now()))
    });
    group.finish();
}

fn check_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let schema = Arc::new(compile_schema("bench", "v1", SCHEMA, Utc::now()).unwrap());

    let mut group = c.benchmark_group("check");
    for depth in [1usize, 10, 50] {
        let evaluator = Arc::new(Evaluator::new(
            Arc::new(BenchRelations {
                tuples: folder_chain(depth),
            }),
            Arc::new(BenchAttributes),
            Arc::new(CelEvaluator::new()),
            ResolverConfig::default(),
        ));
        let checker = Checker::new(
            evaluator,
            Arc::new(BenchSchemas {
                schema: Arc::clone(&schema),
            }),
        );

        for permission in ["view", "read"] {
            let request = CheckRequest::new("bench", "document", "d1", permission, "user", "alice");
            group.bench_with_input(
                BenchmarkId::new(permission, depth),
                &request,
                |b, request| {
                    b.to_async(&rt).iter(|| async {
                        let result = checker.check(request).await.unwrap();
                        assert!(result.allowed);
                    })
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, dsl_benchmark, check_benchmark);
criterion_main!(benches);
