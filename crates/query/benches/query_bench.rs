//! Benchmarks for query evaluation.
//!
//! Catalogs are built once per size outside the measured closure; each
//! iteration evaluates a complete query against it.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use tabula_query::ast::{
    CountArgument, DataSource, EvaluatableNode, FromItem, FunctionCall, JoinCondition, JoinKind,
    OverClause, QueryExpression, Select, SelectField, SortOrder,
};
use tabula_query::executor::SortExecutor;
use tabula_query::{execute, Catalog, Table, Type, Value};

// ============================================================================
// Data Generation Utilities
// ============================================================================

/// Simple LCG for reproducible pseudo-random shuffling
fn shuffle_indices(count: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..count).collect();
    let mut s = seed;
    for i in (1..count).rev() {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        let j = (s as usize) % (i + 1);
        indices.swap(i, j);
    }
    indices
}

/// `(id, name, bucket)` rows in shuffled order.
fn create_table(count: usize, seed: u64) -> Table {
    let rows = shuffle_indices(count, seed)
        .into_iter()
        .map(|i| {
            vec![
                Value::Integer(i as i64),
                Value::String(format!("name_{}", i)),
                Value::Integer((i % 100) as i64),
            ]
        })
        .collect();
    Table::from_rows(
        vec![("id", Type::INTEGER), ("name", Type::STRING), ("bucket", Type::INTEGER)],
        rows,
    )
    .unwrap()
}

fn create_catalog(count: usize) -> Catalog {
    Catalog::new()
        .with_table("bench", "data", "items", create_table(count, 12345))
        .with_table("bench", "data", "others", create_table(count / 10, 67890))
}

fn items() -> DataSource {
    DataSource::new(FromItem::table(&["items"]).unwrap())
}

fn field(path: &str) -> EvaluatableNode {
    EvaluatableNode::field(path)
}

// ============================================================================
// Query Benchmarks
// ============================================================================

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in [100, 1000, 10000].iter() {
        let catalog = create_catalog(*size);
        let query = QueryExpression::new(
            Select::new(vec![SelectField::star()])
                .from(items())
                .filter(EvaluatableNode::lt(field("bucket"), EvaluatableNode::literal(10i64))),
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

fn bench_group_by(c: &mut Criterion) {
    let mut group = c.benchmark_group("group_by");

    for size in [100, 1000, 10000].iter() {
        let catalog = create_catalog(*size);
        let count = FunctionCall::count(CountArgument::Star, None).unwrap();
        let sum = FunctionCall::new("sum", vec![field("id")], None).unwrap();
        let query = QueryExpression::new(
            Select::new(vec![
                SelectField::expr(field("bucket"), None),
                SelectField::expr(EvaluatableNode::call(count), Some("n")),
                SelectField::expr(EvaluatableNode::call(sum), Some("total")),
            ])
            .from(items())
            .group_by(vec![field("bucket")])
            .unwrap(),
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

fn bench_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_number");

    for size in [100, 1000, 10000].iter() {
        let catalog = create_catalog(*size);
        let over = OverClause::new(vec![field("bucket")], vec![(field("id"), SortOrder::Desc)]);
        let row_number = FunctionCall::new("row_number", vec![], Some(over)).unwrap();
        let query = QueryExpression::new(
            Select::new(vec![
                SelectField::expr(field("id"), None),
                SelectField::expr(EvaluatableNode::call(row_number), Some("rn")),
            ])
            .from(items()),
        );
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

fn bench_join_using(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_using");

    for size in [100, 1000, 10000].iter() {
        let catalog = create_catalog(*size);
        let source = items()
            .join(
                JoinKind::Inner,
                FromItem::table(&["others"]).unwrap(),
                JoinCondition::Using(vec!["id".to_string()]),
            )
            .unwrap();
        let query = QueryExpression::new(Select::new(vec![SelectField::star()]).from(source));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

fn bench_join_on(c: &mut Criterion) {
    let mut group = c.benchmark_group("join_on");

    // Smaller sizes: ON evaluates the condition over the full product
    for size in [100, 500, 1000].iter() {
        let catalog = create_catalog(*size);
        let source = items()
            .join(
                JoinKind::Left,
                FromItem::table(&["others"]).unwrap(),
                JoinCondition::On(EvaluatableNode::eq(field("items.id"), field("others.id"))),
            )
            .unwrap();
        let query = QueryExpression::new(Select::new(vec![SelectField::star()]).from(source));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

fn bench_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("sort");

    for size in [100, 1000, 10000].iter() {
        let table = create_table(*size, 12345);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter_batched(
                || table.clone(),
                |input| {
                    let sort = SortExecutor::new(vec![(2, SortOrder::Asc), (0, SortOrder::Desc)]);
                    black_box(sort.execute(input))
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

fn bench_order_by_limit(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_by_limit");

    for size in [100, 1000, 10000].iter() {
        let catalog = create_catalog(*size);
        let query = QueryExpression::new(Select::new(vec![SelectField::star()]).from(items()))
            .order_by(vec![(field("name"), SortOrder::Asc)])
            .limit(EvaluatableNode::literal(10i64), None);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(execute(&query, &catalog).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_filter,
    bench_group_by,
    bench_window,
    bench_join_using,
    bench_join_on,
    bench_sort,
    bench_order_by_limit,
);

criterion_main!(benches);
