use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nairobi_tea::news::{excerpt, Article, ArticleDraft, ArticleUpdate, Category};
use nairobi_tea::storage::{ArticleRepository, LocalStorage, MemoryStorage};
use nairobi_tea::upload::EmbeddedImageUploader;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

fn records(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            let category = Category::ALL[i % Category::ALL.len()];
            let draft = ArticleDraft::new(
                format!("Story {}", i),
                "Paragraph one.\nParagraph two.\nParagraph three.".repeat(4),
                category,
            );
            Article::from_draft(draft, String::new())
                .to_record()
                .expect("article serializes")
        })
        .collect()
}

fn memory_repository(count: usize) -> ArticleRepository {
    ArticleRepository::new(
        Arc::new(MemoryStorage::with_records(records(count))),
        Arc::new(EmbeddedImageUploader::default()),
    )
}

fn bench_list(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("repository_list");

    for &count in &[10, 100, 1000] {
        let repo = memory_repository(count);
        group.bench_with_input(BenchmarkId::new("memory", count), &repo, |b, repo| {
            b.iter(|| black_box(rt.block_on(repo.list()).unwrap()));
        });
    }

    group.finish();
}

fn bench_by_category(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = memory_repository(1000);

    c.bench_function("by_category_sports_1000", |b| {
        b.iter(|| black_box(rt.block_on(repo.by_category(Some(Category::Sports))).unwrap()));
    });
}

fn bench_create(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("repository_create");
    group.sample_size(20);

    let repo = memory_repository(100);
    group.bench_function("memory", |b| {
        b.iter(|| {
            let draft = ArticleDraft::new("Breaking", "Body", Category::Politics);
            black_box(rt.block_on(repo.create(draft)).unwrap())
        });
    });

    let dir = TempDir::new().unwrap();
    let local = ArticleRepository::new(
        Arc::new(LocalStorage::new(dir.path(), "bench").unwrap()),
        Arc::new(EmbeddedImageUploader::default()),
    );
    group.bench_function("local", |b| {
        b.iter(|| {
            let draft = ArticleDraft::new("Breaking", "Body", Category::Politics);
            black_box(rt.block_on(local.create(draft)).unwrap())
        });
    });

    group.finish();
}

fn bench_update_views(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let repo = memory_repository(500);
    let id = rt.block_on(repo.list()).unwrap()[250].id.clone();
    let mut views = 0;

    c.bench_function("update_views_500", |b| {
        b.iter(|| {
            views += 1;
            black_box(rt.block_on(repo.update(&id, ArticleUpdate::views(views))).unwrap())
        });
    });
}

fn bench_excerpt(c: &mut Criterion) {
    let text = "Habari za asubuhi kutoka Nairobi. ".repeat(50);
    c.bench_function("excerpt_120", |b| b.iter(|| black_box(excerpt(&text, 120))));
}

criterion_group!(
    benches,
    bench_list,
    bench_by_category,
    bench_create,
    bench_update_views,
    bench_excerpt
);
criterion_main!(benches);
