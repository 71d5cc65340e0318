use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ml_fit_core::{DataType, Field, FromRow, InMemoryDataset, PipelineConfig, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{FeaturizeText, LogisticRegression, Pipeline, PredictionEngine, PROBABILITY};

struct Review {
    text: String,
    label: bool,
}

impl Record for Review {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("SentimentText", DataType::String),
            Field::new("Label", DataType::Bool),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![Value::from(self.text.as_str()), Value::Bool(self.label)])
    }
}

struct Probability(f32);

impl FromRow for Probability {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self(view.float(PROBABILITY)?))
    }
}

const WORDS: [&str; 12] = [
    "great", "terrible", "food", "service", "slow", "lovely", "rude", "staff", "place", "fresh", "cold", "friendly",
];

fn generate_reviews(count: usize) -> Vec<Review> {
    (0..count)
        .map(|i| {
            let text = (0..6).map(|j| WORDS[(i * 7 + j * 3) % WORDS.len()]).collect::<Vec<_>>().join(" ");
            Review {
                label: text.contains("great") || text.contains("lovely"),
                text,
            }
        })
        .collect()
}

fn bench_scoring(c: &mut Criterion) {
    let training = InMemoryDataset::from_records(&generate_reviews(500));
    let model = Pipeline::new()
        .append(FeaturizeText::new("Features", "SentimentText"))
        .append_trainer(LogisticRegression::default().with_max_iterations(50))
        .fit(&training, &PipelineConfig::with_seed(1))
        .unwrap();
    let engine = PredictionEngine::<Review, Probability>::new(Arc::new(model)).unwrap();

    let mut group = c.benchmark_group("scoring");
    for size in [100, 1000] {
        let inputs = generate_reviews(size);
        group.bench_with_input(BenchmarkId::new("single", size), &inputs, |b, inputs| {
            b.iter(|| {
                for input in inputs {
                    black_box(engine.predict(black_box(input)).unwrap());
                }
            })
        });
        group.bench_with_input(BenchmarkId::new("batch", size), &inputs, |b, inputs| {
            b.iter(|| black_box(engine.predict_batch(black_box(inputs)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
