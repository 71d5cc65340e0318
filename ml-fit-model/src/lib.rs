//! Pipeline composition, trained models, evaluation and persistence
//!
//! A [`Pipeline`] is an ordered list of stage and trainer specifications.
//! Fitting it against a [`Dataset`] produces an immutable [`Model`] that can
//! transform whole datasets lazily, be evaluated with the task-specific
//! metrics in [`evaluate`], be saved and loaded through [`ModelStore`], and
//! score typed records through a [`PredictionEngine`].

#![warn(missing_docs)]

pub mod engine;
pub mod evaluate;
pub mod model;
pub mod pipeline;
pub mod store;

pub use engine::PredictionEngine;
pub use evaluate::{
    evaluate_binary, evaluate_clustering, evaluate_multiclass, evaluate_regression, BinaryMetrics,
    ClusteringMetrics, ConfusionMatrix, MulticlassMetrics, RegressionMetrics,
};
pub use model::{FittedStep, Model, ModelBinding, TransformedView};
pub use pipeline::{Pipeline, Step};
pub use store::{ModelArtifact, ModelStore, FORMAT_VERSION, MAGIC, SUPPORTED_VERSIONS};

// Re-export the building blocks so callers can depend on this crate alone
pub use ml_fit_core::{
    train_test_split, Dataset, Error, FromRow, InMemoryDataset, PipelineConfig, Record, Result, RowView, Schema,
};
pub use ml_fit_trainers::{
    ConvergenceWarning, FastTree, FitDiagnostics, KMeans, LogisticRegression, MatrixFactorization, MaximumEntropy,
    TrainerSpec, PREDICTED_LABEL, PROBABILITY, SCORE,
};
pub use ml_fit_transforms::{
    CacheCheckpoint, Concatenate, CopyColumn, FeaturizeText, KeyOrdering, MapKeyToValue, MapValueToKey,
    OneHotEncoding, StageSpec, TextFeaturizerOptions,
};

#[cfg(test)]
mod tests {
    use super::*;
    use ml_fit_core::{DataType, Field, Row, Value};
    use std::sync::Arc;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            worker_threads: 2,
            ..PipelineConfig::with_seed(7)
        }
    }

    #[derive(Debug, Clone)]
    struct SentimentIssue {
        text: String,
        label: bool,
    }

    impl SentimentIssue {
        fn new(text: &str, label: bool) -> Self {
            Self {
                text: text.to_string(),
                label,
            }
        }
    }

    impl Record for SentimentIssue {
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

    #[derive(Debug, Clone, PartialEq)]
    struct SentimentPrediction {
        prediction: bool,
        probability: f32,
        score: f32,
    }

    impl FromRow for SentimentPrediction {
        fn from_row(view: &RowView<'_>) -> Result<Self> {
            Ok(Self {
                prediction: view.bool(PREDICTED_LABEL)?,
                probability: view.float(PROBABILITY)?,
                score: view.float(SCORE)?,
            })
        }
    }

    fn sentiment_pipeline() -> Pipeline {
        Pipeline::new()
            .append(FeaturizeText::new("Features", "SentimentText"))
            .append_trainer(LogisticRegression::default())
    }

    fn sentiment_data() -> InMemoryDataset {
        InMemoryDataset::from_records(&[
            SentimentIssue::new("great food", true),
            SentimentIssue::new("terrible service", false),
            SentimentIssue::new("great staff, lovely place", true),
            SentimentIssue::new("terrible, rude and slow", false),
        ])
    }

    #[test]
    fn test_sentiment_scenario() {
        init_tracing();
        let model = sentiment_pipeline().fit(&sentiment_data(), &config()).unwrap();
        let engine = PredictionEngine::<SentimentIssue, SentimentPrediction>::new(Arc::new(model)).unwrap();

        let positive = engine.predict(&SentimentIssue::new("great food", false)).unwrap();
        assert!(positive.prediction);
        assert!(positive.probability > 0.5);

        let negative = engine.predict(&SentimentIssue::new("terrible service", true)).unwrap();
        assert!(!negative.prediction);
        assert!(negative.probability < 0.5);
    }

    #[test]
    fn test_batch_matches_single_predictions() {
        let model = Arc::new(sentiment_pipeline().fit(&sentiment_data(), &config()).unwrap());
        let engine = PredictionEngine::<SentimentIssue, SentimentPrediction>::new(model).unwrap();

        let inputs: Vec<SentimentIssue> = ["great", "terrible food", "", "lovely lovely place", "slow service"]
            .iter()
            .map(|text| SentimentIssue::new(text, false))
            .collect();
        let batch = engine.predict_batch(&inputs).unwrap();
        let single: Vec<SentimentPrediction> = inputs.iter().map(|i| engine.predict(i).unwrap()).collect();
        assert_eq!(batch, single);
    }

    fn shared_engine() -> &'static PredictionEngine<SentimentIssue, SentimentPrediction> {
        static ENGINE: std::sync::OnceLock<PredictionEngine<SentimentIssue, SentimentPrediction>> =
            std::sync::OnceLock::new();
        ENGINE.get_or_init(|| {
            let model = sentiment_pipeline().fit(&sentiment_data(), &config()).unwrap();
            PredictionEngine::new(Arc::new(model)).unwrap()
        })
    }

    proptest::proptest! {
        #[test]
        fn test_batch_equals_single_for_any_text(texts in proptest::collection::vec("[a-z ,.!]{0,40}", 1..20)) {
            let engine = shared_engine();
            let inputs: Vec<SentimentIssue> = texts.iter().map(|t| SentimentIssue::new(t, false)).collect();
            let batch = engine.predict_batch(&inputs).unwrap();
            for (input, predicted) in inputs.iter().zip(&batch) {
                proptest::prop_assert_eq!(&engine.predict(input).unwrap(), predicted);
            }
        }
    }

    #[test]
    fn test_store_round_trip_preserves_predictions() {
        init_tracing();
        let config = config();
        let model = sentiment_pipeline().fit(&sentiment_data(), &config).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("sentiment.bin");

        ModelStore::save(&model, &path, &config).unwrap();
        let (loaded, schema) = ModelStore::load(&path, &config).unwrap();
        assert_eq!(&schema, model.input_schema());
        assert_eq!(loaded.id(), model.id());
        assert_eq!(loaded.steps(), model.steps());

        let original = PredictionEngine::<SentimentIssue, SentimentPrediction>::new(Arc::new(model)).unwrap();
        let reloaded = PredictionEngine::<SentimentIssue, SentimentPrediction>::new(Arc::new(loaded)).unwrap();
        for text in ["great food", "terrible service", "never seen words"] {
            let input = SentimentIssue::new(text, false);
            assert_eq!(original.predict(&input).unwrap(), reloaded.predict(&input).unwrap());
        }
    }

    #[test]
    fn test_store_rejects_damaged_artifacts() {
        let config = config();
        let model = sentiment_pipeline().fit(&sentiment_data(), &config).unwrap();
        let mut bytes = Vec::new();
        ModelStore::save_to_writer(&model, &mut bytes).unwrap();

        let mut flipped = bytes.clone();
        let last = flipped.len() - 1;
        flipped[last] ^= 0xff;
        let result = ModelStore::load_from_reader(&mut flipped.as_slice(), &config);
        assert!(matches!(result, Err(Error::CorruptArtifact(_))));

        let mut future = bytes.clone();
        future[4..8].copy_from_slice(&99u32.to_le_bytes());
        let result = ModelStore::load_from_reader(&mut future.as_slice(), &config);
        assert!(matches!(result, Err(Error::Version { found: 99, .. })));

        let result = ModelStore::load_from_reader(&mut &bytes[..5], &config);
        assert!(matches!(result, Err(Error::CorruptArtifact(_))));

        let mut foreign = bytes;
        foreign[0] = b'X';
        let result = ModelStore::load_from_reader(&mut foreign.as_slice(), &config);
        assert!(matches!(result, Err(Error::CorruptArtifact(_))));
    }

    #[test]
    fn test_store_rejects_inconsistent_payload_without_checksum() {
        let config = PipelineConfig {
            verify_checksum: false,
            ..config()
        };
        let model = sentiment_pipeline().fit(&sentiment_data(), &config).unwrap();
        let mut bytes = Vec::new();
        ModelStore::save_to_writer(&model, &mut bytes).unwrap();
        assert!(ModelStore::load_from_reader(&mut bytes.as_slice(), &config).is_ok());

        let mut artifact: ModelArtifact = bincode::deserialize(&bytes[12..]).unwrap();
        artifact.input_schema = Schema::new(vec![Field::new("Other", DataType::Float)]);
        let mut swapped = bytes[..12].to_vec();
        swapped.extend(bincode::serialize(&artifact).unwrap());

        let result = ModelStore::load_from_reader(&mut swapped.as_slice(), &config);
        assert!(matches!(result, Err(Error::CorruptArtifact(_))));
    }

    #[test]
    fn test_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ModelStore::load(dir.path().join("absent.bin"), &config());
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_binary_evaluation() {
        let model = sentiment_pipeline().fit(&sentiment_data(), &config()).unwrap();
        let metrics = evaluate_binary(&model, &sentiment_data(), "Label").unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert!((metrics.area_under_roc_curve - 1.0).abs() < 1e-9);
        assert!(metrics.log_loss > 0.0);
    }

    #[test]
    fn test_evaluate_empty_dataset() {
        let model = sentiment_pipeline().fit(&sentiment_data(), &config()).unwrap();
        let empty = InMemoryDataset::from_records::<SentimentIssue>(&[]);
        let result = evaluate_binary(&model, &empty, "Label");
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    fn taxi(vendors: &[&str]) -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("VendorId", DataType::String),
            Field::new("TripDistance", DataType::Float),
            Field::new("FareAmount", DataType::Float),
        ]));
        let rows = (0..30)
            .map(|i| {
                let vendor = vendors[i % vendors.len()];
                let distance = (i % 6) as f32;
                let surcharge = if vendor == "VTS" { 1.0 } else { 0.0 };
                Row::new(vec![
                    Value::from(vendor),
                    Value::Float(distance),
                    Value::Float(2.5 + 2.0 * distance + surcharge),
                ])
            })
            .collect();
        InMemoryDataset::new(schema, rows).unwrap()
    }

    fn taxi_pipeline() -> Pipeline {
        Pipeline::new()
            .append(CopyColumn::new("Label", "FareAmount"))
            .append(OneHotEncoding::new("VendorIdEncoded", "VendorId"))
            .append(Concatenate::new("Features", &["VendorIdEncoded", "TripDistance"]))
            .append_trainer(FastTree::default().with_number_of_trees(30))
    }

    #[test]
    fn test_regression_r_squared_on_training_data() {
        let data = taxi(&["VTS", "CMT"]);
        let model = taxi_pipeline().fit(&data, &config()).unwrap();
        let metrics = evaluate_regression(&model, &data, "Label").unwrap();
        assert!(metrics.r_squared <= 1.0);
        assert!(metrics.r_squared > 0.5);
        assert!((metrics.root_mean_squared_error.powi(2) - metrics.mean_squared_error).abs() < 1e-9);
    }

    #[test]
    fn test_unseen_category_scores() {
        let model = taxi_pipeline().fit(&taxi(&["VTS", "CMT"]), &config()).unwrap();
        let unseen = taxi(&["XYZ"]);
        let scored = model.transform(&unseen).unwrap();
        let rows = ml_fit_core::collect_rows(&scored, 16).unwrap();
        let schema = scored.schema();
        for row in &rows {
            let score = RowView::new(&schema, row).float(SCORE).unwrap();
            assert!(score.is_finite());
        }
    }

    #[test]
    fn test_scoring_against_incompatible_schema() {
        let model = taxi_pipeline().fit(&taxi(&["VTS", "CMT"]), &config()).unwrap();
        let schema = Arc::new(Schema::new(vec![Field::new("VendorId", DataType::String)]));
        let err = model.bind(schema).unwrap_err();
        assert!(matches!(err, Error::Stage { index: 0, ref name, .. } if name == "CopyColumn"));
    }

    fn iris(single_class: bool) -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("Label", DataType::String),
            Field::new("PetalLength", DataType::Float),
            Field::new("PetalWidth", DataType::Float),
        ]));
        let species = ["setosa", "versicolor", "virginica"];
        let rows = (0..36)
            .map(|i| {
                let class = if single_class { 0 } else { i % 3 };
                let jitter = (i % 4) as f32 * 0.05;
                Row::new(vec![
                    Value::from(species[class]),
                    Value::Float(1.5 + 2.5 * class as f32 + jitter),
                    Value::Float(0.2 + 0.9 * class as f32 + jitter),
                ])
            })
            .collect();
        InMemoryDataset::new(schema, rows).unwrap()
    }

    fn iris_pipeline() -> Pipeline {
        Pipeline::new()
            .append(MapValueToKey::new("Label", "Label"))
            .append(Concatenate::new("Features", &["PetalLength", "PetalWidth"]))
            .append_trainer(MaximumEntropy::default())
            .append(MapKeyToValue::new("PredictedSpecies", PREDICTED_LABEL))
    }

    #[test]
    fn test_multiclass_scenario() {
        let data = iris(false);
        let model = iris_pipeline().fit(&data, &config()).unwrap();
        let metrics = evaluate_multiclass(&model, &data, "Label").unwrap();
        assert!(metrics.micro_accuracy > 0.6);
        assert!(metrics.log_loss_reduction > 0.0);
        assert_eq!(metrics.confusion_matrix.classes(), 3);
        assert_eq!(metrics.per_class_log_loss.len(), 3);

        let scored = model.transform(&data).unwrap();
        let rows = ml_fit_core::collect_rows(&scored, 64).unwrap();
        let schema = scored.schema();
        let first = RowView::new(&schema, &rows[0]);
        assert_eq!(first.string("PredictedSpecies").unwrap(), "setosa");
    }

    #[test]
    fn test_single_class_macro_equals_micro() {
        let data = iris(true);
        let model = iris_pipeline().fit(&data, &config()).unwrap();
        let metrics = evaluate_multiclass(&model, &data, "Label").unwrap();
        assert_eq!(metrics.macro_accuracy, metrics.micro_accuracy);
        assert_eq!(metrics.log_loss_reduction, 0.0);
    }

    #[test]
    fn test_clustering_scenario() {
        let data = iris(false);
        let pipeline = Pipeline::new()
            .append(MapValueToKey::new("Label", "Label"))
            .append(Concatenate::new("Features", &["PetalLength", "PetalWidth"]))
            .append_trainer(KMeans::new("Features", 3));
        let model = pipeline.fit(&data, &config()).unwrap();
        let metrics = evaluate_clustering(&model, &data, "Features", Some("Label")).unwrap();
        assert!(metrics.average_distance < 0.1);
        assert!(metrics.davies_bouldin_index >= 0.0);
        let nmi = metrics.normalized_mutual_information.unwrap();
        assert!(nmi > 0.9 && nmi <= 1.0);
    }

    fn ratings() -> InMemoryDataset {
        let schema = Arc::new(Schema::new(vec![
            Field::new("userId", DataType::Float),
            Field::new("movieId", DataType::Float),
            Field::new("Label", DataType::Float),
        ]));
        let mut rows = Vec::new();
        for _ in 0..20 {
            rows.push(Row::new(vec![Value::Float(6.0), Value::Float(10.0), Value::Float(4.0)]));
        }
        for user in 1..=4 {
            for movie in 1..=4 {
                rows.push(Row::new(vec![
                    Value::Float(user as f32),
                    Value::Float(movie as f32),
                    Value::Float(1.0),
                ]));
            }
        }
        InMemoryDataset::new(schema, rows).unwrap()
    }

    #[test]
    fn test_recommendation_scenario() {
        let pipeline = Pipeline::new()
            .append(MapValueToKey::new("userIdEncoded", "userId"))
            .append(MapValueToKey::new("movieIdEncoded", "movieId"))
            .append_trainer(MatrixFactorization::default().with_iterations(40));
        let data = ratings();
        let model = pipeline.fit(&data, &config()).unwrap();

        let probe = InMemoryDataset::new(
            data.schema(),
            vec![
                Row::new(vec![Value::Float(6.0), Value::Float(10.0), Value::Float(0.0)]),
                Row::new(vec![Value::Float(99.0), Value::Float(98.0), Value::Float(0.0)]),
            ],
        )
        .unwrap();
        let scored = model.transform(&probe).unwrap();
        let schema = scored.schema();
        let rows = ml_fit_core::collect_rows(&scored, 8).unwrap();
        let seen = RowView::new(&schema, &rows[0]).float(SCORE).unwrap();
        let cold = RowView::new(&schema, &rows[1]).float(SCORE).unwrap();
        assert!(seen > 3.5, "seen pair scored {}", seen);
        assert!(seen > cold);
    }

    #[test]
    fn test_convergence_warning_is_exposed() {
        let pipeline = Pipeline::new()
            .append(FeaturizeText::new("Features", "SentimentText"))
            .append_trainer(LogisticRegression::default().with_max_iterations(1));
        let model = pipeline.fit(&sentiment_data(), &config()).unwrap();
        let warnings = model.convergence_warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].iterations, 1);
    }
}
