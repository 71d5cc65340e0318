//! Taxi fare regression

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use ml_fit_core::{DataType, Field, FromRow, Record, Result, Row, RowView, Schema, Value};
use ml_fit_model::{
    evaluate_regression, Concatenate, CopyColumn, FastTree, OneHotEncoding, Pipeline, PipelineConfig,
    PredictionEngine, RegressionMetrics, SCORE,
};
use ml_fit_readers::{CsvDataset, CsvReaderOptions};
use tracing::info;

use super::{save_and_reload, RULE};

/// One trip, as laid out in the fare files
#[derive(Debug, Clone, PartialEq)]
pub struct TaxiTrip {
    /// Vendor code
    pub vendor_id: String,

    /// Rate code
    pub rate_code: String,

    /// Number of passengers
    pub passenger_count: f32,

    /// Trip duration in seconds; loaded but not used as a feature
    pub trip_time: f32,

    /// Trip distance in miles
    pub trip_distance: f32,

    /// Payment type code
    pub payment_type: String,

    /// Fare paid
    pub fare_amount: f32,
}

impl Record for TaxiTrip {
    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("VendorId", DataType::String),
            Field::new("RateCode", DataType::String),
            Field::new("PassengerCount", DataType::Float),
            Field::new("TripTime", DataType::Float),
            Field::new("TripDistance", DataType::Float),
            Field::new("PaymentType", DataType::String),
            Field::new("FareAmount", DataType::Float),
        ])
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            Value::from(self.vendor_id.as_str()),
            Value::from(self.rate_code.as_str()),
            Value::Float(self.passenger_count),
            Value::Float(self.trip_time),
            Value::Float(self.trip_distance),
            Value::from(self.payment_type.as_str()),
            Value::Float(self.fare_amount),
        ])
    }
}

/// Predicted fare
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaxiTripFarePrediction {
    /// Predicted fare amount
    pub fare_amount: f32,
}

impl FromRow for TaxiTripFarePrediction {
    fn from_row(view: &RowView<'_>) -> Result<Self> {
        Ok(Self {
            fare_amount: view.float(SCORE)?,
        })
    }
}

/// Files of the taxi task
#[derive(Debug, Clone)]
pub struct TaxiTask {
    /// Training file with a header row
    pub train: PathBuf,

    /// Test file with a header row
    pub test: PathBuf,

    /// Where to save the model
    pub model: PathBuf,
}

/// Outcome of the taxi task
#[derive(Debug, Clone)]
pub struct TaxiReport {
    /// Metrics on the test file
    pub metrics: RegressionMetrics,

    /// The trip scored after reloading
    pub sample: TaxiTrip,

    /// Prediction for the sample trip
    pub prediction: TaxiTripFarePrediction,
}

/// Sample trip whose observed fare was 15.5
pub fn sample_trip() -> TaxiTrip {
    TaxiTrip {
        vendor_id: "VTS".to_string(),
        rate_code: "1".to_string(),
        passenger_count: 1.0,
        trip_time: 1140.0,
        trip_distance: 3.75,
        payment_type: "CRD".to_string(),
        fare_amount: 0.0,
    }
}

/// Load a fare file
pub fn load(path: &Path) -> Result<CsvDataset> {
    CsvDataset::load(path, CsvReaderOptions::default(), TaxiTrip::schema())
}

/// One-hot encoded categories and trip measures into boosted stumps
pub fn pipeline() -> Pipeline {
    Pipeline::new()
        .append(CopyColumn::new("Label", "FareAmount"))
        .append(OneHotEncoding::new("VendorIdEncoded", "VendorId"))
        .append(OneHotEncoding::new("RateCodeEncoded", "RateCode"))
        .append(OneHotEncoding::new("PaymentTypeEncoded", "PaymentType"))
        .append(Concatenate::new(
            "Features",
            &["VendorIdEncoded", "RateCodeEncoded", "PassengerCount", "TripDistance", "PaymentTypeEncoded"],
        ))
        .append_trainer(FastTree::new("Label", "Features"))
}

/// Run the whole task
pub fn run(task: &TaxiTask, config: &PipelineConfig) -> anyhow::Result<TaxiReport> {
    let train = load(&task.train).with_context(|| format!("loading {}", task.train.display()))?;
    let model = pipeline().fit(&train, config)?;

    let test = load(&task.test).with_context(|| format!("loading {}", task.test.display()))?;
    let metrics = evaluate_regression(&model, &test, "Label")?;
    info!(r_squared = metrics.r_squared, rmse = metrics.root_mean_squared_error, "Evaluated taxi model");

    let model = save_and_reload(&model, &task.model, config)?;
    let engine = PredictionEngine::<TaxiTrip, TaxiTripFarePrediction>::new(Arc::clone(&model))?;
    let sample = sample_trip();
    let prediction = engine.predict(&sample)?;

    Ok(TaxiReport {
        metrics,
        sample,
        prediction,
    })
}

impl fmt::Display for TaxiReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", &RULE[..49])?;
        writeln!(f, "*       Model quality metrics evaluation")?;
        writeln!(f, "*------------------------------------------------")?;
        writeln!(f, "*       RSquared Score:      {:.2}", self.metrics.r_squared)?;
        writeln!(f, "*       Root Mean Squared Error:      {:.2}", self.metrics.root_mean_squared_error)?;
        writeln!(f)?;
        writeln!(f, "{}", &RULE[..70])?;
        writeln!(f, "Predicted fare: {:.4}, actual fare: 15.5", self.prediction.fare_amount)?;
        writeln!(f, "{}", &RULE[..70])
    }
}
