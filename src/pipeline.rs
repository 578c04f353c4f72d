//! End-to-end forecasting run: events in, selected model and forecast out.
//!
//! aggregate → regularize → decompose → cross-validate → select → refit →
//! forecast → diagnose. Every step consumes the previous step's immutable
//! output; failures are tagged with the [`Stage`] they occurred in.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{Forecast, HourWindow, RegularSeries};
use crate::error::{ForecastError, Result, Stage};
use crate::events::{AggregationStrategy, EventAggregator, RawEvent};
use crate::models::{FittedModel, ModelVariant};
use crate::seasonality::{DecompositionMethod, DecompositionResult, SeasonalDecomposer};
use crate::transform::{SeriesRange, SeriesRegularizer};
use crate::utils::{AccuracyReport, CVReport, CrossValidator};
use crate::validation::{DiagnosticResult, ResidualDiagnostics};

/// Which cycles the series is modelled with.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Seasonality {
    /// One cycle of one session day.
    Daily,
    /// A session day and a seven-day week.
    #[default]
    DailyWeekly,
    /// Caller-supplied periods in observations.
    Explicit(Vec<usize>),
}

impl Seasonality {
    /// Periods in observations for a grid with the given window and interval,
    /// ascending and without duplicates.
    pub fn periods(&self, window: HourWindow, interval: Duration) -> Result<Vec<usize>> {
        let mut periods = match self {
            Seasonality::Daily => vec![window.slots_per_day(interval)?],
            Seasonality::DailyWeekly => {
                let day = window.slots_per_day(interval)?;
                vec![day, 7 * day]
            }
            Seasonality::Explicit(p) => p.clone(),
        };
        periods.sort_unstable();
        periods.dedup();

        if periods.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "at least one seasonal period is required".to_string(),
            ));
        }
        if let Some(&p) = periods.iter().find(|&&p| p < 2) {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonal period must be at least 2, got {p}"
            )));
        }
        Ok(periods)
    }
}

/// Settings of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub strategy: AggregationStrategy,
    /// Bucket and grid interval. Must divide a day.
    pub interval_minutes: i64,
    pub range: SeriesRange,
    pub window: HourWindow,
    /// Value for slots without an observation.
    pub fill_value: f64,
    pub seasonality: Seasonality,
    pub decomposition: DecompositionMethod,
    /// Held-out tail length; one longest cycle when unset.
    pub holdout: Option<usize>,
    /// Forecast length after the series; one longest cycle when unset.
    pub horizon: Option<usize>,
    pub folds: usize,
    /// Distance between fold origins; the holdout length when unset.
    pub fold_step: Option<usize>,
    pub variants: Vec<ModelVariant>,
    /// Coverage of the forecast intervals.
    pub interval_level: f64,
    /// Significance level of the residual tests.
    pub significance: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            strategy: AggregationStrategy::DistinctTransactions,
            interval_minutes: 60,
            range: SeriesRange::FullSpan,
            window: HourWindow::business_hours(),
            fill_value: 0.0,
            seasonality: Seasonality::DailyWeekly,
            decomposition: DecompositionMethod::Auto,
            holdout: None,
            horizon: None,
            folds: 1,
            fold_step: None,
            variants: ModelVariant::defaults(),
            interval_level: 0.95,
            significance: 0.05,
        }
    }
}

impl PipelineConfig {
    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_interval_minutes(mut self, minutes: i64) -> Self {
        self.interval_minutes = minutes;
        self
    }

    pub fn with_range(mut self, range: SeriesRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_window(mut self, window: HourWindow) -> Self {
        self.window = window;
        self
    }

    pub fn with_seasonality(mut self, seasonality: Seasonality) -> Self {
        self.seasonality = seasonality;
        self
    }

    pub fn with_holdout(mut self, holdout: usize) -> Self {
        self.holdout = Some(holdout);
        self
    }

    pub fn with_horizon(mut self, horizon: usize) -> Self {
        self.horizon = Some(horizon);
        self
    }

    pub fn with_folds(mut self, folds: usize, step: usize) -> Self {
        self.folds = folds;
        self.fold_step = Some(step);
        self
    }

    pub fn with_variants(mut self, variants: Vec<ModelVariant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::minutes(self.interval_minutes)
    }

    /// Check the settings without touching any data.
    pub fn validate(&self) -> Result<()> {
        if self.interval_minutes <= 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "interval must be positive, got {} minutes",
                self.interval_minutes
            )));
        }
        self.window.slots_per_day(self.interval())?;
        SeasonalDecomposer::new(self.seasonality.periods(self.window, self.interval())?)?;

        if !self.fill_value.is_finite() {
            return Err(ForecastError::InvalidParameter(
                "fill value must be finite".to_string(),
            ));
        }
        if self.holdout == Some(0) || self.horizon == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "holdout and horizon must be positive".to_string(),
            ));
        }
        if self.folds == 0 || self.fold_step == Some(0) {
            return Err(ForecastError::InvalidParameter(
                "folds and fold step must be positive".to_string(),
            ));
        }
        if self.variants.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "no model variants configured".to_string(),
            ));
        }
        for (name, level) in [
            ("interval level", self.interval_level),
            ("significance", self.significance),
        ] {
            if !(level > 0.0 && level < 1.0) {
                return Err(ForecastError::InvalidParameter(format!(
                    "{name} must be in (0, 1), got {level}"
                )));
            }
        }
        Ok(())
    }
}

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub series: RegularSeries,
    pub periods: Vec<usize>,
    pub decomposition: DecompositionResult,
    pub evaluation: CVReport,
    /// Tag of the variant with the best holdout accuracy.
    pub selected: String,
    /// The selected variant refitted on the full series.
    pub model: FittedModel,
    pub forecast: Forecast,
    /// Residual checks of the refit model. Residuals the tests cannot be
    /// computed on leave the error here, tagged with the diagnose stage.
    pub diagnostics: Result<DiagnosticResult>,
}

impl PipelineReport {
    /// Holdout accuracy of the selected variant.
    pub fn selected_accuracy(&self) -> Option<&AccuracyReport> {
        self.evaluation.get(&self.selected).and_then(|o| o.report())
    }

    /// Whether both residual tests ran and passed.
    pub fn diagnostics_pass(&self) -> bool {
        self.diagnostics.as_ref().is_ok_and(|d| d.all_pass())
    }
}

/// Tag of the scored variant with the lowest RMSE.
///
/// Ties go to the lower MAE, then to the lexicographically smaller tag.
pub fn select_best(report: &CVReport) -> Option<&str> {
    report
        .scored()
        .min_by(|a, b| {
            a.rmse
                .total_cmp(&b.rmse)
                .then(a.mae.total_cmp(&b.mae))
                .then_with(|| a.model_tag.cmp(&b.model_tag))
        })
        .map(|r| r.model_tag.as_str())
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on raw events.
    pub fn run(&self, events: &[RawEvent]) -> Result<PipelineReport> {
        let interval = self.config.interval();

        let observations = EventAggregator::new(self.config.strategy.clone(), interval)
            .and_then(|a| a.aggregate(events))
            .map_err(|e| e.in_stage(Stage::Aggregate))?;

        let series = SeriesRegularizer::new(interval)
            .map(|r| {
                r.with_range(self.config.range)
                    .with_window(self.config.window)
                    .with_fill_value(self.config.fill_value)
            })
            .and_then(|r| r.regularize(&observations))
            .map_err(|e| e.in_stage(Stage::Regularize))?;

        info!(
            strategy = %self.config.strategy.label(),
            events = events.len(),
            buckets = observations.len(),
            slots = series.len(),
            "built regular series"
        );

        self.run_series(series)
    }

    /// Run the stages from decomposition on an already regular series.
    pub fn run_series(&self, series: RegularSeries) -> Result<PipelineReport> {
        let periods = self
            .config
            .seasonality
            .periods(series.window(), series.interval())
            .map_err(|e| e.in_stage(Stage::Decompose))?;
        let longest = periods.iter().max().copied().unwrap_or(1);
        let shortest = periods.iter().min().copied().unwrap_or(1);

        let decomposition = SeasonalDecomposer::new(periods.clone())
            .and_then(|d| d.with_method(self.config.decomposition).decompose(&series))
            .map_err(|e| e.in_stage(Stage::Decompose))?;

        let holdout = self.config.holdout.unwrap_or(longest);
        let horizon = self.config.horizon.unwrap_or(longest);

        let evaluation = CrossValidator::new(holdout)
            .with_folds(self.config.folds, self.config.fold_step.unwrap_or(holdout))
            .with_seasonal_periods(periods.clone())
            .evaluate(&series, &self.config.variants)
            .map_err(|e| e.in_stage(Stage::CrossValidate))?;

        let selected = select_best(&evaluation)
            .ok_or_else(|| {
                ForecastError::AllVariantsFailed(
                    evaluation.failed().map(|(_, e)| e.to_string()).collect(),
                )
                .in_stage(Stage::CrossValidate)
            })?
            .to_string();
        info!(
            selected = %selected,
            rmse = evaluation.get(&selected).and_then(|o| o.report()).map(|r| r.rmse),
            "selected variant"
        );

        let variant = self
            .config
            .variants
            .iter()
            .find(|v| v.tag() == selected)
            .ok_or_else(|| {
                ForecastError::InvalidParameter(format!("unknown variant {selected}"))
                    .in_stage(Stage::Refit)
            })?;
        let model = variant
            .fit(&series, &periods)
            .map_err(|e| e.in_stage(Stage::Refit))?;

        let forecast = model
            .forecast_with_intervals(horizon, self.config.interval_level)
            .map_err(|e| e.in_stage(Stage::Forecast))?;

        let diagnostics = ResidualDiagnostics::new()
            .with_fitdf(model.num_params())
            .with_seasonal_period(shortest)
            .with_significance(self.config.significance)
            .diagnose(model.residuals())
            .map_err(|e| e.in_stage(Stage::Diagnose));

        match &diagnostics {
            Ok(d) => info!(
                model = %model.description(),
                horizon,
                ljung_box_p = d.autocorrelation_pvalue,
                shapiro_wilk_p = d.normality_pvalue,
                "forecast complete"
            ),
            Err(e) => warn!(
                model = %model.description(),
                horizon,
                error = %e,
                "forecast complete without residual diagnostics"
            ),
        }

        Ok(PipelineReport {
            series,
            periods,
            decomposition,
            evaluation,
            selected,
            model,
            forecast,
            diagnostics,
        })
    }
}
