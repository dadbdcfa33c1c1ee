//! Executor load: the current runs overview and weekly usage patterns.

use super::resolve_tool;
use crate::error::Result;
use crate::query::{compose, ParamBag, Scope, TemplateId, ViewOption};
use crate::search::{bucket_key, buckets, decode, metric, sub_buckets, top_hit_source};
use crate::widgets::{hour_label, round2, weekday_occurrences, WidgetContext, WEEKDAYS};

use serde::Deserialize;
use serde_json::{json, Map, Value};

const DEFAULT_TIME_ZONE: &str = "UTC";
const MIN_TIME_VALUE: f64 = 1000.0;

/// Latest runs-activity sample of one endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RunsSample {
    active_runs: f64,
    idle_executors: f64,
    waiting_runs: f64,
    waiting_time: f64,
    idle_time: f64,
}

fn output_key(view: ViewOption) -> &'static str {
    match view {
        ViewOption::ActiveRuns => "activeRuns",
        ViewOption::IdleExecutors => "idleExecutors",
        ViewOption::WaitingRuns => "waitingRuns",
        ViewOption::WaitingTime => "waitingTime",
        ViewOption::IdleTime => "idleTime",
    }
}

fn average_agg(view: ViewOption) -> &'static str {
    match view {
        ViewOption::ActiveRuns => "avg_active_runs",
        ViewOption::IdleExecutors => "avg_idle_executors",
        ViewOption::WaitingRuns => "avg_waiting_runs",
        ViewOption::WaitingTime => "avg_waiting_time",
        ViewOption::IdleTime => "avg_idle_time",
    }
}

impl RunsSample {
    fn get(&self, view: ViewOption) -> f64 {
        match view {
            ViewOption::ActiveRuns => self.active_runs,
            ViewOption::IdleExecutors => self.idle_executors,
            ViewOption::WaitingRuns => self.waiting_runs,
            ViewOption::WaitingTime => self.waiting_time,
            ViewOption::IdleTime => self.idle_time,
        }
    }
}

/// `[{name, value}]` for each load figure, summed over the latest sample of
/// every endpoint.
pub async fn runs_overview(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let mut totals = [0.0f64; ViewOption::ALL.len()];

    if let Some(tool) = resolve_tool(params, ctx).await? {
        let id = TemplateId::CiRunsActivityLatest;
        let query = compose(id, &tool.params, &Scope::endpoints(&tool.params))?;
        let response = ctx.transport.search(&query, id.index()).await?;

        for bucket in buckets(&response, "endpoints")? {
            let sample: RunsSample = match top_hit_source(bucket, "latest")? {
                Some(source) => decode(source, "runs activity")?,
                None => continue,
            };
            for (total, view) in totals.iter_mut().zip(ViewOption::ALL) {
                *total += sample.get(view);
            }
        }
    }

    let entries: Vec<Value> = ViewOption::ALL
        .iter()
        .zip(totals)
        .map(|(view, value)| json!({ "name": output_key(*view), "value": round2(value) }))
        .collect();
    Ok(Value::Array(entries))
}

/// Average load per weekday and hour of the day.
///
/// Each endpoint contributes its own average for the slot; an operations
/// center sums its controllers while a single tool averages. The result is
/// spread over the number of times the weekday occurs in the window.
pub async fn usage_patterns(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let view = params.view_option.unwrap_or(ViewOption::ActiveRuns);
    let time_format = params.time_format.unwrap_or_default();
    let (start, end) = params.time_window()?;
    let occurrences = weekday_occurrences(start.date(), end.date());

    let mut grid = [[0.0f64; 24]; 7];
    if let Some(tool) = resolve_tool(params, ctx).await? {
        let mut params = tool.params.clone();
        if params.time_zone.as_deref().map_or(true, str::is_empty) {
            params.time_zone = Some(DEFAULT_TIME_ZONE.to_string());
        }
        let id = TemplateId::CiUsagePatterns;
        let query = compose(id, &params, &Scope::endpoints(&params))?;
        let response = ctx.transport.search(&query, id.index()).await?;
        let sum_endpoints = params.is_cjoc();

        for day_bucket in buckets(&response, "by_day")? {
            // ISO weekday, Monday = 1.
            let day = match bucket_key(day_bucket).parse::<usize>() {
                Ok(d @ 1..=7) => d - 1,
                _ => continue,
            };
            for hour_bucket in sub_buckets(day_bucket, "by_hour")? {
                let hour = match bucket_key(hour_bucket).parse::<usize>() {
                    Ok(h @ 0..=23) => h,
                    _ => continue,
                };
                let endpoints = sub_buckets(hour_bucket, "by_endpoint")?;
                if endpoints.is_empty() {
                    continue;
                }
                let mut value = 0.0;
                for endpoint in endpoints {
                    value += metric(endpoint, average_agg(view))?;
                }
                if !sum_endpoints {
                    value /= endpoints.len() as f64;
                }
                grid[day][hour] = value;
            }
        }
    }

    let rows: Vec<Value> = grid
        .iter()
        .enumerate()
        .map(|(day, hours)| {
            let mut row = Map::new();
            row.insert("day".to_string(), json!(WEEKDAYS[day]));
            for (hour, raw) in hours.iter().enumerate() {
                let mut value = match occurrences[day] {
                    0 => 0.0,
                    n => raw / n as f64,
                };
                if view.is_time() && value > 0.0 && value < MIN_TIME_VALUE {
                    value = MIN_TIME_VALUE;
                }
                row.insert(hour_label(hour as u32, time_format), json!(round2(value)));
            }
            Value::Object(row)
        })
        .collect();
    Ok(Value::Array(rows))
}
