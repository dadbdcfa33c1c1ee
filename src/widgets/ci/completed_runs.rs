//! Completed runs: whole, paged and streamed.
//!
//! All three surfaces share [`prepare`] and the per-run translation in
//! [`RunLookup::translate`]; they differ only in how batches are delivered.

use super::{fetch_jobs, labelled, resolve_tool, JobInfo};
use crate::error::{EngineError, Result};
use crate::query::{
    compose, ParamBag, Scope, TemplateId, RESULT_ABORTED, RESULT_FAILURE, RESULT_SUCCESS, RESULT_UNSTABLE, RUN_INFO_INDEX,
};
use crate::search::{bucket_key, buckets, count_of, doc_count, scripted};
use crate::stream::FrameSender;
use crate::widgets::{
    format_millis, normalize_run_result, readable_duration, spawn_batches, translate_all, Page, WidgetContext,
    BATCH_SIZE,
};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Above this many runs the widget refuses to fetch them.
pub const MAX_COMPLETED_RUNS: u64 = 20000;

/// One element of the `completed_runs` scripted metric.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RawRun {
    job_id: String,
    run_id: Value,
    run_number: u64,
    endpoint_id: String,
    result: String,
    start_time: i64,
    duration: i64,
    url: String,
}

/// Joins runs with their job and controller.
struct RunLookup {
    jobs: HashMap<String, JobInfo>,
    controllers: HashMap<String, String>,
}

impl RunLookup {
    /// Runs of jobs that no longer exist are dropped.
    fn translate(&self, run: RawRun) -> Option<Value> {
        let job = match self.jobs.get(&run.job_id) {
            Some(j) => j,
            None => {
                tracing::trace!("Dropping run of unknown job {}", run.job_id);
                return None;
            }
        };
        let display_name = if job.display_name.is_empty() {
            &job.job_name
        } else {
            &job.display_name
        };

        let mut row = Map::new();
        row.insert("jobId".into(), json!(run.job_id));
        row.insert("jobName".into(), json!(job.job_name));
        row.insert("displayName".into(), json!(display_name));
        row.insert("runId".into(), run.run_id);
        row.insert("runNumber".into(), json!(run.run_number));
        if let Some(name) = self.controllers.get(&run.endpoint_id) {
            row.insert("controllerName".into(), json!(name));
        }
        row.insert("result".into(), json!(normalize_run_result(&run.result)));
        row.insert("startTime".into(), json!(format_millis(run.start_time)));
        row.insert("duration".into(), json!(readable_duration(run.duration)));
        row.insert("url".into(), json!(run.url));
        Some(Value::Object(row))
    }
}

enum Prepared {
    TooMany,
    Ready {
        count_info: Value,
        runs: Vec<RawRun>,
        lookup: Arc<RunLookup>,
    },
}

fn count_info(status_buckets: &[Value]) -> Value {
    let mut by_result: HashMap<String, u64> = HashMap::new();
    let mut total = 0;
    for bucket in status_buckets {
        let n = doc_count(bucket);
        total += n;
        *by_result.entry(bucket_key(bucket)).or_default() += n;
    }
    let of = |result: &str| by_result.get(result).copied().unwrap_or(0);
    json!([
        { "type": "TOTAL_RUNS", "count": total },
        { "type": "SUCCESSFUL_RUNS", "count": of(RESULT_SUCCESS) },
        { "type": "FAILED_RUNS", "count": of(RESULT_FAILURE) },
        { "type": "UNSTABLE_RUNS", "count": of(RESULT_UNSTABLE) },
        { "type": "CANCELED_RUNS", "count": of(RESULT_ABORTED) },
    ])
}

async fn prepare(params: &ParamBag, ctx: &WidgetContext) -> Result<Prepared> {
    let tool = match resolve_tool(params, ctx).await? {
        Some(t) => t,
        None => {
            return Ok(Prepared::Ready {
                count_info: count_info(&[]),
                runs: Vec::new(),
                lookup: Arc::new(RunLookup {
                    jobs: HashMap::new(),
                    controllers: HashMap::new(),
                }),
            })
        }
    };
    let params = &tool.params;
    let scope = Scope::endpoints(params);

    let count_query = compose(TemplateId::CiCompletedRunsCount, params, &scope)?;
    let count = count_of(&ctx.transport.count(&count_query, RUN_INFO_INDEX).await?);
    if count > MAX_COMPLETED_RUNS {
        tracing::info!("{} completed runs exceed the limit of {}", count, MAX_COMPLETED_RUNS);
        return Ok(Prepared::TooMany);
    }

    let responses = ctx
        .transport
        .multi_search(vec![
            ("status", RUN_INFO_INDEX, compose(TemplateId::CiCompletedRunsStatus, params, &scope)?),
            ("fetch", RUN_INFO_INDEX, compose(TemplateId::CiCompletedRunsFetch, params, &scope)?),
        ])
        .await?;
    let count_info = count_info(buckets(labelled(&responses, "status")?, "run_status")?);
    let runs: Vec<RawRun> = scripted(labelled(&responses, "fetch")?, "completed_runs")?;

    let job_ids: BTreeSet<String> = runs.iter().map(|r| r.job_id.clone()).collect();
    let jobs: HashMap<String, JobInfo> = fetch_jobs(params, job_ids, ctx).await?;

    tracing::debug!("Translating {} completed runs over {} jobs", runs.len(), jobs.len());
    Ok(Prepared::Ready {
        count_info,
        runs,
        lookup: Arc::new(RunLookup {
            jobs,
            controllers: tool.controller_names(),
        }),
    })
}

fn payload(count_info: Value, data: Vec<Value>) -> Value {
    json!({ "maxSizeReached": false, "countInfo": count_info, "data": data })
}

fn max_size_reached() -> Value {
    json!({ "maxSizeReached": true, "data": [] })
}

pub async fn completed_runs(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    match prepare(params, ctx).await? {
        Prepared::TooMany => Ok(max_size_reached()),
        Prepared::Ready {
            count_info,
            runs,
            lookup,
        } => {
            let data = translate_all(runs, move |run| lookup.translate(run), ctx.cancel_token()).await?;
            Ok(payload(count_info, data))
        }
    }
}

/// One batch of [`BATCH_SIZE`] runs. The cursor is the batch number.
pub async fn completed_runs_page(params: &ParamBag, cursor: usize, ctx: &WidgetContext) -> Result<Page> {
    let (count_info, runs, lookup) = match prepare(params, ctx).await? {
        Prepared::TooMany => {
            return Ok(Page {
                payload: max_size_reached(),
                next_cursor: None,
            })
        }
        Prepared::Ready {
            count_info,
            runs,
            lookup,
        } => (count_info, runs, lookup),
    };

    let total = runs.len();
    let start = cursor.saturating_mul(BATCH_SIZE);
    let data: Vec<Value> = runs
        .into_iter()
        .skip(start)
        .take(BATCH_SIZE)
        .filter_map(|run| lookup.translate(run))
        .collect();
    let next_cursor = (start.saturating_add(BATCH_SIZE) < total).then_some(cursor + 1);

    Ok(Page {
        payload: payload(count_info, data),
        next_cursor,
    })
}

/// Completed runs resolved up to the point where frames can be sent.
pub struct RunStream(Prepared);

/// Run every query of the stream before the first frame.
pub async fn prepare_run_stream(params: &ParamBag, ctx: &WidgetContext) -> Result<RunStream> {
    Ok(RunStream(prepare(params, ctx).await?))
}

impl RunStream {
    /// Send translated runs, one frame per batch, or the single
    /// `maxSizeReached` frame. A frame that cannot be delivered is logged and
    /// skipped. Returns the number of frames sent.
    pub async fn send(self, ctx: &WidgetContext, frames: &FrameSender) -> Result<usize> {
        let (runs, lookup) = match self.0 {
            Prepared::TooMany => {
                return match frames.send_value(&max_size_reached()).await {
                    Ok(()) => Ok(1),
                    Err(e) => {
                        tracing::warn!("Skipping completed runs frame: {}", e);
                        Ok(0)
                    }
                }
            }
            Prepared::Ready { runs, lookup, .. } => (runs, lookup),
        };

        let translate = Arc::new(move |run: RawRun| lookup.translate(run));
        let mut rx = spawn_batches(runs, translate, ctx.cancel_token().clone());

        let mut sent = 0;
        while let Some(batch) = rx.recv().await {
            match frames.send(batch).await {
                Ok(()) => sent += 1,
                Err(e) => tracing::warn!("Skipping completed runs frame: {}", e),
            }
        }
        if ctx.cancel_token().is_cancelled() {
            return Err(EngineError::Canceled);
        }
        Ok(sent)
    }
}
