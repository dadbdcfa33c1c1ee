//! Scope widgets: what was deployed or built in the window.

use super::WidgetContext;
use crate::error::Result;
use crate::query::{compose, ParamBag, Scope, TemplateId};
use crate::resources::BranchMode;
use crate::search::{bucket_key, buckets};

use serde_json::{json, Value};

fn scope_for(params: &ParamBag, ctx: &WidgetContext) -> Scope {
    Scope::from_params(params).with_branch(ctx.resolver.branch_scope(params, BranchMode::Name))
}

/// `[{name}]` for every environment deployed to, in aggregation order.
pub async fn all_deployed_environments(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let id = TemplateId::DeployedEnvironments;
    let query = compose(id, params, &scope_for(params, ctx))?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let environments: Vec<Value> = buckets(&response, "environments")?
        .iter()
        .map(|b| json!({ "name": bucket_key(b) }))
        .collect();
    Ok(Value::Array(environments))
}

/// Ids of every component with a build in the window.
pub async fn all_built_components(params: &ParamBag, ctx: &WidgetContext) -> Result<Value> {
    let id = TemplateId::BuiltComponents;
    let query = compose(id, params, &scope_for(params, ctx))?;
    let response = ctx.transport.search(&query, id.index()).await?;

    let components: Vec<Value> = buckets(&response, "components")?
        .iter()
        .map(|b| Value::String(bucket_key(b)))
        .collect();
    Ok(Value::Array(components))
}
