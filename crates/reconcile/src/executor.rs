//! Drivers: converge one resource, preview it, or check many in parallel

use crate::context::ProgressCallback;
use crate::diff::{Diff, ReferenceResolver};
use crate::error::{Error, Result};
use crate::planner::DiffEngine;
use crate::resource::{HandlerDriven, Resource};
use crate::types::{CheckReport, ConvergeSummary, CreateOptions, Definition, LifecycleStatus};
use rayon::prelude::*;

fn check_type<R: Resource>(resource: &R, defn: &Definition) -> Result<()> {
    if defn.resource_type == resource.get_type() {
        Ok(())
    } else {
        Err(Error::config(
            resource.name(),
            format!(
                "definition has type '{}', resource is '{}'",
                defn.resource_type,
                resource.get_type()
            ),
        ))
    }
}

fn warn_drift(resource: &str, report: &CheckReport) {
    for drift in &report.drift {
        log::warn!(
            "{}: '{}' changed outside of stratus (recorded {}, provider reports {}); \
             re-run create to restore it or update the definition",
            resource,
            drift.key,
            drift.recorded.as_ref().map_or_else(|| "nothing".to_string(), ToString::to_string),
            drift.observed.as_ref().map_or_else(|| "nothing".to_string(), ToString::to_string),
        );
    }
}

/// Converge a handler-driven resource to `defn`
///
/// 1. With `options.check`, reconcile recorded state against the provider
/// 2. Diff the definition against recorded attributes and plan handlers
/// 3. An empty plan is a no-op
/// 4. Otherwise mark the resource STARTING (unless it is UP), run the
///    handlers in order and mark it UP
///
/// A failing handler aborts the pass; everything it committed stays
/// recorded, so the next pass resumes from there.
pub fn converge<R: HandlerDriven>(
    resource: &R,
    defn: &Definition,
    options: CreateOptions,
    resolver: &dyn ReferenceResolver,
    progress: &mut dyn ProgressCallback,
) -> Result<ConvergeSummary> {
    check_type(resource, defn)?;
    let name = resource.name();

    if options.check {
        let report = resource.check()?;
        warn_drift(name, &report);
    }

    let reserved = resource.reserved_keys();
    let engine = DiffEngine::new(resource.get_type(), resource.handlers(), &reserved);
    let current = resource.state().snapshot()?;
    let diff = engine.diff(defn, &current, resolver)?;
    let plan = engine.plan(&diff, false)?;

    if plan.is_empty() {
        // An interrupted pass may have committed everything but the final status
        if resource.resource_id()?.is_some() && resource.status()? != LifecycleStatus::Up {
            log::info!("{name}: nothing left to apply, marking up");
            resource.state().set_status(LifecycleStatus::Up)?;
        } else {
            log::debug!("{name}: no change");
        }
        return Ok(ConvergeSummary::default());
    }

    let ids = plan.ids();
    log::info!("{}: {} ({})", name, diff.summary(), ids.join(", "));
    progress.on_plan(name, &ids);

    if resource.status()? != LifecycleStatus::Up {
        resource.state().set_status(LifecycleStatus::Starting)?;
    }

    for handler in plan.iter() {
        progress.on_handler_start(name, handler.id());
        let result = handler.handle(resource, defn, options.into());
        progress.on_handler_complete(name, handler.id(), result.as_ref().err());
        result?;
    }

    resource.state().set_status(LifecycleStatus::Up)?;

    Ok(ConvergeSummary {
        handlers: ids.into_iter().map(String::from).collect(),
        changed_keys: changed(&diff),
    })
}

/// Compute and log the plan without running any handler
pub fn dry_run<R: HandlerDriven>(
    resource: &R,
    defn: &Definition,
    resolver: &dyn ReferenceResolver,
) -> Result<ConvergeSummary> {
    check_type(resource, defn)?;

    let reserved = resource.reserved_keys();
    let engine = DiffEngine::new(resource.get_type(), resource.handlers(), &reserved);
    let current = resource.state().snapshot()?;
    let diff = engine.diff(defn, &current, resolver)?;

    log::info!("{}: {}", resource.name(), diff.summary());
    let plan = engine.plan(&diff, true)?;

    Ok(ConvergeSummary {
        handlers: plan.ids().into_iter().map(String::from).collect(),
        changed_keys: changed(&diff),
    })
}

fn changed(diff: &Diff) -> Vec<String> {
    diff.changed_keys().into_iter().map(String::from).collect()
}

/// Check independent resources on a pool of `jobs` worker threads
///
/// Every resource is checked even if others fail; results come back in
/// input order, paired with the resource name.
pub fn check_all(
    resources: &[&dyn Resource],
    jobs: usize,
) -> Result<Vec<(String, Result<CheckReport>)>> {
    let check = |resource: &&dyn Resource| {
        let result = resource.check();
        match &result {
            Ok(report) => warn_drift(resource.name(), report),
            Err(e) => log::warn!("{}: check failed: {}", resource.name(), e),
        }
        (resource.name().to_string(), result)
    };

    if jobs <= 1 || resources.len() <= 1 {
        return Ok(resources.iter().map(check).collect());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| Error::WorkerPool(e.to_string()))?;

    Ok(pool.install(|| resources.par_iter().map(check).collect()))
}
