//! CLI command implementations
//!
//! Both commands load configuration, catalog and query the same way; `run`
//! then executes the plan while `explain` only prints it.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::config::ExecConfig;
use crate::engine::{ExecutionContext, QueryEngine};
use crate::observability::{Logger, Severity};
use crate::optimizer::{
    ExplainPlan, GreedyOptimizer, LogicalQuery, MemoryCatalog, PlanNode, PlannerResult,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::files::{CatalogFile, QueryFile};
use super::io::{write_json, write_row, write_schema};

/// Run a CLI command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Run {
            config,
            catalog,
            query,
            stats,
            verbose,
        } => run(&config, &catalog, &query, stats, verbose),
        Command::Explain {
            config,
            catalog,
            query,
            json,
        } => explain(&config, &catalog, &query, json),
    }
}

/// Everything a command needs before planning
struct Prepared {
    config: ExecConfig,
    catalog: MemoryCatalog,
    query: LogicalQuery,
}

fn prepare(config_path: &Path, catalog_path: &Path, query_path: &Path) -> CliResult<Prepared> {
    let config = load_config(config_path)?;
    Logger::set_min_severity(config.log_severity()?);
    let catalog = CatalogFile::load(catalog_path)?.into_catalog()?;
    let query = QueryFile::load(query_path)?.resolve(&catalog)?;
    Ok(Prepared {
        config,
        catalog,
        query,
    })
}

/// A missing config file means defaults
fn load_config(path: &Path) -> CliResult<ExecConfig> {
    if path.exists() {
        Ok(ExecConfig::load(path)?)
    } else {
        Ok(ExecConfig::default())
    }
}

fn plan(prepared: &Prepared) -> PlannerResult<PlanNode> {
    let config = &prepared.config;
    let per_join = config.buffers_per_join(prepared.query.num_joins())?;
    GreedyOptimizer::new(&prepared.catalog, config.join_strategy, per_join)
        .with_sort_buffers(config.num_buffers)
        .optimize(&prepared.query)
}

/// Plan and execute, writing JSON lines to stdout
pub fn run(
    config_path: &Path,
    catalog_path: &Path,
    query_path: &Path,
    stats: bool,
    verbose: bool,
) -> CliResult<()> {
    let prepared = prepare(config_path, catalog_path, query_path)?;
    if verbose {
        Logger::set_min_severity(Severity::Info);
    }
    let plan = plan(&prepared)?;

    // Held until the query finishes so the directory outlives every run file
    let (spill_dir, _temp): (PathBuf, Option<TempDir>) = match &prepared.config.spill_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let temp = TempDir::new()?;
            (temp.path().to_path_buf(), Some(temp))
        }
    };
    let ctx = Arc::new(ExecutionContext::new(prepared.config.page_size, &spill_dir)?);
    let engine = QueryEngine::new(ctx);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    write_schema(&mut out, plan.schema())?;

    let mut write_error: Option<CliError> = None;
    let metrics = engine.stream(&plan, &prepared.catalog, |batch| {
        if write_error.is_some() {
            return;
        }
        for tuple in batch.iter() {
            if let Err(e) = write_row(&mut out, tuple) {
                write_error = Some(e);
                return;
            }
        }
    })?;
    if let Some(e) = write_error {
        return Err(e);
    }
    out.flush()?;

    if stats {
        write_json(&mut io::stderr(), &metrics)?;
    }
    Ok(())
}

/// Plan only; a rejected query is explained rather than reported as an error
pub fn explain(
    config_path: &Path,
    catalog_path: &Path,
    query_path: &Path,
    json: bool,
) -> CliResult<()> {
    let prepared = prepare(config_path, catalog_path, query_path)?;
    let explained = match plan(&prepared) {
        Ok(plan) => ExplainPlan::from_plan(&plan),
        Err(e) => ExplainPlan::from_error(&e),
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        write_json(&mut out, &explained)?;
    } else {
        write!(out, "{}", explained)?;
    }
    Ok(())
}
