// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::sync::Arc;

use anyhow::Context;
use serde::Serialize;

mod adapters;
mod app;
mod config;
mod logging;

use adapters::cli::Command;

fn log_config_report(report: &config::ConfigReport) {
    match (&report.config_path, report.config_path_source) {
        (Some(path), Some(source)) => {
            tracing::info!(
                "config path: {} (source={}, present={})",
                path.display(),
                source.as_str(),
                report.config_file_present
            );
        }
        (Some(path), None) => {
            tracing::info!(
                "config path: {} (present={})",
                path.display(),
                report.config_file_present
            );
        }
        (None, _) => {
            tracing::info!("config path: (none)");
        }
    }
    tracing::info!(
        "config database_path: {} (source={})",
        report.database_path.value.display(),
        report.database_path.source.as_str()
    );
    tracing::info!(
        "config catalog_path: {} (source={})",
        report.catalog_path.value.display(),
        report.catalog_path.source.as_str()
    );
    tracing::info!(
        "config verbose: {} (source={})",
        report.verbose.value,
        report.verbose.source.as_str()
    );
}

/// Command result plus whatever notifications the operation left on screen.
#[derive(Serialize)]
struct Report<'a, T: Serialize> {
    #[serde(flatten)]
    result: &'a T,
    notifications: Vec<app::ports::Notification>,
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render output")?;
    println!("{rendered}");
    Ok(())
}

fn apply_bindings(
    bindings: &adapters::bindings::BindingsTable,
    args: &adapters::cli::JobArgs,
) -> anyhow::Result<app::usecases::JobRequest> {
    for assignment in &args.bindings {
        bindings.bind_assignment(assignment)?;
    }
    args.to_request()
}

async fn run(
    command: Command,
    usecases: &app::usecases::UseCases,
    bindings: &adapters::bindings::BindingsTable,
    notifier: &adapters::notify::LogNotifier,
) -> anyhow::Result<()> {
    match command {
        Command::Options(args) => {
            let report = usecases
                .options(args.solutions, args.provider.as_deref(), args.image.as_deref())
                .await?;
            print_json(&report)
        }
        Command::Check(args) => {
            let request = apply_bindings(bindings, &args)?;
            print_json(&usecases.check(&request).await?)
        }
        Command::Save(args) => {
            let request = apply_bindings(bindings, &args)?;
            let outcome = usecases.save_job(&request).await?;
            print_json(&Report {
                result: &outcome,
                notifications: notifier.shown(),
            })
        }
        Command::Submit(args) => {
            let request = apply_bindings(bindings, &args)?;
            let outcome = usecases.submit_job(&request).await?;
            print_json(&Report {
                result: &outcome,
                notifications: notifier.shown(),
            })
        }
        Command::List => print_json(&usecases.list_jobs().await?),
        Command::Show { id } => print_json(&usecases.show_job(id).await?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = adapters::cli::parse_opts();
    let opts = parsed.opts;
    let config::LoadResult { config, report } = config::load_with_report(
        opts.config,
        config::Overrides {
            database_path: opts.database_path,
            catalog_path: opts.catalog_path,
            verbose: parsed.verbose_override,
        },
    )?;
    logging::init(config.verbose);
    log_config_report(&report);

    let catalog = adapters::catalog::FileCatalog::load(&config.catalog_path).with_context(|| {
        "failed to load catalog; specify --catalog-path or set catalog_path in the config file"
    })?;
    let bindings = Arc::new(adapters::bindings::BindingsTable::new(
        catalog.solution_variables(),
    ));
    let db = adapters::db::JobStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open database {}", config.database_path.display()))?;

    let notifier = Arc::new(adapters::notify::LogNotifier::new());
    let usecases = app::usecases::UseCases::new(
        Arc::new(catalog),
        Arc::new(adapters::db::SqliteJobStoreAdapter::new(db)),
        bindings.clone(),
        notifier.clone(),
        Arc::new(adapters::telemetry::TracingTelemetry::new()),
    );

    let result = run(opts.command, &usecases, &bindings, &notifier).await;
    if let Err(err) = &result {
        if let Some(app_err) = err.downcast_ref::<app::errors::AppError>() {
            tracing::error!(
                kind = app_err.kind().as_str(),
                code = app_err.code(),
                context = app_err.context(),
                "{}",
                app_err.message()
            );
        }
    }
    result
}
