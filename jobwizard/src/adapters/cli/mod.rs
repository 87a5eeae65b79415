// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, CommandFactory, FromArgMatches, Parser, Subcommand};

use crate::app::types::JobPayload;
use crate::app::usecases::JobRequest;

#[derive(Parser, Debug)]
#[command(
    name = "jobwizard",
    version,
    about = "Configure, save and submit compute jobs against a solution catalog",
    long_about = None,
    after_help = "Configuration precedence: defaults < config file < command-line flags.\n\
Config path precedence: defaults < JOBWIZARD_CONFIG_PATH < command-line flags.\n\
If --config is omitted, jobwizard tries JOBWIZARD_CONFIG_PATH, then the default config file location; missing default config is OK.\n\
Paths in the config file are resolved relative to the config file directory; paths passed as flags are resolved relative to the current working directory."
)]
pub struct Opts {
    #[arg(
        short,
        long,
        global = true,
        value_name = "PATH",
        help = "Path to a TOML config file. When omitted, jobwizard uses JOBWIZARD_CONFIG_PATH if set, otherwise the default config file location if available."
    )]
    pub config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the SQLite database file. Overrides `database_path` from the config file."
    )]
    pub database_path: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Path to the TOML catalog of providers, images and resources. Overrides `catalog_path` from the config file."
    )]
    pub catalog_path: Option<PathBuf>,
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::SetTrue,
        help = "Enable debug logging. Overrides `verbose` from the config file."
    )]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the providers, images and resources available for a solution set.
    Options(OptionsArgs),
    /// Report what a job still needs before it can be submitted.
    Check(JobArgs),
    /// Save a new job, or update one with --job.
    Save(JobArgs),
    /// Save and submit a job.
    Submit(JobArgs),
    /// Print every stored job.
    List,
    /// Print a stored job.
    Show {
        #[arg(value_name = "ID")]
        id: i64,
    },
}

#[derive(Args, Debug)]
pub struct OptionsArgs {
    #[arg(long = "solution", value_name = "ID", required = true, num_args = 1..)]
    pub solutions: Vec<String>,
    #[arg(long, value_name = "ID")]
    pub provider: Option<String>,
    #[arg(long, value_name = "ID")]
    pub image: Option<String>,
}

#[derive(Args, Debug)]
pub struct JobArgs {
    #[arg(long, value_name = "ID", help = "Load a stored job and apply the remaining flags to it.")]
    pub job: Option<i64>,
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,
    #[arg(long, value_name = "TEXT")]
    pub description: Option<String>,
    #[arg(long = "solution", value_name = "ID", num_args = 1..)]
    pub solutions: Vec<String>,
    #[arg(long, value_name = "ID")]
    pub provider: Option<String>,
    #[arg(long, value_name = "ID")]
    pub image: Option<String>,
    #[arg(long, value_name = "ID")]
    pub resource: Option<String>,
    #[arg(long, value_name = "MINUTES", help = "Walltime in minutes; enables the walltime limit.")]
    pub walltime: Option<u32>,
    #[arg(
        long = "bind",
        value_name = "SOLUTION.VAR=VALUE",
        help = "Set a solution variable. The value is parsed as JSON when possible, otherwise taken as a string. Repeatable."
    )]
    pub bindings: Vec<String>,
    #[arg(
        long,
        value_name = "PATH",
        help = "JSON file with the job payload (downloads, template_vars, uploaded_files)."
    )]
    pub payload: Option<PathBuf>,
}

impl JobArgs {
    pub fn to_request(&self) -> anyhow::Result<JobRequest> {
        let payload = match &self.payload {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read payload {}", path.display()))?;
                let payload: JobPayload = serde_json::from_str(&raw)
                    .with_context(|| format!("failed to parse payload {}", path.display()))?;
                Some(payload)
            }
            None => None,
        };
        Ok(JobRequest {
            job_id: self.job,
            name: self.name.clone(),
            description: self.description.clone(),
            solution_ids: self.solutions.clone(),
            provider: self.provider.clone(),
            image: self.image.clone(),
            resource: self.resource.clone(),
            walltime: self.walltime,
            payload,
        })
    }
}

pub struct ParsedOpts {
    pub opts: Opts,
    pub verbose_override: Option<bool>,
}

const HELP_TEMPLATE: &str = r#"{before-help}{about-with-newline}{usage-heading} {usage}
{after-help}

{all-args}
"#;

fn apply_help_template_recursively(cmd: &mut clap::Command) {
    let mut owned = std::mem::take(cmd);
    owned = owned.help_template(HELP_TEMPLATE);
    for sub in owned.get_subcommands_mut() {
        apply_help_template_recursively(sub);
    }
    *cmd = owned;
}

pub fn cli_command() -> clap::Command {
    let mut cmd = Opts::command();
    apply_help_template_recursively(&mut cmd);
    cmd
}

pub fn parse_opts() -> ParsedOpts {
    parse_from(std::env::args_os())
}

fn parse_from<I, T>(args: I) -> ParsedOpts
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = cli_command().get_matches_from(args);
    let verbose_override = if matches.get_flag("verbose") {
        Some(true)
    } else {
        None
    };
    let opts = Opts::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    ParsedOpts {
        opts,
        verbose_override,
    }
}
