use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgMatches, Command};
use sprint_burndown::{init_tracing, seed, Engine, EngineConfig, ExportKind};
use std::path::PathBuf;

fn sprint_arg() -> Arg {
    Arg::new("sprint")
        .required(true)
        .help("Sprint id")
}

fn cli() -> Command {
    Command::new("sprint-burndown")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Sprint metrics, daily burndown snapshots and chart export")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("YAML configuration file"),
        )
        .subcommand(Command::new("serve").about("Run the daily snapshot and cleanup jobs until interrupted"))
        .subcommand(
            Command::new("metrics")
                .about("Print the live metrics of a sprint")
                .arg(sprint_arg()),
        )
        .subcommand(
            Command::new("burndown")
                .about("Print the burndown chart data of a sprint")
                .arg(sprint_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Print the stored snapshots of a sprint")
                .arg(sprint_arg()),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Create or refresh a sprint snapshot")
                .arg(sprint_arg())
                .arg(
                    Arg::new("date")
                        .long("date")
                        .value_parser(value_parser!(NaiveDate))
                        .help("Snapshot day as YYYY-MM-DD (defaults to today)"),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Render the burndown chart to a file")
                .arg(sprint_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .default_value("png")
                        .value_parser(["png", "svg", "pdf"])
                        .help("Output format"),
                )
                .arg(
                    Arg::new("width")
                        .long("width")
                        .value_parser(value_parser!(u32))
                        .help("Image width in pixels (200-4000)"),
                )
                .arg(
                    Arg::new("height")
                        .long("height")
                        .value_parser(value_parser!(u32))
                        .help("Image height in pixels (200-4000)"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory the file is written to"),
                ),
        )
        .subcommand(Command::new("seed-demo").about("Load a demo project with three sprints"))
}

fn sprint_id(args: &ArgMatches) -> anyhow::Result<&str> {
    args.get_one::<String>("sprint")
        .map(String::as_str)
        .ok_or_else(|| anyhow!("missing sprint id"))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config = EngineConfig::load_or_default(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))
        .context("loading configuration")?;
    init_tracing(&config.log_dir).context("initialising logging")?;
    let engine = Engine::open(config).context("opening burndown engine")?;

    match matches.subcommand() {
        Some(("serve", _)) => {
            let _events = engine.start_background_jobs()?;
            let config = engine.config();
            println!(
                "burndown jobs running (daily snapshots at {}, cleanup on day {} at {}, UTC{:+} min); press Ctrl-C to stop",
                config.daily_snapshot_time,
                config.retention_day_of_month,
                config.retention_time,
                config.utc_offset_minutes
            );
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            engine.shutdown();
        }
        Some(("metrics", args)) => {
            print_json(&engine.burndown().calculate_sprint_metrics(sprint_id(args)?)?)?;
        }
        Some(("burndown", args)) => {
            print_json(&engine.burndown().get_burndown_chart(sprint_id(args)?)?)?;
        }
        Some(("history", args)) => {
            print_json(&engine.burndown().get_snapshot_history(sprint_id(args)?)?)?;
        }
        Some(("snapshot", args)) => {
            let date = args.get_one::<NaiveDate>("date").copied();
            print_json(&engine.burndown().create_snapshot(sprint_id(args)?, date)?)?;
        }
        Some(("export", args)) => {
            let format = args.get_one::<String>("format").map(String::as_str).unwrap_or("png");
            let kind = ExportKind::parse(format).ok_or_else(|| anyhow!("unsupported format {}", format))?;
            let width = args.get_one::<u32>("width").copied();
            let height = args.get_one::<u32>("height").copied();
            let out_dir = args.get_one::<PathBuf>("out").cloned().unwrap_or_else(|| PathBuf::from("."));

            let export = engine.export_chart(sprint_id(args)?, kind, width, height)?;
            std::fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
            let path = out_dir.join(&export.filename);
            std::fs::write(&path, &export.bytes).with_context(|| format!("writing {}", path.display()))?;
            println!("{} ({}, {} bytes)", path.display(), export.mime_type, export.bytes.len());
        }
        Some(("seed-demo", _)) => {
            let summary = seed::seed_demo(engine.database(), engine.clock().now(), engine.offset())?;
            print_json(&summary)?;
        }
        other => return Err(anyhow!("unsupported command {:?}", other.map(|(name, _)| name))),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::cli;

    #[test]
    fn command_tree_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn a_subcommand_is_required() {
        let error = cli().try_get_matches_from(["sprint-burndown"]).expect_err("must fail");
        assert_eq!(error.kind(), clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand);

        let matches = cli()
            .try_get_matches_from(["sprint-burndown", "export", "sprint-1", "--format", "svg"])
            .expect("export args");
        assert_eq!(matches.subcommand_name(), Some("export"));
    }
}
