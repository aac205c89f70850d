use clap::Parser;
use crud_harness::config::{ConfigLoader, HarnessConfig};
use crud_harness::dialect::DialectProfile;
use crud_harness::logging::{init_logging, LogConfig};
use crud_harness::schema::{SchemaDefinition, SchemaProvisioner};
use crud_harness::suite::{ConsoleReporter, CrudSuite, RunReport, SkipPolicy};
use crud_harness::{profile_for, Harness};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "crud-harness")]
#[command(version)]
#[command(about = "Run the CRUD integration suite against one database dialect")]
#[command(long_about = "Run the CRUD integration suite against one database dialect

The harness creates a throwaway database, builds the standard schema, runs every
registered test in order (stopping at the first failure) and drops the database.

CONFIGURATION:
  Settings are read from crud-harness.toml or config/crud-harness.toml, or the
  file given with --config. Environment variables override file values:
    CRUD_HARNESS__POSTGRESQL__PASSWORD=secret
    CRUD_HARNESS__HARNESS__DATABASE_NAME=scratchdb

EXAMPLES:
  crud-harness sqlite
  crud-harness postgresql --config ci.toml
  crud-harness sqlserver --list
  crud-harness --sample-config > crud-harness.toml")]
struct Args {
    /// Dialect to test: sqlserver, postgresql or sqlite (default: harness.dialect)
    dialect: Option<String>,

    /// Configuration file
    #[arg(short, long, value_name = "FILE", env = "CRUD_HARNESS_CONFIG")]
    config: Option<String>,

    /// Log level or EnvFilter directive (overrides logging.level)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// List the registered tests and their skip status without connecting
    #[arg(long)]
    list: bool,

    /// Run the GUID key tests that are skipped by default
    #[arg(long)]
    include_guid_tests: bool,

    /// Print the DDL for the selected dialect without connecting
    #[arg(long)]
    print_ddl: bool,

    /// Print a sample configuration file and exit
    #[arg(long)]
    sample_config: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: cannot start the async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<HarnessConfig> {
    let mut loader = ConfigLoader::new()
        .load_from_file(args.config.as_deref())
        .load_from_env();
    if let Some(level) = &args.log_level {
        loader = loader.set_override("logging.level", level.as_str());
    }
    if args.include_guid_tests {
        loader = loader.set_override("harness.include_guid_tests", "true");
    }
    loader.build()
}

/// 実行後の要約行。経過時間はテストループのみを計測したもの
fn summary_lines(profile: &DialectProfile, report: &RunReport) -> Vec<String> {
    let mut lines = vec![format!("Time elapsed: {:.2?}", report.total_elapsed)];
    lines.extend(report.abort_summary());
    lines.push(format!("{} testing complete.", profile.name));
    lines
}

/// 全テスト成功なら `true`
async fn run(args: Args) -> anyhow::Result<bool> {
    if args.sample_config {
        print!("{}", HarnessConfig::sample_toml()?);
        return Ok(true);
    }

    let config = load_config(&args)?;
    let _log_guard = init_logging(&LogConfig::from_config(&config.logging))?;

    let profile = match &args.dialect {
        Some(name) => profile_for(name)?,
        None => config.harness.dialect.profile(),
    };
    let skip = SkipPolicy::new(config.harness.include_guid_tests);
    let registry = CrudSuite::registry()?;
    let definition = SchemaDefinition::standard();

    if args.list {
        for name in registry.names() {
            match skip.reason(profile.dialect, name) {
                Some(reason) => println!("{} (skipped: {})", name, reason),
                None => println!("{}", name),
            }
        }
        return Ok(true);
    }

    if args.print_ddl {
        for sql in SchemaProvisioner::plan(profile, &definition)? {
            println!("{};", sql);
        }
        return Ok(true);
    }

    let target = config.target_for(profile);
    let suite = CrudSuite::for_target(profile, &target);
    let mut harness = Harness::new(SchemaProvisioner::new(target));

    let outcome = harness
        .run(
            profile,
            &definition,
            &registry,
            &suite,
            &skip,
            &mut ConsoleReporter,
        )
        .await?;

    for line in summary_lines(profile, &outcome.report) {
        println!("{}", line);
    }

    Ok(outcome.is_success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crud_harness::dialect::{Dialect, SQLITE};
    use crud_harness::suite::TestFailure;
    use std::time::Duration;

    #[test]
    fn test_summary_uses_test_loop_time() {
        let mut report = RunReport::new(Dialect::Sqlite);
        report.total_elapsed = Duration::from_millis(1500);

        assert_eq!(
            summary_lines(&SQLITE, &report),
            vec!["Time elapsed: 1.50s", "SQLite testing complete."]
        );
    }

    #[test]
    fn test_summary_includes_abort_line() {
        let mut report = RunReport::new(Dialect::Sqlite);
        report.failure = Some(TestFailure {
            name: "update_user",
            message: "row count mismatch".to_string(),
            elapsed: Duration::from_millis(3),
        });
        report.not_attempted = 4;

        let lines = summary_lines(&SQLITE, &report);
        assert_eq!(lines[1], "update_user failed: row count mismatch; 4 test(s) not attempted");
        assert_eq!(lines.last().unwrap(), "SQLite testing complete.");
    }
}
