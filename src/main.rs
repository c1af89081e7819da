use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use dbferry::presentation::cli_summary::print_summary;
use dbferry::presentation::report;
use dbferry::{
    AppConfig, Engine, MigrationRequest, PhaseStatus, QualifiedColumn, TableName,
};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(
    name = "dbferry",
    about = "dbferry — migrate schemas and data between Oracle, PostgreSQL, SQL Server and MySQL."
)]
struct Cli {
    /// Path to a dbferry.toml (defaults to the layered lookup).
    #[arg(short, long)]
    config: Option<String>,

    #[arg(long)]
    verbose: bool,

    #[arg(long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the connection parameters for one engine (password redacted).
    ShowRdbms { engine: Engine },
    /// Check whether a migration could be launched, without touching any database.
    Verify(RequestArgs),
    /// Run the migration.
    Migrate {
        #[command(flatten)]
        request: RequestArgs,
        /// Emit the full JSON report instead of the summary table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RequestArgs {
    #[arg(long = "from")]
    from_rdbms: Engine,
    #[arg(long = "to")]
    to_rdbms: Engine,
    #[arg(long)]
    from_schema: String,
    #[arg(long)]
    to_schema: String,

    #[arg(long)]
    metadata: bool,
    #[arg(long)]
    plain_data: bool,
    #[arg(long)]
    lob_data: bool,
    #[arg(long)]
    process_indexes: bool,
    #[arg(long)]
    process_views: bool,
    #[arg(long)]
    process_mviews: bool,

    #[arg(long, value_delimiter = ',')]
    include_tables: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    exclude_tables: Vec<String>,
    /// Views to migrate; `*` selects all.
    #[arg(long, value_delimiter = ',')]
    include_views: Vec<String>,
    /// Columns to leave behind, as table.column.
    #[arg(long, value_delimiter = ',')]
    exclude_columns: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skip_ck_constraints: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skip_fk_constraints: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    skip_named_constraints: Vec<String>,
    /// Column type overrides, as table.column=TYPE.
    #[arg(long = "override-column")]
    override_columns: Vec<String>,
}

impl RequestArgs {
    fn into_request(self) -> Result<MigrationRequest> {
        let mut request = MigrationRequest::new(
            self.from_rdbms,
            self.to_rdbms,
            &self.from_schema,
            &self.to_schema,
        );
        request.phases.metadata = self.metadata;
        request.phases.plain_data = self.plain_data;
        request.phases.lob_data = self.lob_data;
        request.phases.process_indexes = self.process_indexes;
        // naming views implies processing them
        request.phases.process_views = self.process_views || !self.include_views.is_empty();
        request.phases.process_mviews = self.process_mviews;
        request.include_tables = self.include_tables.into_iter().map(TableName).collect();
        request.exclude_tables = self.exclude_tables.into_iter().map(TableName).collect();
        request.include_views = self.include_views.into_iter().map(TableName).collect();
        request.skip_ck_constraints =
            self.skip_ck_constraints.into_iter().map(TableName).collect();
        request.skip_fk_constraints =
            self.skip_fk_constraints.into_iter().map(TableName).collect();
        request.skip_named_constraints = self.skip_named_constraints;

        for spec in &self.exclude_columns {
            let qc = QualifiedColumn::parse(spec)
                .ok_or_else(|| anyhow::anyhow!("invalid exclude-column (want table.column): {spec}"))?;
            request.exclude_columns.push(qc);
        }
        for spec in &self.override_columns {
            let (column, ty) = spec
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("invalid override (want table.column=TYPE): {spec}"))?;
            let qc = QualifiedColumn::parse(column)
                .ok_or_else(|| anyhow::anyhow!("invalid override column: {column}"))?;
            request.external_columns.insert(qc, ty.to_string());
        }
        Ok(request)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        dbferry::LogLevel::Error
    } else if cli.verbose {
        dbferry::LogLevel::Debug
    } else {
        dbferry::LogLevel::Info
    };
    dbferry::init_tracing(level);

    let config = Arc::new(AppConfig::load(cli.config.as_deref())?);

    match cli.command {
        Command::ShowRdbms { engine } => {
            let Some(section) = config.engine(engine) else {
                eprintln!("rdbms '{engine}' is not configured");
                return Ok(ExitCode::from(1));
            };
            println!("{}", serde_json::to_string_pretty(&section.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Verify(args) => {
            let request = args.into_request()?;
            let errors = dbferry::verify(&config, &request);
            if errors.is_empty() {
                println!("Migration can be launched");
                Ok(ExitCode::SUCCESS)
            } else {
                let lines: Vec<String> = errors.iter().map(|e| e.envelope_line()).collect();
                println!("{}", report::error_envelope(&lines));
                Ok(ExitCode::from(1))
            }
        }
        Command::Migrate { request, json } => {
            let request = request.into_request()?;
            let result = dbferry::migrate(&config, &request).await?;

            if json {
                println!("{}", report::to_json(&result)?);
            } else {
                print_summary(&result);
            }

            Ok(match result.status {
                PhaseStatus::Full => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            })
        }
    }
}
