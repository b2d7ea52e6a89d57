use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use fandango_dls::app::{Action, ActionArgs, ActionResult, App};
use fandango_dls::aria::AriaHttpClient;
use fandango_dls::config::ConfigLoader;
use fandango_dls::error::DlsError;
use fandango_dls::output::{ConsoleOutput, JsonOutput, OutputMode};
use fandango_dls::smartem::SmartemHttpClient;
use fandango_dls::store::{ProjectInfo, Store};

#[derive(Parser)]
#[command(name = "fandango-dls")]
#[command(about = "Extract cryo-EM metadata from SmartEM and deposit it into ARIA")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true, help = "Path to fandango-dls.json")]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(
        about = "Extract metadata for a SmartEM acquisition and store it in the project",
        after_help = "Example: fandango-dls generate-metadata --name my-project --acquisition-id a1b2c3d4-e5f6-7890-abcd-ef1234567890"
    )]
    GenerateMetadata(GenerateArgs),
    #[command(
        about = "Send stored project metadata to an ARIA visit",
        after_help = "Example: fandango-dls send-metadata --name my-project --visit-id 12345"
    )]
    SendMetadata(SendArgs),
    #[command(about = "Print everything stored for a project")]
    PrintProject(ProjectArgs),
    #[command(about = "List the most recent SmartEM acquisitions")]
    ListAcquisitions(ListArgs),
    #[command(about = "Record where the project's raw data can be retrieved from")]
    SetDataLocation(LocationArgs),
}

#[derive(Args)]
struct ProjectArgs {
    #[arg(long, help = "FandanGO project name")]
    name: String,
}

#[derive(Args)]
struct GenerateArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[arg(long, help = "UUID of the SmartEM acquisition to extract metadata from")]
    acquisition_id: String,
}

#[derive(Args)]
struct SendArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[arg(long, help = "ARIA visit ID to link metadata to")]
    visit_id: String,
}

#[derive(Args)]
struct ListArgs {
    #[arg(long, default_value_t = fandango_dls::app::DEFAULT_ACQUISITION_LIMIT)]
    limit: usize,
}

#[derive(Args)]
struct LocationArgs {
    #[command(flatten)]
    project: ProjectArgs,

    #[arg(long)]
    location: String,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => ExitCode::from(code),
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(err) = report.downcast_ref::<DlsError>() {
                return ExitCode::from(err.exit_code());
            }
            ExitCode::from(1)
        }
    }
}

/// Returns the action's exit code.
fn run() -> miette::Result<u8> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = Store::open(config.database_path.clone());
    let smartem = SmartemHttpClient::new(&config.smartem)?;
    let aria = AriaHttpClient::from_settings(&config.aria)?;
    let app = App::new(store, smartem, aria);

    let (action, args) = action_from_command(cli.command);
    if matches!(action, Action::GenerateMetadata | Action::ListAcquisitions)
        && matches!(output_mode, OutputMode::Interactive)
    {
        println!("... connecting to SmartEM API at {}", config.smartem.api_url);
    }

    let result = match output_mode {
        OutputMode::NonInteractive => {
            let result = app.perform(action, &args, &JsonOutput);
            JsonOutput::print_result(&result).into_diagnostic()?;
            result
        }
        OutputMode::Interactive => {
            let result = app.perform(action, &args, &ConsoleOutput);
            print_interactive(action, &result);
            result
        }
    };

    Ok(result.exit_code)
}

fn action_from_command(command: Commands) -> (Action, ActionArgs) {
    match command {
        Commands::GenerateMetadata(args) => (
            Action::GenerateMetadata,
            ActionArgs {
                acquisition_id: Some(args.acquisition_id),
                ..ActionArgs::for_project(args.project.name)
            },
        ),
        Commands::SendMetadata(args) => (
            Action::SendMetadata,
            ActionArgs {
                visit_id: Some(args.visit_id),
                ..ActionArgs::for_project(args.project.name)
            },
        ),
        Commands::PrintProject(args) => (Action::PrintProject, ActionArgs::for_project(args.name)),
        Commands::ListAcquisitions(args) => (
            Action::ListAcquisitions,
            ActionArgs {
                limit: Some(args.limit),
                ..ActionArgs::default()
            },
        ),
        Commands::SetDataLocation(args) => (
            Action::SetDataLocation,
            ActionArgs {
                location: Some(args.location),
                ..ActionArgs::for_project(args.project.name)
            },
        ),
    }
}

fn print_interactive(action: Action, result: &ActionResult) {
    if result.success {
        match action {
            Action::PrintProject => {
                match serde_json::from_value::<ProjectInfo>(result.info.clone()) {
                    Ok(info) => ConsoleOutput::print_project(&info),
                    Err(_) => println!("{}", result.info),
                }
            }
            _ => {
                if let Ok(pretty) = serde_json::to_string_pretty(&result.info) {
                    println!("{pretty}");
                }
            }
        }
    }
    ConsoleOutput::print_summary(result);
}
