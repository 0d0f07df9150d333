//! Command-line client for the Person roster.
//!
//! Lists, creates and edits people through the same optimistic session the
//! grid uses, and can watch the table live through the change feed.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use roster_client::{
    render, CellEditor, ClientConfig, CreateForm, EditableGrid, HttpTransport, PersonField,
    PersonId, Session,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Server base URL
    #[arg(long, env = "ROSTER_URL", default_value = "http://127.0.0.1:8080", global = true)]
    url: String,

    /// Procedure call timeout in milliseconds
    #[arg(long, env = "ROSTER_TIMEOUT_MS", default_value_t = 5000, global = true)]
    timeout_ms: u64,

    /// Keep pending optimistic edits on top of refetched data
    #[arg(long, global = true)]
    reapply_pending: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page of the table
    List(ViewArgs),
    /// Add a person
    Create {
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
        /// Parsed as an integer, like the grid's age input
        #[arg(long)]
        age: String,
    },
    /// Change one field of a person
    Update {
        /// Record id
        id: String,
        /// firstName, lastName or age
        field: String,
        value: String,
    },
    /// Re-render the table on every change until Ctrl+C
    Watch(ViewArgs),
}

#[derive(ClapArgs, Debug)]
struct ViewArgs {
    /// Rows per page
    #[arg(long, default_value_t = 10)]
    page_size: usize,
    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: usize,
    /// Case-insensitive text filter
    #[arg(long)]
    filter: Option<String>,
}

impl ViewArgs {
    fn grid(&self) -> EditableGrid {
        let mut grid = EditableGrid::new(self.page_size);
        if let Some(filter) = &self.filter {
            grid.set_filter(filter.clone());
        }
        grid.set_page(self.page.saturating_sub(1));
        grid
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let config = ClientConfig {
        base_url: cli.url.clone(),
        request_timeout_ms: cli.timeout_ms,
        reapply_pending_on_refetch: cli.reapply_pending,
        ..ClientConfig::default()
    };
    let transport = Arc::new(HttpTransport::new(&config).context("failed to build HTTP client")?);
    let session = Session::new(transport.clone(), &config);

    match cli.command {
        Command::List(view) => {
            session.refresh().await;
            fail_on_notices(&session)?;
            let mut grid = view.grid();
            print!("{}", render(&grid.view(&session), &[]));
        }
        Command::Create {
            first_name,
            last_name,
            age,
        } => {
            session.refresh().await;
            let mut form = CreateForm {
                first_name,
                last_name,
                age,
            };
            let handle = form.submit(&session)?;
            let outcome = handle.outcome().await;
            form.on_settled(&outcome);
            let person = outcome.context("create failed")?;
            println!("Created {} {} ({})", person.first_name, person.last_name, person.id);
        }
        Command::Update { id, field, value } => {
            let id = PersonId::parse(&id)?;
            let field: PersonField = field.parse()?;
            let snapshot = session.refresh().await;
            fail_on_notices(&session)?;
            let person = snapshot
                .get(&id)
                .ok_or_else(|| anyhow!("no person with id {}", id))?;

            let mut editor = CellEditor::open(person, field);
            editor.set_text(value);
            match editor.blur(&session)? {
                Some(handle) => {
                    let person = handle.outcome().await.context("update failed")?;
                    println!(
                        "Updated {} {} ({}): {} = {}",
                        person.first_name,
                        person.last_name,
                        person.id,
                        field,
                        person.value(field)
                    );
                }
                None => println!("{} is unchanged", field),
            }
        }
        Command::Watch(view) => watch(&session, transport, &config, view).await?,
    }

    Ok(())
}

async fn watch(
    session: &Session,
    transport: Arc<HttpTransport>,
    config: &ClientConfig,
    view: ViewArgs,
) -> anyhow::Result<()> {
    let mut grid = view.grid();
    let mut changes = session.changes();
    session.load();
    let subscription = session.subscribe(transport, config);
    let mut last_revision = None;

    loop {
        let revision = session.revision();
        if last_revision != Some(revision) {
            last_revision = Some(revision);
            let notices = session.take_notices();
            println!("--- revision {} (feed cursor {})", revision, subscription.cursor());
            print!("{}", render(&grid.view(session), &notices));
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = signal::ctrl_c() => break,
        }
    }

    drop(subscription);
    Ok(())
}

/// Turns a failed initial load into an error instead of an empty table.
fn fail_on_notices(session: &Session) -> anyhow::Result<()> {
    let notices = session.take_notices();
    match notices.first() {
        Some(notice) => Err(anyhow!("{}", notice.message)),
        None => Ok(()),
    }
}
