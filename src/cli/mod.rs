#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory as _, Parser, Subcommand};

use crate::config::{self, Config};
use crate::error::TaskflowError;
use crate::logging::{self, LogSink};
use crate::output::table::Table;
use crate::output::{format_date, truncate};
use crate::task::model::{Filter, Task};
use crate::task::storage::FileStorage;
use crate::task::store::TaskStore;
use crate::tui;

#[derive(Debug, Parser)]
#[command(name = "taskflow", version, about = "Organize your tasks, one at a time")]
pub struct Cli {
    /// Directory holding the task snapshot (overrides storage.data_dir)
    #[arg(long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Add a task
    Add(AddArgs),
    /// List tasks
    #[command(alias = "ls")]
    List(ListArgs),
    /// Flip a task between pending and completed
    Toggle(IdArgs),
    /// Replace the text of a task
    Edit(EditArgs),
    /// Delete a task
    #[command(alias = "delete")]
    Rm(IdArgs),
    /// Show task counts
    Stats(StatsArgs),
    Config(ConfigArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Task text; multiple words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Show only pending or completed tasks
    #[arg(short = 'f', long = "filter", default_value_t = Filter::All)]
    pub filter: Filter,
    /// Output in JSON format
    #[arg(long = "json", conflicts_with = "csv")]
    pub json: bool,
    /// Output as CSV
    #[arg(long = "csv")]
    pub csv: bool,
    /// Re-read and redraw every two seconds until Ctrl+C
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,
}

#[derive(Debug, Parser)]
pub struct IdArgs {
    pub id: u64,
}

#[derive(Debug, Parser)]
pub struct EditArgs {
    pub id: u64,
    /// New text; multiple words are joined with spaces
    #[arg(required = true, num_args = 1..)]
    pub text: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    /// Output in JSON format
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            tracing::debug!(error = ?err, "command failed");
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let data_dir = cli.data_dir.as_deref();
    match cli.cmd {
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "taskflow", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Version) => Ok(cmd_version()),
        Some(Commands::Config(args)) => cmd_config(args),
        None => {
            let interactive = tui::is_tty();
            let (cfg, storage) = open_slot(data_dir, interactive).await?;
            if interactive {
                tui::app::run(cfg, TaskStore::open(storage)).await?;
                return Ok(ExitCode::SUCCESS);
            }
            // Non-TTY fallback: plain list of everything.
            let args = ListArgs {
                filter: Filter::All,
                json: false,
                csv: false,
                watch: false,
            };
            cmd_list(&cfg, storage, &args).await
        }
        Some(Commands::Add(args)) => cmd_add(open_slot(data_dir, false).await?.1, &args),
        Some(Commands::List(args)) => {
            let (cfg, storage) = open_slot(data_dir, false).await?;
            cmd_list(&cfg, storage, &args).await
        }
        Some(Commands::Toggle(args)) => cmd_toggle(open_slot(data_dir, false).await?.1, &args),
        Some(Commands::Edit(args)) => cmd_edit(open_slot(data_dir, false).await?.1, &args),
        Some(Commands::Rm(args)) => cmd_rm(open_slot(data_dir, false).await?.1, &args),
        Some(Commands::Stats(args)) => cmd_stats(open_slot(data_dir, false).await?.1, &args),
    }
}

/// Loads config, resolves the task slot and installs logging for commands
/// that touch tasks.
async fn open_slot(
    data_dir: Option<&Path>,
    interactive: bool,
) -> anyhow::Result<(Config, FileStorage)> {
    let cfg = load_cfg().await?;
    let storage = cfg.storage(data_dir)?;
    let sink = LogSink::resolve(&cfg, storage.dir(), interactive)?;
    logging::init(&cfg.log.level, &sink)?;
    tracing::debug!(path = %storage.path().display(), "using task slot");
    Ok((cfg, storage))
}

async fn load_cfg() -> anyhow::Result<Config> {
    let cfg = tokio::task::spawn_blocking(|| -> anyhow::Result<Config> {
        let (cfg, _doc, _paths) = config::load()?;
        Ok(cfg)
    })
    .await??;
    Ok(cfg)
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<ExitCode> {
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml()?);
        }
        ConfigCmd::Set(set) => {
            config::set_value_string(&set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
        }
        ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'taskflow config list' to see available keys",
                get.key
            ),
        },
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_add(storage: FileStorage, args: &AddArgs) -> anyhow::Result<ExitCode> {
    let mut store = TaskStore::open(storage);
    let id = store
        .add_task(&args.text.join(" "))
        .ok_or(TaskflowError::EmptyText)?;
    if let Some(task) = store.get(id) {
        println!("Added task {id}: {}", task.text);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_toggle(storage: FileStorage, args: &IdArgs) -> anyhow::Result<ExitCode> {
    let mut store = TaskStore::open(storage);
    if !store.toggle_complete(args.id) {
        return Err(TaskflowError::TaskNotFound(args.id).into());
    }
    if let Some(task) = store.get(args.id) {
        println!("Task {} is now {}", task.id, task_status_str(task));
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_edit(storage: FileStorage, args: &EditArgs) -> anyhow::Result<ExitCode> {
    let mut store = TaskStore::open(storage);
    if !store.start_edit(args.id) {
        return Err(TaskflowError::TaskNotFound(args.id).into());
    }
    store.update_draft(args.text.join(" "));
    if !store.save_edit() {
        store.cancel_edit();
        return Err(TaskflowError::EmptyText.into());
    }
    if let Some(task) = store.get(args.id) {
        println!("Updated task {}: {}", task.id, task.text);
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_rm(storage: FileStorage, args: &IdArgs) -> anyhow::Result<ExitCode> {
    let mut store = TaskStore::open(storage);
    let text = store.get(args.id).map(|t| t.text.clone());
    if !store.delete_task(args.id) {
        return Err(TaskflowError::TaskNotFound(args.id).into());
    }
    println!(
        "Deleted task {}: {}",
        args.id,
        text.unwrap_or_default()
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_stats(storage: FileStorage, args: &StatsArgs) -> anyhow::Result<ExitCode> {
    let store = TaskStore::open(storage);
    let counts = store.counts();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
    } else {
        println!(
            "Total: {}  Completed: {}  Pending: {}",
            counts.total, counts.completed, counts.pending
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_list(cfg: &Config, storage: FileStorage, args: &ListArgs) -> anyhow::Result<ExitCode> {
    if args.watch && !args.json && !args.csv {
        list_watch(cfg, &storage, args.filter).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let mut store = TaskStore::open(storage);
    store.set_filter(args.filter);
    let tasks = store.visible_tasks();

    if args.json {
        let mut s = serde_json::to_string_pretty(&tasks)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    if args.csv {
        let mut t = Table::new(["id", "text", "completed", "created_at"]);
        for task in &tasks {
            t.row([
                task.id.to_string(),
                task.text.clone(),
                task.completed.to_string(),
                task.created_at
                    .format(&time::format_description::well_known::Rfc3339)
                    .unwrap_or_default(),
            ]);
        }
        t.print_csv()?;
        return Ok(ExitCode::SUCCESS);
    }

    if tasks.is_empty() {
        println!("{}", empty_message(args.filter));
        return Ok(ExitCode::SUCCESS);
    }
    task_table(cfg, &tasks).print()?;
    Ok(ExitCode::SUCCESS)
}

async fn list_watch(cfg: &Config, storage: &FileStorage, filter: Filter) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(2));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
            _ = ticker.tick() => {
                print!("\x1b[H\x1b[2J");
                // Reopen each tick so edits from other processes show up.
                let mut store = TaskStore::open(storage);
                store.set_filter(filter);
                let counts = store.counts();

                println!(
                    "Tasks ({filter}) - Total: {}  Completed: {}  Pending: {}",
                    counts.total, counts.completed, counts.pending
                );
                println!();

                let tasks = store.visible_tasks();
                if tasks.is_empty() {
                    println!("{}", empty_message(filter));
                } else {
                    task_table(cfg, &tasks).print()?;
                }
                println!("\n[Press Ctrl+C to exit]");
            }
        }
    }
}

fn task_table(cfg: &Config, tasks: &[&Task]) -> Table {
    let mut t = if cfg.ui.show_dates {
        Table::new(["ID", "STATUS", "CREATED", "TASK"])
    } else {
        Table::new(["ID", "STATUS", "TASK"])
    };
    for task in tasks {
        let mut id = task.id.to_string();
        if cfg.ui.icons {
            id = format!("{} {id}", task_status_icon(task));
        }
        let text = truncate(&task.text, 80);
        if cfg.ui.show_dates {
            t.row([
                id,
                task_status_str(task).to_owned(),
                format_date(task.created_at),
                text,
            ]);
        } else {
            t.row([id, task_status_str(task).to_owned(), text]);
        }
    }
    t
}

fn empty_message(filter: Filter) -> &'static str {
    match filter {
        Filter::All => "No tasks yet. Add your first task to get started!",
        Filter::Pending => "No pending tasks.",
        Filter::Completed => "No completed tasks.",
    }
}

fn task_status_icon(task: &Task) -> &'static str {
    if task.completed { "✓" } else { "○" }
}

fn task_status_str(task: &Task) -> &'static str {
    if task.completed {
        "completed"
    } else {
        "pending"
    }
}

fn cmd_version() -> ExitCode {
    println!("taskflow version {}", env!("CARGO_PKG_VERSION"));
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn meta_commands_skip_the_task_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let not_a_dir = dir.path().join("blocker");
        std::fs::write(&not_a_dir, "x").unwrap();
        let data_dir = not_a_dir.to_str().unwrap();

        for argv in [
            vec!["taskflow", "--data-dir", data_dir, "version"],
            vec!["taskflow", "--data-dir", data_dir, "completion", "bash"],
        ] {
            let cli = Cli::try_parse_from(argv).unwrap();
            assert!(run(cli).await.is_ok());
        }
    }

    #[test]
    fn parses_list_filter_and_words() {
        let cli = Cli::try_parse_from(["taskflow", "list", "-f", "completed", "--json"]).unwrap();
        let Some(Commands::List(args)) = cli.cmd else {
            panic!("expected list");
        };
        assert_eq!(args.filter, Filter::Completed);
        assert!(args.json);

        let cli = Cli::try_parse_from(["taskflow", "add", "Buy", "oat", "milk"]).unwrap();
        let Some(Commands::Add(args)) = cli.cmd else {
            panic!("expected add");
        };
        assert_eq!(args.text.join(" "), "Buy oat milk");

        assert!(Cli::try_parse_from(["taskflow", "list", "-f", "someday"]).is_err());
        assert!(Cli::try_parse_from(["taskflow", "list", "--json", "--csv"]).is_err());
    }

    #[test]
    fn edit_and_rm_report_unknown_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = || FileStorage::new(dir.path().to_path_buf(), "tasks").unwrap();

        let err = cmd_rm(storage(), &IdArgs { id: 9 }).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskflowError>(),
            Some(TaskflowError::TaskNotFound(9))
        ));

        let err = cmd_edit(
            storage(),
            &EditArgs {
                id: 9,
                text: vec!["x".to_owned()],
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskflowError>(),
            Some(TaskflowError::TaskNotFound(9))
        ));
    }

    #[test]
    fn commands_share_the_slot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = || FileStorage::new(dir.path().to_path_buf(), "tasks").unwrap();

        cmd_add(
            storage(),
            &AddArgs {
                text: vec!["Buy".to_owned(), "milk".to_owned()],
            },
        )
        .unwrap();
        let id = TaskStore::open(storage()).tasks()[0].id;

        cmd_toggle(storage(), &IdArgs { id }).unwrap();
        let err = cmd_edit(
            storage(),
            &EditArgs {
                id,
                text: vec!["  ".to_owned()],
            },
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TaskflowError>(),
            Some(TaskflowError::EmptyText)
        ));
        cmd_edit(
            storage(),
            &EditArgs {
                id,
                text: vec!["Buy oat milk".to_owned()],
            },
        )
        .unwrap();

        let store = TaskStore::open(storage());
        assert_eq!(store.tasks().len(), 1);
        assert_eq!(store.tasks()[0].text, "Buy oat milk");
        assert!(store.tasks()[0].completed);

        cmd_rm(storage(), &IdArgs { id }).unwrap();
        assert!(TaskStore::open(storage()).tasks().is_empty());
    }

    #[test]
    fn table_honours_ui_flags() {
        let mut cfg = Config::default();
        cfg.ui.icons = false;
        cfg.ui.show_dates = false;
        let task = Task::new(7, "Water plants", time::OffsetDateTime::UNIX_EPOCH);

        let mut out = Vec::new();
        task_table(&cfg, &[&task]).write_text(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "ID  STATUS   TASK\n7   pending  Water plants\n");
    }
}
