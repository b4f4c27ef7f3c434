use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;

use mail_threader::ingest::ingest_directory;
use mail_threader::{
    Error, ManualThreadGroup, Result, SnapshotStore, Threader, ThreadingConfig, ThreadingResult,
    apply_groups, apply_overrides,
};

#[derive(Parser, Debug)]
#[command(
    name = "mail-threader",
    about = "Thread a mail archive into conversations and manage manual corrections"
)]
struct Cli {
    /// Snapshot file holding messages, overrides and groups.
    #[arg(long, global = true, default_value = "threads.json")]
    snapshot: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a maildir or folder of raw messages into the snapshot.
    Ingest { dir: PathBuf },

    /// Build threads and print them.
    Thread {
        /// Skip per-message overrides.
        #[arg(long)]
        no_overrides: bool,
        /// Skip manual groups.
        #[arg(long)]
        no_groups: bool,
        /// Disable merging of stray roots by subject.
        #[arg(long)]
        no_subject_grouping: bool,
        /// Remove overrides that no longer resolve from the snapshot.
        #[arg(long)]
        prune_invalid: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },

    #[command(subcommand)]
    Group(GroupCommand),

    #[command(subcommand)]
    Override(OverrideCommand),

    /// Convert legacy per-message overrides into manual groups.
    MigrateOverrides,
}

#[derive(Subcommand, Debug)]
enum GroupCommand {
    /// Create a group from thread ids and pinned message keys.
    Create {
        #[arg(long)]
        title: Option<String>,
        /// Algorithmic thread id to absorb (repeatable).
        #[arg(long = "thread")]
        threads: Vec<String>,
        /// Message key to pin (repeatable).
        #[arg(long = "pin")]
        pins: Vec<String>,
    },
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
enum OverrideCommand {
    /// Force a message into a thread.
    Set { key: String, thread: String },
    Clear { key: String },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Json,
    Summary,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let store = SnapshotStore::new(&cli.snapshot);
    let mut snapshot = store.load()?;

    match cli.command {
        Command::Ingest { dir } => {
            let report = ingest_directory(&dir)?;
            let added = snapshot.merge_messages(report.messages);
            store.save(&snapshot)?;
            log::info!(
                "{} new messages, {} total, {} files skipped",
                added,
                snapshot.messages.len(),
                report.failed.len()
            );
        }

        Command::Thread {
            no_overrides,
            no_groups,
            no_subject_grouping,
            prune_invalid,
            format,
        } => {
            let mut config = ThreadingConfig::from_env();
            if no_subject_grouping {
                config.group_by_subject = false;
            }
            let threader = Threader::new(config);
            log::debug!("threading policy: {:?}", threader.config());
            let base = threader.build(&snapshot.messages);

            let mut dirty = false;
            let result = if no_overrides {
                base
            } else {
                let (overridden, invalid) = apply_overrides(&snapshot.overrides, &base);
                if !invalid.is_empty() {
                    log::warn!("{} overrides could not be applied", invalid.len());
                    if prune_invalid {
                        dirty |= snapshot.prune_overrides(&invalid) > 0;
                    }
                }
                overridden
            };

            let result = if no_groups {
                result
            } else {
                let duplicates = snapshot.dedupe_groups();
                if duplicates > 0 {
                    log::warn!("dropped {} group definitions with a repeated id", duplicates);
                    dirty = true;
                }
                let (grouped, updated) = apply_groups(&snapshot.groups, &result);
                if !updated.is_empty() {
                    log::info!("corrected {} conflicting group definitions", updated.len());
                    dirty |= snapshot.apply_group_corrections(&updated) > 0;
                }
                grouped
            };

            if dirty {
                store.save(&snapshot)?;
                log::info!("updated {}", store.path().display());
            }
            print_result(&result, format)?;
        }

        Command::Group(GroupCommand::Create {
            title,
            threads,
            pins,
        }) => {
            let mut group = ManualThreadGroup::new(title);
            group.jwz_thread_ids.extend(threads);
            group.pinned_message_keys.extend(pins);
            if group.is_empty() {
                return Err(Error::InvalidArgument(
                    "a group needs at least one --thread or --pin".to_string(),
                ));
            }
            let id = group.id.clone();
            snapshot.upsert_group(group);
            store.save(&snapshot)?;
            writeln!(io::stdout(), "{}", id)?;
        }

        Command::Group(GroupCommand::Remove { id }) => {
            if !snapshot.remove_group(&id) {
                return Err(Error::InvalidArgument(format!("no group with id '{}'", id)));
            }
            store.save(&snapshot)?;
        }

        Command::Override(OverrideCommand::Set { key, thread }) => {
            snapshot.overrides.insert(key, thread);
            store.save(&snapshot)?;
        }

        Command::Override(OverrideCommand::Clear { key }) => {
            if snapshot.overrides.remove(&key).is_none() {
                return Err(Error::InvalidArgument(format!("no override for '{}'", key)));
            }
            store.save(&snapshot)?;
        }

        Command::MigrateOverrides => {
            let migrated = snapshot.migrate_overrides();
            store.save(&snapshot)?;
            log::info!("migrated {} overrides into {} groups", migrated, snapshot.groups.len());
        }
    }

    Ok(())
}

fn print_result(result: &ThreadingResult, format: OutputFormat) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Summary => {
            for thread in &result.threads {
                writeln!(
                    out,
                    "{}  {}  {:>4} msgs  {:>3} unread  {}",
                    thread.id,
                    thread.last_updated.format("%Y-%m-%d %H:%M"),
                    thread.message_count,
                    thread.unread_count,
                    thread.subject
                )?;
            }
            writeln!(
                out,
                "{} threads, {} messages",
                result.thread_count(),
                result.message_count()
            )?;
        }
    }
    Ok(())
}
