#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for sweeping unread mailing list mail out of a Gmail inbox

use anyhow::Context;
use clap::{Parser, Subcommand};
use inbox_sweep::{
    GmailClient, GmailConfig, MailingList, RetrievalConfig,
    RetrievalService, classify,
};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sweep-cli")]
#[command(
    about = "Find and unsubscribe from the mailing lists filling your Gmail inbox"
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Print the number of unread messages in the inbox
    Count,

    /// List the mailing lists with unread mail, busiest first
    Summary {
        /// Maximum number of lists to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// One-click unsubscribe from a sender's mailing list
    Unsubscribe {
        /// Sender address of the list
        sender: String,

        /// Show what would happen without doing it
        #[arg(long)]
        dry_run: bool,

        /// Also permanently delete the list's unread messages
        #[arg(long)]
        delete: bool,
    },

    /// Move a sender's unread list mail to the trash
    Trash {
        /// Sender address of the list
        sender: String,

        /// Show what would happen without doing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove a sender's unread list mail from the inbox
    Archive {
        /// Sender address of the list
        sender: String,

        /// Show what would happen without doing it
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark a sender's unread list mail as read
    Read {
        /// Sender address of the list
        sender: String,

        /// Show what would happen without doing it
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Clone, Copy)]
enum Action {
    Trash,
    Archive,
    Read,
}

impl Action {
    const fn verb(self) -> &'static str {
        match self {
            Self::Trash => "trashed",
            Self::Archive => "archived",
            Self::Read => "marked read",
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = RetrievalConfig::from_env()?;
    let gmail = GmailConfig::from_env()?;
    let token = std::env::var("GMAIL_ACCESS_TOKEN")
        .context("GMAIL_ACCESS_TOKEN is not set")?;
    let client = GmailClient::with_bearer_token(&token, gmail)?;
    let service = RetrievalService::new(Arc::new(client), config);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Interrupted, stopping...");
                cancel.cancel();
            }
        });
    }

    match &args.command {
        Command::Count => cmd_count(&service, &args, &cancel).await?,
        Command::Summary { limit } => {
            cmd_summary(&service, &args, *limit, &cancel).await?;
        }
        Command::Unsubscribe {
            sender,
            dry_run,
            delete,
        } => {
            cmd_unsubscribe(
                &service, &args, sender, *dry_run, *delete, &cancel,
            )
            .await?;
        }
        Command::Trash { sender, dry_run } => {
            cmd_action(
                &service,
                &args,
                Action::Trash,
                sender,
                *dry_run,
                &cancel,
            )
            .await?;
        }
        Command::Archive { sender, dry_run } => {
            cmd_action(
                &service,
                &args,
                Action::Archive,
                sender,
                *dry_run,
                &cancel,
            )
            .await?;
        }
        Command::Read { sender, dry_run } => {
            cmd_action(
                &service,
                &args,
                Action::Read,
                sender,
                *dry_run,
                &cancel,
            )
            .await?;
        }
    }

    Ok(())
}

async fn cmd_count(
    service: &RetrievalService,
    args: &Args,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let total = service.total_unread(cancel).await?;

    if args.json {
        println!("{}", json!({ "unread": total }));
    } else {
        println!("{total} unread message(s)");
    }

    Ok(())
}

async fn cmd_summary(
    service: &RetrievalService,
    args: &Args,
    limit: usize,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let lists = mailing_lists(service, cancel).await?;
    let display: Vec<&MailingList> = lists.iter().take(limit).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&display)?);
    } else {
        print_list_table(&display);
    }

    Ok(())
}

async fn cmd_unsubscribe(
    service: &RetrievalService,
    args: &Args,
    sender: &str,
    dry_run: bool,
    delete: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let list = find_list(service, sender, cancel).await?;

    let Some(unsubscriber) = list.unsubscriber() else {
        println!("no one-click unsubscribe available for {sender}");
        return Ok(());
    };

    if dry_run {
        println!("Would POST one-click unsubscribe to {}", unsubscriber.target());
        if delete {
            println!("Would delete {} message(s)", list.total_unread());
        }
        return Ok(());
    }

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let deleted = unsubscribe_list(service, &list, &http, delete, cancel).await?;

    if args.json {
        println!(
            "{}",
            json!({
                "sender": list.sender(),
                "unsubscribed": true,
                "deleted": deleted,
            })
        );
    } else {
        println!("Unsubscribed from {}", list.sender());
        if delete {
            println!("Deleted {deleted} message(s)");
        }
    }

    Ok(())
}

async fn cmd_action(
    service: &RetrievalService,
    args: &Args,
    action: Action,
    sender: &str,
    dry_run: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let list = find_list(service, sender, cancel).await?;
    let ids = list.message_ids();

    if dry_run {
        println!(
            "Would have {} {} message(s) from {}",
            action.verb(),
            ids.len(),
            list.sender()
        );
        return Ok(());
    }

    ensure_running(cancel)?;
    let done = match action {
        Action::Trash => service.trash_messages(ids, cancel).await?,
        Action::Archive => service.archive_messages(ids, cancel).await?,
        Action::Read => service.mark_read(ids, cancel).await?,
    };

    if args.json {
        println!(
            "{}",
            json!({ "sender": list.sender(), "action": action.verb(), "count": done })
        );
    } else {
        println!(
            "{} {} message(s) from {}",
            capitalize(action.verb()),
            done,
            list.sender()
        );
    }

    Ok(())
}

/// Retrieve all unread mail, reporting progress on stderr, and group it
/// into mailing lists.
async fn mailing_lists(
    service: &RetrievalService,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<MailingList>> {
    let mut stream = service.stream_unread(cancel.clone()).await?;
    let mut mails = Vec::with_capacity(stream.ids.len());
    let mut stderr = std::io::stderr();

    while let Some(mail) = stream.mails.next_mail().await {
        mails.push(mail);
        write!(
            stderr,
            "\rFetched {}/{} unread message(s)",
            mails.len(),
            stream.ids.len()
        )
        .ok();
    }
    writeln!(stderr).ok();

    ensure_running(cancel)?;
    Ok(classify(&mails))
}

/// Send the one-click POST, then delete the list's mail if asked to.
/// Returns how many messages were deleted.
///
/// Neither side effect starts once `cancel` has fired.
async fn unsubscribe_list(
    service: &RetrievalService,
    list: &MailingList,
    http: &reqwest::Client,
    delete: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<usize> {
    ensure_running(cancel)?;
    tokio::select! {
        biased;
        () = cancel.cancelled() => anyhow::bail!("Interrupted"),
        result = list.unsubscribe(http) => result?,
    }

    if !delete {
        return Ok(0);
    }
    ensure_running(cancel)?;
    Ok(service.delete_messages(list.message_ids(), cancel).await?)
}

fn ensure_running(cancel: &CancellationToken) -> anyhow::Result<()> {
    if cancel.is_cancelled() {
        anyhow::bail!("Interrupted");
    }
    Ok(())
}

async fn find_list(
    service: &RetrievalService,
    sender: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<MailingList> {
    let sender = sender.trim().to_lowercase();
    mailing_lists(service, cancel)
        .await?
        .into_iter()
        .find(|list| list.sender() == sender)
        .with_context(|| {
            format!("No unread mailing list mail from {sender}")
        })
}

fn print_list_table(lists: &[&MailingList]) {
    if lists.is_empty() {
        println!("No mailing lists found.");
        return;
    }

    let header =
        format!("{:<8} {:<10} {}", "Unread", "One-click", "Sender");
    println!("{header}");
    println!("{}", "-".repeat(60));

    for list in lists {
        println!(
            "{:<8} {:<10} {}",
            list.total_unread(),
            if list.can_unsubscribe() { "yes" } else { "no" },
            truncate(list.sender(), 60),
        );
    }

    println!("\n{} list(s)", lists.len());
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String =
            s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
