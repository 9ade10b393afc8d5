//! `pacer`: command-line client for Pacer challenges.
//!
//! Writes go through a durable on-disk queue, so they can be recorded while
//! offline and are sent, in order, the next time the server is reachable.
//!
//! # Usage
//!
//! ```
//! pacer login 6f1c2b7e-3d4a-4c5b-9e8f-0a1b2c3d4e5f
//! pacer log <challenge-id> 4200 --type steps
//! pacer sync
//! pacer watch <challenge-id>
//! ```

mod client;
mod session;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use pacer_sync::{
  ActionPayload, ActionQueue, ChangeThrottle, ConnectivityMonitor, DrainReport,
  FileRepository, SessionProvider,
};
use serde::Deserialize;
use session::{FileSession, StaticSession};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

type Queue = ActionQueue<FileRepository, ApiClient>;

const DEFAULT_URL: &str = "http://localhost:8080";
const DEFAULT_QUEUE_FILE: &str = "~/.local/share/pacer/queue.json";
const DEFAULT_SESSION_FILE: &str = "~/.config/pacer/session";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "pacer", about = "Log activity and follow Pacer challenges")]
struct Args {
  /// Path to a TOML config file (url, user, queue_file, session_file).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the Pacer server (default: http://localhost:8080).
  #[arg(long, env = "PACER_URL")]
  url: Option<String>,

  /// Act as this user id instead of the logged-in session.
  #[arg(long, env = "PACER_USER")]
  user: Option<Uuid>,

  /// Where queued actions are persisted.
  #[arg(long, value_name = "FILE")]
  queue_file: Option<PathBuf>,

  /// Where `pacer login` stores the current user id.
  #[arg(long, value_name = "FILE")]
  session_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Remember a user id for later commands.
  Login { user_id: Uuid },
  /// Forget the stored user id.
  Logout,
  /// Create the profile for the current user.
  Register,
  /// Queue an activity entry, then try to send it.
  Log {
    challenge_id: Uuid,
    value:        i64,
    #[arg(long = "type", default_value = "steps")]
    activity_type: String,
    #[arg(long, default_value = "steps")]
    unit:         String,
    /// When the activity happened (RFC 3339). Defaults to now.
    #[arg(long)]
    at:           Option<DateTime<Utc>>,
  },
  /// Queue acceptance of a challenge invitation, then try to send it.
  Accept { challenge_id: Uuid },
  /// Queue a friend request, then try to send it.
  Befriend { user_id: Uuid },
  /// Send everything in the queue.
  Sync,
  /// List queued actions.
  Pending,
  /// Drop every queued action.
  Clear,
  /// Show a challenge's current status.
  Status { challenge_id: Uuid },
  /// Show a challenge's standings.
  Leaderboard { challenge_id: Uuid },
  /// Show the current user's streak.
  Streak,
  /// Follow a challenge: drain on reconnect and refresh standings on change.
  Watch {
    challenge_id: Uuid,
    /// Seconds between reachability probes.
    #[arg(long, default_value_t = 5)]
    interval:     u64,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  url:          Option<String>,
  user:         Option<Uuid>,
  queue_file:   Option<PathBuf>,
  session_file: Option<PathBuf>,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let base_url = args
    .url
    .or(file_cfg.url)
    .unwrap_or_else(|| DEFAULT_URL.to_string());
  let user = args.user.or(file_cfg.user);
  let queue_file = expand_tilde(
    &args
      .queue_file
      .or(file_cfg.queue_file)
      .unwrap_or_else(|| PathBuf::from(DEFAULT_QUEUE_FILE)),
  );
  let session_file = FileSession::new(expand_tilde(
    &args
      .session_file
      .or(file_cfg.session_file)
      .unwrap_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE)),
  ));

  // Session-only commands never touch the network or the queue.
  match &args.command {
    Command::Login { user_id } => {
      session_file.store(*user_id)?;
      println!("logged in as {user_id}");
      return Ok(());
    }
    Command::Logout => {
      session_file.clear()?;
      println!("logged out");
      return Ok(());
    }
    _ => {}
  }

  let session: Arc<dyn SessionProvider> = match user {
    Some(id) => Arc::new(StaticSession(id)),
    None => Arc::new(session_file),
  };
  let client = ApiClient::new(ApiConfig { base_url }, session)?;
  let queue = Arc::new(
    ActionQueue::new(FileRepository::new(&queue_file), client.clone())
      .with_context(|| format!("loading queue from {}", queue_file.display()))?,
  );

  match args.command {
    Command::Login { .. } | Command::Logout => {}
    Command::Register => {
      if client.register().await? {
        println!("profile created");
      } else {
        println!("profile already exists");
      }
    }
    Command::Log { challenge_id, value, activity_type, unit, at } => {
      let id = queue.enqueue_log_activity(
        challenge_id,
        activity_type,
        value,
        unit,
        at.unwrap_or_else(Utc::now),
        Uuid::new_v4(),
      );
      println!("queued {id}");
      drain_if_online(&queue, &client).await;
    }
    Command::Accept { challenge_id } => {
      let id = queue.enqueue(ActionPayload::AcceptInvite { challenge_id });
      println!("queued {id}");
      drain_if_online(&queue, &client).await;
    }
    Command::Befriend { user_id } => {
      let id = queue.enqueue(ActionPayload::SendFriendRequest { to_user_id: user_id });
      println!("queued {id}");
      drain_if_online(&queue, &client).await;
    }
    Command::Sync => print_report(&queue.process_queue().await),
    Command::Pending => {
      let pending = queue.pending();
      if pending.is_empty() {
        println!("queue is empty");
      }
      for action in pending {
        let note = action
          .last_error
          .as_deref()
          .map(|e| format!("  last error: {e}"))
          .unwrap_or_default();
        println!(
          "{}  {:<20} {}  retries={}{note}",
          action.id,
          action.kind(),
          action.created_at.format("%Y-%m-%d %H:%M:%S"),
          action.retry_count,
        );
      }
    }
    Command::Clear => println!("dropped {} queued actions", queue.clear_queue()),
    Command::Status { challenge_id } => {
      println!("{}", client.status(challenge_id).await?);
    }
    Command::Leaderboard { challenge_id } => {
      print_leaderboard(&client, challenge_id).await?;
    }
    Command::Streak => {
      let view = client.streak().await?;
      println!(
        "current {} (stored {}), longest {}, last active {}",
        view.displayed_streak,
        view.current_streak,
        view.longest_streak,
        view
          .last_activity_date
          .map(|d| d.to_string())
          .unwrap_or_else(|| "never".into()),
      );
    }
    Command::Watch { challenge_id, interval } => {
      watch(queue, client, challenge_id, Duration::from_secs(interval.max(1))).await?;
    }
  }

  Ok(())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn drain_if_online(queue: &Queue, client: &ApiClient) {
  if client.ping().await {
    print_report(&queue.process_queue().await);
  } else {
    println!("server unreachable; {} action(s) waiting", queue.pending_count());
  }
}

fn print_report(report: &DrainReport) {
  if report.skipped {
    println!("another sync is already running");
    return;
  }
  println!(
    "sent {}: {} ok, {} failed, {} still queued",
    report.processed, report.succeeded, report.failed, report.remaining
  );
  if let Some(reason) = &report.deferred {
    println!("  stopped early ({reason}); run `pacer login <user-id>` to send the rest");
  }
  for failure in &report.failures {
    println!(
      "  gave up on {} ({}): {}",
      failure.action.id,
      failure.action.kind(),
      failure.error
    );
  }
}

async fn print_leaderboard(client: &ApiClient, challenge_id: Uuid) -> Result<()> {
  let standings = client.leaderboard(challenge_id).await?;
  if standings.is_empty() {
    println!("no participants yet");
  }
  for s in standings {
    println!("{:>3}. {}  {}", s.rank, s.user_id, s.current_progress);
  }
  Ok(())
}

// ─── Watch mode ───────────────────────────────────────────────────────────────

async fn watch(
  queue: Arc<Queue>,
  client: ApiClient,
  challenge_id: Uuid,
  interval: Duration,
) -> Result<()> {
  let online = client.ping().await;
  let monitor = Arc::new(ConnectivityMonitor::new(queue.clone(), online));
  let throttle = Arc::new(ChangeThrottle::<String>::default());
  let board_key = format!("leaderboard:{challenge_id}");

  throttle.on_change(board_key.clone(), {
    let client = client.clone();
    move |_| {
      let client = client.clone();
      tokio::spawn(async move {
        if let Err(e) = print_leaderboard(&client, challenge_id).await {
          tracing::warn!(error = %e, "leaderboard refresh failed");
        }
      });
    }
  });

  // Our own applied writes are change hints too.
  let applied_sub = queue.on_applied({
    let throttle = Arc::clone(&throttle);
    move |action| {
      if let ActionPayload::LogActivity(a) = &action.payload {
        throttle.notify(format!("leaderboard:{}", a.challenge_id));
      }
    }
  });
  let failed_sub = queue.on_failed(|failure| {
    println!(
      "gave up on {} ({}): {}",
      failure.action.id,
      failure.action.kind(),
      failure.error
    );
  });

  let (events, rx) = mpsc::channel(16);
  let listener = Arc::clone(&monitor).spawn_listener(rx);

  if online {
    print_report(&queue.process_queue().await);
    throttle.notify(board_key.clone());
  } else {
    println!("server unreachable; waiting for it to come back");
  }

  let mut ticker = tokio::time::interval(interval);
  ticker.tick().await;
  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let up = client.ping().await;
        if events.send(up).await.is_err() {
          break;
        }
        if up {
          throttle.notify(board_key.clone());
        }
      }
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  queue.unsubscribe(applied_sub);
  queue.unsubscribe(failed_sub);
  throttle.cancel_all();
  drop(events);
  listener.await.context("connectivity listener panicked")?;
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
