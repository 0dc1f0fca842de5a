use chrono::Utc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};

use crate::app::{App, EditRequest};
use crate::cli::Command;
use crate::config::Config;
use crate::filter::Filter;
use crate::notify::DesktopNotifier;
use crate::reminder::{SWEEP_INTERVAL, Scheduler};
use crate::render::Renderer;
use crate::store::TaskStore;

#[instrument(skip(store, cfg, command))]
pub async fn dispatch(command: Option<Command>, cfg: &Config, store: TaskStore) -> anyhow::Result<()> {
    let now = Utc::now();
    let (fired_tx, fired_rx) = mpsc::unbounded_channel();
    let scheduler = Scheduler::new(fired_tx);
    let notifier = Box::new(DesktopNotifier::request(cfg));
    let renderer = Renderer::new(cfg)?;
    let mut app = App::initialize(store, scheduler, notifier, renderer, now);

    let command = command.unwrap_or(Command::List { filter: None });
    debug!(?command, "dispatching command");

    match command {
        Command::Add {
            text,
            priority,
            due,
            notes,
        } => {
            let id = app.add(
                &text.join(" "),
                priority.unwrap_or_default(),
                due.as_deref().unwrap_or(""),
                notes.as_deref().unwrap_or(""),
                now,
            )?;
            println!("Created task {id}.");
        }

        Command::List { filter } => {
            let filter = match filter {
                Some(filter) => filter,
                None => default_filter(cfg),
            };
            app.set_filter(filter, now)?;
        }

        Command::Edit {
            id,
            text,
            priority,
            due,
            notes,
        } => {
            let request = EditRequest {
                text,
                priority,
                due,
                notes,
            };
            if app.edit(id, request, now)? {
                println!("Modified task {id}.");
            } else {
                println!("No task {id}.");
            }
        }

        Command::Done { id } => match app.toggle_complete(id, now)? {
            Some(true) => println!("Completed task {id}."),
            Some(false) => println!("Reactivated task {id}."),
            None => println!("No task {id}."),
        },

        Command::Delete { id } => {
            if app.delete(id, now)? {
                println!("Deleted task {id}.");
            } else {
                println!("No task {id}.");
            }
        }

        Command::Clear => {
            let removed = app.clear_completed(now)?;
            println!("Cleared {removed} completed task(s).");
        }

        Command::Watch => watch(&mut app, fired_rx).await?,
    }

    app.teardown();
    Ok(())
}

fn default_filter(cfg: &Config) -> Filter {
    let Some(raw) = cfg.get("default.filter") else {
        return Filter::All;
    };
    match raw.parse::<Filter>() {
        Ok(filter) => filter,
        Err(err) => {
            warn!(value = %raw, error = %err, "invalid default.filter; using all");
            Filter::All
        }
    }
}

/// Foreground reminder engine: per-task timers fire ids through the
/// channel, and the fixed-interval sweep re-arms whatever the direct
/// path could not cover. Runs until interrupted.
async fn watch(app: &mut App, mut fired: UnboundedReceiver<u64>) -> anyhow::Result<()> {
    info!("watching for due reminders");
    app.refresh(Utc::now())?;

    let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval's first tick is immediate and initialize already swept.
    sweep.tick().await;

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                app.sweep_all(Utc::now());
            }
            Some(id) = fired.recv() => {
                app.deliver_due_reminder(id, Utc::now());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; shutting down");
                break;
            }
        }
    }

    Ok(())
}
