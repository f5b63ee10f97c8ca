mod compose;
mod config;
mod debug;
mod demo;
mod email;
mod engine;
mod gesture;
mod mail_service;
mod notice;
mod optimistic;
mod session;
mod shell;
mod worker;

use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use config::Config;
use demo::DemoMailService;
use mail_service::{HttpMailService, MailService};
use session::{Intent, Session, SessionSettings};

const DEMO_USER: &str = "demo";

/// Command-line flags
struct Args {
    demo: bool,
    debug: bool,
    user: Option<String>,
    api: Option<String>,
}

fn parse_args() -> Args {
    let args: Vec<String> = env::args().collect();

    let value_of = |flag: &str| {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    };

    Args {
        demo: args.iter().any(|a| a == "--demo"),
        debug: args.iter().any(|a| a == "--debug"),
        user: value_of("--user"),
        api: value_of("--api"),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = parse_args();
    debug::init(args.debug)?;

    let mut config = Config::load()?;
    if let Some(api) = args.api {
        config.api_base_url = api;
    }
    if let Some(user) = &args.user {
        config
            .save_user_id(user)
            .context("Failed to remember user id")?;
    }

    let settings = SessionSettings {
        engine: config.engine_settings(),
        swipe: config.swipe_settings(),
        search_debounce: config.search_debounce(),
    };

    if args.demo {
        let user_id = config.user_id.unwrap_or_else(|| DEMO_USER.to_string());
        return run(Arc::new(DemoMailService::new()), user_id, settings).await;
    }

    let Some(user_id) = config.user_id.clone() else {
        eprintln!(
            "Error: No user configured.\n\
             Run with --user <id> once (it is saved to {:?}),\n\
             or try the offline demo with --demo.",
            config::config_path()?
        );
        std::process::exit(1);
    };

    info!(api = %config.api_base_url, "using mail backend");
    run(
        Arc::new(HttpMailService::new(config.api_base_url.as_str())),
        user_id,
        settings,
    )
    .await
}

/// Runs the session and the line shell until `quit` or end of input
async fn run<S: MailService + 'static>(
    service: Arc<S>,
    user_id: String,
    settings: SessionSettings,
) -> Result<()> {
    let (session, mut snapshots) = Session::new(service, user_id, settings);
    let (intents, intent_rx) = mpsc::channel::<Intent>(64);
    let session_task = tokio::spawn(session.run(intent_rx));

    println!("{}", shell::HELP);

    let printer = {
        let mut snapshots = snapshots.clone();
        tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                let text = shell::render(&snapshots.borrow_and_update());
                println!("\n{text}");
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read input")? {
        if line.trim() == "help" {
            println!("{}", shell::HELP);
            continue;
        }

        let parsed = shell::parse_command(&line, &snapshots.borrow_and_update());
        match parsed {
            Ok(batch) => {
                let quit = batch.contains(&Intent::Shutdown);
                for intent in batch {
                    if intents.send(intent).await.is_err() {
                        break;
                    }
                }
                if quit {
                    break;
                }
            }
            Err(e) => eprintln!("{e}"),
        }
    }

    let _ = intents.send(Intent::Shutdown).await;
    session_task.await.context("Session task failed")?;
    printer.abort();
    Ok(())
}
