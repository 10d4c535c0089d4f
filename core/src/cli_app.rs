use crate::config::Config;
use crate::error::SyncError;
use crate::local_cache::LocalCache;
use crate::message::Message;
use crate::ordering::{OrderMode, ThreadView, ViewState};
use crate::remote::RemoteClient;
use crate::room::Room;
use crate::session_state::SessionState;
use crate::sync::SyncReport;
use colored::*;

/// Shared CLI implementation for the `roomsync` binary.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("roomsync")
        .to_string();

    let (config, rest) = Config::from_args(args.get(1..).unwrap_or(&[]))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let Some(command) = rest.first() else {
        print_usage(&bin);
        return Ok(());
    };

    if command == "rooms" {
        return list_rooms(&config);
    }

    let Some(room_name) = rest.get(1) else {
        eprintln!("{}", format!("Usage: {} {} <room> ...", bin, command).yellow());
        return Ok(());
    };
    let extra = &rest[2..];

    match command.as_str() {
        "sync" => {
            let room = open_room(&config, room_name).await?;
            let report = room.refresh().await?;
            print_report(room_name, &report);
        }
        "show" => {
            let room = open_room(&config, room_name).await?;
            if let Err(e) = room.refresh().await {
                eprintln!("{} {} (showing cached threads)", "!".yellow().bold(), e.to_string().yellow());
            }
            let (view, expand) = parse_view_args(extra)?;
            for id in expand {
                room.toggle_thread(id).await;
            }
            room.session().set_view_state(room_name, view).await;
            print_threads(room_name, &room.threads().await);
        }
        "post" => {
            let (reply_to, text) = parse_post_args(extra)?;
            if text.is_empty() {
                eprintln!(
                    "{}",
                    format!("Usage: {} post <room> [--reply-to <id>] <message>", bin).yellow()
                );
                return Ok(());
            }
            let room = open_room(&config, room_name).await?;
            let ack = room.post(reply_to, &text).await;
            println!("{} {}", "→".cyan().bold(), ack.trim());
        }
        "watch" => {
            let room = open_room(&config, room_name).await?;
            println!(
                "{} Watching {} every {:?} (Ctrl+C to stop)",
                "⚡".bright_cyan(),
                room_name.cyan(),
                config.poll_interval
            );
            let shutdown = async {
                let _ = tokio::signal::ctrl_c().await;
            };
            room.watch(shutdown, |report| {
                if report.changed() {
                    print_report(room_name, report);
                }
            })
            .await;
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

async fn open_room(config: &Config, name: &str) -> anyhow::Result<Room<RemoteClient>> {
    let cache = LocalCache::new(&config.data_dir)?;
    let server = RemoteClient::new(config)?;
    Ok(Room::open(name, server, cache, SessionState::new(), config).await?)
}

fn parse_view_args(args: &[String]) -> anyhow::Result<(ViewState, Vec<u64>)> {
    let mut view = ViewState::default();
    let mut expand = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--search" => {
                view.search_text = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--search requires a value"))?
                    .clone();
                i += 2;
            }
            "--oldest-first" => {
                view.order_mode = OrderMode::OldestFirst;
                i += 1;
            }
            "--expand" => {
                let id = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("--expand requires a thread id"))?;
                expand.push(id.parse()?);
                i += 2;
            }
            other => anyhow::bail!("Unknown option for show: {}", other),
        }
    }
    Ok((view, expand))
}

fn parse_post_args(args: &[String]) -> anyhow::Result<(Option<u64>, String)> {
    match args.first().map(|s| s.as_str()) {
        Some("--reply-to") => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("--reply-to requires a thread id"))?
                .parse::<u64>()?;
            Ok((Some(id), args.get(2..).unwrap_or(&[]).join(" ")))
        }
        _ => Ok((None, args.join(" "))),
    }
}

fn print_usage(bin: &str) {
    println!("{}", "⚡ RoomSync".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} [--server <url>] [--data-dir <path>] <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <room>                               Run one sync cycle", "sync".cyan());
    println!(
        "  {} <room> [--search <text>] [--oldest-first] [--expand <id>]  Show threads",
        "show".cyan()
    );
    println!(
        "  {} <room> [--reply-to <id>] <message>    Start a thread or reply",
        "post".cyan()
    );
    println!("  {} <room>                              Poll until Ctrl+C", "watch".cyan());
    println!("  {}                                     List visited rooms", "rooms".cyan());
}

fn list_rooms(config: &Config) -> anyhow::Result<()> {
    let cache = LocalCache::new(&config.data_dir)?;
    let rooms = cache.rooms()?;
    if rooms.is_empty() {
        println!("{}", "No rooms visited yet".yellow());
        return Ok(());
    }
    println!("{}", format!("Visited Rooms ({})", rooms.len()).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    for room in rooms {
        let count = cache.count(&room.name).unwrap_or(0);
        println!(
            "  {} {} messages, last visit {}",
            room.name.cyan(),
            count.to_string().green(),
            room.last_visit.dimmed()
        );
    }
    Ok(())
}

fn print_report(room: &str, report: &SyncReport) {
    let prefix = if report.invalidated {
        format!("{} {} reset by server,", "↺".yellow().bold(), room.cyan())
    } else {
        format!("{} {}", "✓".green().bold(), room.cyan())
    };
    println!(
        "{} {} received, {} new threads, {} new replies",
        prefix,
        report.received,
        report.build.threads_added.to_string().green(),
        report.build.replies_attached.to_string().green()
    );
    for dangling in &report.build.dangling {
        let err = SyncError::from(dangling.clone());
        eprintln!("  {} {}", "!".yellow().bold(), err.to_string().yellow());
    }
}

fn print_threads(room: &str, threads: &[ThreadView]) {
    if threads.is_empty() {
        println!("{}", format!("No threads in {}", room).yellow());
        return;
    }
    println!("{}", format!("{} ({} threads)", room, threads.len()).bright_cyan().bold());
    println!("{}", "─".repeat(60).dimmed());
    for thread in threads {
        let hits = if thread.match_count > 0 {
            format!(" [{} matches]", thread.match_count).magenta().to_string()
        } else {
            String::new()
        };
        println!(
            "{} {}{}",
            format!("#{}", thread.id).cyan().bold(),
            format_message(&thread.first_message),
            hits
        );
        if thread.expanded {
            for reply in &thread.replies {
                println!("    {} {}", "↳".dimmed(), format_message(reply));
            }
        } else if !thread.replies.is_empty() {
            println!("    {}", format!("{} replies", thread.replies.len()).dimmed());
        }
    }
}

fn format_message(msg: &Message) -> String {
    let when = chrono::DateTime::from_timestamp_millis(msg.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| msg.timestamp.to_string());
    format!("{} {}", when.dimmed(), msg.content)
}
