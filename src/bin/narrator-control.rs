//! narrator-control - CLI control utility for the lucid-narrator daemon
//!
//! A command-line interface for interacting with the narrator via D-Bus.

use clap::{Parser, Subcommand};
use lucid_narrator::service::{BUS_NAME, OBJECT_PATH};
use zbus::blocking::{Connection, Proxy};

/// CLI control utility for the lucid-narrator daemon
#[derive(Parser)]
#[command(name = "narrator-control")]
#[command(version)]
#[command(about = "Control utility for the Lucid narration daemon", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Speak text, replacing anything currently playing
    Speak {
        /// Text to speak
        text: String,
        /// Wait until the narration finishes
        #[arg(short, long)]
        wait: bool,
    },

    /// Stop the current narration
    Cancel,

    /// Fetch narration audio ahead of time
    Prefetch {
        /// Text to prefetch
        text: String,
    },

    /// Prefetch every scene of a lesson, optionally narrating them in order
    Scenes {
        /// Scene narrations, in lesson order
        #[arg(required = true)]
        narrations: Vec<String>,
        /// Narrate the scenes after prefetching
        #[arg(short, long)]
        narrate: bool,
    },

    /// Abort all background prefetches
    CancelPrefetches,

    /// Show cache and playback status
    Status,

    /// Drop all cached narration audio
    ClearCache,

    /// Check service health
    Ping,

    /// Get daemon version
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let conn = Connection::session()?;

    let dest = BUS_NAME;
    let path = OBJECT_PATH;
    let iface = BUS_NAME;

    match cli.command {
        Commands::Speak { text, wait } => {
            // Subscribe before speaking so a quick finish is not missed.
            let proxy = Proxy::new(&conn, dest, path, iface)?;
            let signals = if wait {
                Some(proxy.receive_signal("SpeechFinished")?)
            } else {
                None
            };

            let generation: u64 = conn
                .call_method(Some(dest), path, Some(iface), "Speak", &text)?
                .body()
                .deserialize()?;
            println!("Speaking (#{}): {}", generation, text);

            if let Some(signals) = signals {
                for msg in signals {
                    let (finished, outcome, detail): (u64, String, String) =
                        msg.body().deserialize()?;
                    if finished != generation {
                        continue;
                    }
                    if detail.is_empty() {
                        println!("Finished: {}", outcome);
                    } else {
                        println!("Finished: {} ({})", outcome, detail);
                    }
                    break;
                }
            }
        }

        Commands::Cancel => {
            let _: () = conn
                .call_method(Some(dest), path, Some(iface), "CancelSpeech", &())?
                .body()
                .deserialize()?;
            println!("Narration cancelled");
        }

        Commands::Prefetch { text } => {
            let issued: bool = conn
                .call_method(Some(dest), path, Some(iface), "PrefetchSpeech", &text)?
                .body()
                .deserialize()?;
            if issued {
                println!("Prefetching: {}", text);
            } else {
                println!("Already cached or pending");
            }
        }

        Commands::Scenes {
            narrations,
            narrate,
        } => {
            if narrate {
                let lesson: u64 = conn
                    .call_method(Some(dest), path, Some(iface), "NarrateScenes", &narrations)?
                    .body()
                    .deserialize()?;
                println!("Narrating {} scenes (lesson #{})", narrations.len(), lesson);
            } else {
                let _: () = conn
                    .call_method(
                        Some(dest),
                        path,
                        Some(iface),
                        "PrefetchAllScenes",
                        &narrations,
                    )?
                    .body()
                    .deserialize()?;
                println!("Prefetching {} scenes", narrations.len());
            }
        }

        Commands::CancelPrefetches => {
            let cancelled: u32 = conn
                .call_method(Some(dest), path, Some(iface), "CancelAllPrefetches", &())?
                .body()
                .deserialize()?;
            println!("Cancelled {} prefetches", cancelled);
        }

        Commands::Status => {
            let (cached, capacity, pending, state): (u32, u32, u32, String) = conn
                .call_method(Some(dest), path, Some(iface), "GetCacheStatus", &())?
                .body()
                .deserialize()?;

            let version: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVersion", &())?
                .body()
                .deserialize()?;

            println!("Lucid Narrator Status");
            println!("─────────────────────");
            println!("Version:    {}", version);
            println!("Playback:   {}", state);
            println!("Cached:     {}/{}", cached, capacity);
            println!("Pending:    {}", pending);
        }

        Commands::ClearCache => {
            let _: () = conn
                .call_method(Some(dest), path, Some(iface), "ClearCache", &())?
                .body()
                .deserialize()?;
            println!("Cache cleared");
        }

        Commands::Ping => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "Ping", &())?
                .body()
                .deserialize()?;
            println!("{}", result);
        }

        Commands::Version => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVersion", &())?
                .body()
                .deserialize()?;
            println!("lucid-narrator {}", result);
        }
    }

    Ok(())
}
