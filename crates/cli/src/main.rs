mod client;
mod sse;
mod watch;

use clap::{Parser, Subcommand};
use client::{ChatClient, SessionContext};
use chat_core::{Role, ThreadId, UserId};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watch::format_message;

#[derive(Parser)]
#[command(name = "chat")]
#[command(about = "Clinic chat client")]
struct Cli {
    /// Base URL of the chat server
    #[arg(long, env = "CHAT_URL", default_value = "http://localhost:3000")]
    url: String,
    /// User id to act as
    #[arg(long, env = "CHAT_USER_ID")]
    user: Option<String>,
    /// Role of the user: patient, doctor or admin
    #[arg(long, env = "CHAT_USER_ROLE")]
    role: Option<String>,
    /// Shared API key
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check server health and storage reachability
    Health,
    /// List your threads, most recent first
    Threads,
    /// Open (or create) the thread with a counterpart
    Open {
        /// Counterpart user id
        counterpart: String,
    },
    /// Read the messages of a thread
    Messages {
        /// Thread id
        thread_id: String,
        /// Only messages after this message id
        #[arg(long)]
        after: Option<String>,
        /// Page size
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Send a message
    Send {
        /// Thread id
        thread_id: String,
        /// Message text
        text: Option<String>,
        /// Attachment URL
        #[arg(long)]
        attachment: Option<String>,
    },
    /// Show pre- and post-therapy notifications
    Notifications,
    /// Follow live events, optionally viewing one thread
    Watch {
        /// Thread to keep open
        #[arg(long)]
        thread: Option<String>,
    },
}

impl Cli {
    fn session(&self) -> anyhow::Result<SessionContext> {
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--user or CHAT_USER_ID is required"))?;
        let role = self
            .role
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("--role or CHAT_USER_ROLE is required"))?;
        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--api-key or API_KEY is required"))?;

        Ok(SessionContext {
            base_url: self.url.clone(),
            user_id: UserId::parse(user)?,
            role: role.parse::<Role>()?,
            api_key,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chat_cli=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let Some(command) = cli.command.as_ref() else {
        println!("No command given. Try `chat --help`.");
        return Ok(());
    };

    if let Commands::Health = command {
        let client = ChatClient::new(SessionContext {
            base_url: cli.url.clone(),
            user_id: UserId::parse("anonymous")?,
            role: Role::Patient,
            api_key: String::new(),
        });
        match client.health().await {
            Ok(health) if health.storage_reachable => println!("online: {}", health.message),
            Ok(_) => println!("offline: server storage unreachable"),
            Err(e) => println!("offline: {}", e),
        }
        return Ok(());
    }

    let client = ChatClient::new(cli.session()?);

    match command {
        Commands::Health => {}
        Commands::Threads => {
            let res = client.threads().await?;
            if res.threads.is_empty() {
                println!("No threads found.");
            }
            for thread in res.threads {
                let name = thread
                    .counterpart
                    .display_name
                    .unwrap_or_else(|| thread.counterpart.id.clone());
                println!(
                    "{}  {} ({})  last activity {}",
                    thread.thread_id, name, thread.counterpart.role, thread.last_activity_at
                );
            }
        }
        Commands::Open { counterpart } => {
            let res = client.open_thread(counterpart).await?;
            println!("{}", res.thread_id);
        }
        Commands::Messages {
            thread_id,
            after,
            limit,
        } => {
            let res = client
                .messages(thread_id, after.as_deref(), *limit)
                .await?;
            for message in &res.messages {
                println!("{}", format_message(message));
            }
            if let Some(next) = res.next_after {
                println!("-- more: --after {}", next);
            }
        }
        Commands::Send {
            thread_id,
            text,
            attachment,
        } => {
            let res = client
                .send(thread_id, text.clone(), attachment.clone())
                .await?;
            if let Some(last) = res.messages.last() {
                println!("{}", format_message(last));
            }
        }
        Commands::Notifications => {
            let res = client.notifications().await?;
            println!("Upcoming:");
            for n in &res.pre {
                println!(
                    "  {} with {} at {}",
                    n.therapy.as_deref().unwrap_or("appointment"),
                    n.counterpart_id,
                    n.at
                );
            }
            println!("Follow-ups:");
            for n in &res.post {
                println!(
                    "  {} with {} completed {}",
                    n.therapy.as_deref().unwrap_or("appointment"),
                    n.counterpart_id,
                    n.at
                );
            }
        }
        Commands::Watch { thread } => {
            let active = match thread {
                Some(raw) => Some(ThreadId::parse(raw)?),
                None => None,
            };
            tracing::debug!(user = %client.context().user_id, "starting watch");
            watch::run(&client, active).await?;
        }
    }

    Ok(())
}
