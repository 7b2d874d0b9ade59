use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use serenity::{
    async_trait,
    model::{gateway::GatewayIntents, gateway::Ready, voice::VoiceState},
    prelude::*,
    Client,
};
use songbird::{driver::DecodeMode, Config, SerenityInit};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use dotenvy::dotenv;

use warden::voice::VoiceTap;
use warden::{EvidenceConfig, EvidenceSession};

mod command;

use command::*;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// A voice channel the bot is currently monitoring.
pub struct MonitoringSession {
    pub started_by: u64,
    pub guild_id: u64,
    pub channel_id: u64,
    pub evidence: EvidenceSession,
    pub tap: Arc<VoiceTap>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl MonitoringSession {
    pub fn duration(&self) -> chrono::Duration {
        chrono::Utc::now() - self.started_at
    }
}

pub struct Data {
    pub active_sessions: Mutex<HashMap<u64, MonitoringSession>>,
    pub config: EvidenceConfig,
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => panic!("Failed to start bot: {:?}", error),
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {:?}", ctx.command().name, error);
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {}", e)
            }
        }
    }
}

/// Keeps the monitoring set in step with who is in the monitored channel.
async fn on_voice_state(data: &Data, state: &VoiceState) {
    let Some(guild_id) = state.guild_id else {
        return;
    };
    let user_id = state.user_id.get();

    let sessions = data.active_sessions.lock().await;
    let Some(session) = sessions.get(&guild_id.get()) else {
        return;
    };

    if state.channel_id.map(|id| id.get()) == Some(session.channel_id) {
        info!("User {} joined monitored channel {}", user_id, session.channel_id);
        session.evidence.on_participant_joined(user_id, false);
    } else {
        session.evidence.on_participant_left(user_id);
        session.tap.forget_user(user_id);
    }
}

async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::VoiceStateUpdate { new, .. } = event {
        on_voice_state(data, new).await;
    }
    Ok(())
}

struct Handler;

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: serenity::Context, ready: Ready) {
        info!("Logged in as {}", ready.user.name);
        info!("Connected to {} guilds", ready.guilds.len());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info")),
        )
        .init();

    let config = EvidenceConfig::from_env().context("Invalid evidence configuration")?;
    std::fs::create_dir_all(&config.export_dir)
        .with_context(|| format!("Failed to create {:?}", config.export_dir))?;
    info!(
        "Keeping {:?} of audio per participant, evidence goes to {:?}",
        config.window, config.export_dir
    );

    let options = poise::FrameworkOptions {
        commands: vec![
            start_monitoring(),
            stop_monitoring(),
            report(),
            evidence_status(),
        ],
        prefix_options: poise::PrefixFrameworkOptions {
            prefix: Some("/".into()),
            edit_tracker: Some(Arc::new(poise::EditTracker::for_timespan(
                Duration::from_secs(3600),
            ))),
            ..Default::default()
        },
        on_error: |error| Box::pin(on_error(error)),
        pre_command: |ctx| {
            Box::pin(async move {
                info!("Executing command {}...", ctx.command().qualified_name);
            })
        },
        event_handler: |ctx, event, framework, data| {
            Box::pin(event_handler(ctx, event, framework, data))
        },
        ..Default::default()
    };

    let token = std::env::var("DISCORD_TOKEN")
        .context("Set DISCORD_TOKEN environment variable")?;

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES;

    let framework = poise::Framework::builder()
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                if let Ok(guild_id_str) = std::env::var("GUILD_ID") {
                    if let Ok(guild_id) = guild_id_str.parse::<u64>() {
                        let guild_id = serenity::model::id::GuildId::new(guild_id);
                        poise::builtins::register_in_guild(ctx, &framework.options().commands, guild_id).await?;
                        info!("Registered commands for guild {}", guild_id);
                    } else {
                        error!("Invalid GUILD_ID format: {}", guild_id_str);
                    }
                }

                Ok(Data {
                    active_sessions: Mutex::new(HashMap::new()),
                    config,
                })
            })
        })
        .options(options)
        .build();

    let songbird_config = Config::default().decode_mode(DecodeMode::Decode);

    let mut client = Client::builder(token, intents)
        .event_handler(Handler)
        .framework(framework)
        .register_songbird_from_config(songbird_config)
        .await?;

    client.start().await?;
    Ok(())
}
