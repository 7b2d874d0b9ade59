use crate::Context;
use crate::Error;
use crate::MonitoringSession;
use poise::serenity_prelude as serenity;
use songbird::CoreEvent;
use std::sync::Arc;
use tracing::{error, info};
use warden::EvidenceSession;
use warden::voice::VoiceTap;

async fn get_voice_channel(
    ctx: Context<'_>,
    guild_id: serenity::model::id::GuildId,
    user_id: serenity::model::id::UserId,
    channel: Option<serenity::model::channel::Channel>,
) -> Result<Option<serenity::model::id::ChannelId>, Error> {
    match channel {
        Some(serenity::model::channel::Channel::Guild(ch)) => {
            if ch.kind == serenity::model::channel::ChannelType::Voice {
                Ok(Some(ch.id))
            } else {
                ctx.say("The specified channel is not a voice channel!")
                    .await?;
                Ok(None)
            }
        }
        Some(_) => {
            ctx.say("Invalid channel type!").await?;
            Ok(None)
        }
        None => {
            let cache = &ctx.serenity_context().cache;
            let channel_id = cache.guild(guild_id).and_then(|guild| {
                guild
                    .voice_states
                    .get(&user_id)
                    .and_then(|vs| vs.channel_id)
            });
            match channel_id {
                Some(id) => Ok(Some(id)),
                None => {
                    ctx.say("You're not in a voice channel. Please join one or specify a channel: `/start-monitoring channel:#your-voice-channel`").await?;
                    Ok(None)
                }
            }
        }
    }
}

/// Join a voice channel and keep a rolling window of everyone's audio
#[poise::command(prefix_command, slash_command, rename = "start-monitoring", guild_only)]
pub async fn start_monitoring(
    ctx: Context<'_>,
    #[description = "Voice channel to monitor (leave empty to auto-detect)"] channel: Option<
        serenity::model::channel::Channel,
    >,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?;
    let guild_id_u64 = guild_id.get();
    let user_id = ctx.author().id;

    {
        let sessions = ctx.data().active_sessions.lock().await;
        if sessions.contains_key(&guild_id_u64) {
            ctx.say("Monitoring is already active on this guild.")
                .await?;
            return Ok(());
        }
    }

    let voice_channel_id = match get_voice_channel(ctx, guild_id, user_id, channel).await? {
        Some(id) => id,
        None => return Ok(()),
    };

    let manager = songbird::get(ctx.serenity_context())
        .await
        .ok_or("Songbird voice client not initialized")?
        .clone();

    let handler_lock = match manager.join(guild_id, voice_channel_id).await {
        Ok(handler) => handler,
        Err(e) => {
            error!("Failed to join voice channel: {:?}", e);
            ctx.say(format!("Failed to join voice channel: {:?}", e))
                .await?;
            return Ok(());
        }
    };

    info!(
        "Joined voice channel {} in guild {}",
        voice_channel_id, guild_id
    );

    let tap = Arc::new(VoiceTap::new());
    let evidence = EvidenceSession::start(&ctx.data().config, tap.clone(), None);
    evidence.on_session_started();

    {
        let mut handler = handler_lock.lock().await;
        handler.add_global_event(CoreEvent::SpeakingStateUpdate.into(), tap.receiver());
        handler.add_global_event(CoreEvent::VoiceTick.into(), tap.receiver());
    }

    let present: Vec<u64> = ctx
        .serenity_context()
        .cache
        .guild(guild_id)
        .map(|guild| {
            guild
                .voice_states
                .iter()
                .filter(|(_, vs)| vs.channel_id == Some(voice_channel_id))
                .map(|(uid, _)| uid.get())
                .collect()
        })
        .unwrap_or_default();
    for participant in &present {
        evidence.on_participant_joined(*participant, false);
    }

    let session = MonitoringSession {
        started_by: user_id.get(),
        guild_id: guild_id_u64,
        channel_id: voice_channel_id.get(),
        evidence,
        tap,
        started_at: chrono::Utc::now(),
    };

    {
        let mut sessions = ctx.data().active_sessions.lock().await;
        sessions.insert(guild_id_u64, session);
    }

    ctx.say(format!(
        "🛡️ **Monitoring started** in <#{}>\n\
        👥 Participants: {}\n\
        ⏪ Window: last {} seconds",
        voice_channel_id,
        present.len(),
        ctx.data().config.window.as_secs()
    ))
    .await?;

    Ok(())
}
