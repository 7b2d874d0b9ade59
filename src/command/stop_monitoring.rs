use crate::Context;
use crate::Error;
use tracing::{error, info};

fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Stop monitoring, forget all buffered audio and leave the voice channel
#[poise::command(prefix_command, slash_command, rename = "stop-monitoring", guild_only)]
pub async fn stop_monitoring(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?;
    let guild_id_u64 = guild_id.get();

    let session = {
        let mut sessions = ctx.data().active_sessions.lock().await;
        sessions.remove(&guild_id_u64)
    };

    let Some(session) = session else {
        ctx.say("No monitoring is active on this guild.").await?;
        return Ok(());
    };

    ctx.defer().await?;

    let duration = session.duration();
    session.evidence.teardown().await;

    let manager = songbird::get(ctx.serenity_context())
        .await
        .ok_or("Songbird voice client not initialized")?
        .clone();

    if let Err(e) = manager.remove(guild_id).await {
        error!("Failed to leave voice channel: {:?}", e);
    }

    info!(
        "Stopped monitoring guild {} (started by {})",
        session.guild_id, session.started_by
    );

    ctx.say(format!(
        "🛡️ **Monitoring stopped.** Buffered audio was discarded.\n\
        ⏱️ Duration: {}",
        format_duration(duration)
    ))
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(chrono::Duration::seconds(42)), "42s");
        assert_eq!(format_duration(chrono::Duration::seconds(125)), "2m 5s");
        assert_eq!(format_duration(chrono::Duration::seconds(3_725)), "1h 2m 5s");
    }
}
