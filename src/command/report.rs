use crate::Context;
use crate::Error;
use poise::serenity_prelude as serenity;
use tracing::{error, info};
use warden::{ExportError, Participant};

/// Export the last seconds of a participant's voice as a WAV file
#[poise::command(prefix_command, slash_command, guild_only)]
pub async fn report(
    ctx: Context<'_>,
    #[description = "Participant to report"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?;

    // Queue the export before deferring so it covers audio up to this moment
    let pending = {
        let sessions = ctx.data().active_sessions.lock().await;
        sessions
            .get(&guild_id.get())
            .map(|session| session.evidence.request_report(Participant::Remote(user.id.get())))
    };

    let Some(pending) = pending else {
        ctx.say("No monitoring is active on this guild. Use `/start-monitoring` first.")
            .await?;
        return Ok(());
    };

    ctx.defer().await?;

    match pending.await {
        Ok(file) => {
            info!(
                "Report on {} by {}: {:?}",
                user.id,
                ctx.author().id,
                file.path
            );
            let attachment = serenity::CreateAttachment::path(&file.path).await?;
            ctx.send(
                poise::CreateReply::default()
                    .content(format!(
                        "📎 Evidence for <@{}>: {:.1}s captured at {}",
                        user.id,
                        file.duration.as_secs_f64(),
                        file.captured_at.format("%Y-%m-%d %H:%M:%S UTC")
                    ))
                    .attachment(attachment),
            )
            .await?;
        }
        Err(ExportError::MissingBuffer(_)) => {
            ctx.say(format!("No audio buffered for <@{}> yet.", user.id))
                .await?;
        }
        Err(e) => {
            error!("Evidence export for {} failed: {}", user.id, e);
            ctx.say(format!("Failed to write evidence file: {}", e))
                .await?;
        }
    }

    Ok(())
}
