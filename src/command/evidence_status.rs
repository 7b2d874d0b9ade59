use crate::Context;
use crate::Data;
use crate::Error;
use warden::Participant;
use warden::evidence::ManagerStatus;

/// Outer `None` when the guild has no session, inner `None` once its worker
/// has stopped. The session map is only locked while the handle is cloned.
pub(crate) async fn session_status(data: &Data, guild_id: u64) -> Option<Option<ManagerStatus>> {
    let manager = {
        let sessions = data.active_sessions.lock().await;
        sessions.get(&guild_id)?.evidence.manager().clone()
    };
    Some(manager.status().await)
}

/// Show who is monitored and how much audio is buffered for each participant
#[poise::command(prefix_command, slash_command, rename = "evidence-status", guild_only)]
pub async fn evidence_status(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command must be used in a guild")?;

    let Some(status) = session_status(ctx.data(), guild_id.get()).await else {
        ctx.say("No monitoring is active on this guild.").await?;
        return Ok(());
    };
    let Some(status) = status else {
        ctx.say("The evidence buffer has stopped.").await?;
        return Ok(());
    };

    let mut response = format!(
        "**Monitoring {} participant(s)**\n",
        status.monitored.len()
    );
    for buffer in &status.buffers {
        let who = match buffer.participant {
            Participant::Remote(user_id) => format!("<@{}>", user_id),
            Participant::Local => "local".to_string(),
        };
        response.push_str(&format!(
            "- {}: {:.1}s buffered ({} / {} bytes)\n",
            who,
            buffer.duration.as_secs_f64(),
            buffer.live_bytes,
            buffer.capacity
        ));
    }
    if status.buffers.is_empty() {
        response.push_str("No audio buffered yet.\n");
    }

    ctx.say(response).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MonitoringSession;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;
    use warden::voice::VoiceTap;
    use warden::{EvidenceConfig, EvidenceSession};

    fn data_with_session(guild_id: u64, config: EvidenceConfig) -> Data {
        let tap = Arc::new(VoiceTap::new());
        let evidence = EvidenceSession::start(&config, tap.clone(), None);
        evidence.on_session_started();
        evidence.on_participant_joined(7, false);

        let session = MonitoringSession {
            started_by: 1,
            guild_id,
            channel_id: 2,
            evidence,
            tap,
            started_at: chrono::Utc::now(),
        };
        Data {
            active_sessions: Mutex::new(HashMap::from([(guild_id, session)])),
            config,
        }
    }

    #[tokio::test]
    async fn test_status_does_not_hold_session_lock() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EvidenceConfig {
            export_dir: tmp.path().to_path_buf(),
            ..EvidenceConfig::default()
        };
        let data = data_with_session(42, config);

        let status = session_status(&data, 42);
        tokio::pin!(status);
        tokio::select! {
            biased;
            _ = &mut status => panic!("worker answered before it was polled"),
            _ = std::future::ready(()) => {}
        }
        assert!(data.active_sessions.try_lock().is_ok());

        let status = status.await.unwrap().unwrap();
        assert!(status.recording);
        assert_eq!(status.monitored, vec![7]);
    }

    #[tokio::test]
    async fn test_status_for_unmonitored_guild() {
        let tmp = tempfile::tempdir().unwrap();
        let config = EvidenceConfig {
            export_dir: tmp.path().to_path_buf(),
            ..EvidenceConfig::default()
        };
        let data = data_with_session(42, config);

        assert!(session_status(&data, 43).await.is_none());
    }
}
