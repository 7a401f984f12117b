use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::process::Command;
use tracing::{debug, warn};

/// Audio players tried in order.
const PLAYERS: &[&str] = &["paplay", "aplay", "play", "mpg123", "mplayer"];

/// Longest we wait for a player to finish one sound.
const PLAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Plays the completion sound with whatever player the system has.
#[derive(Debug, Clone)]
pub struct SoundPlayer {
    path: PathBuf,
    players: Vec<String>,
}

impl SoundPlayer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            players: PLAYERS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_players(mut self, players: Vec<String>) -> Self {
        self.players = players;
        self
    }

    /// Play the sound and return the player that handled it.
    pub async fn play(&self) -> Result<String> {
        if !self.path.is_file() {
            bail!("Success sound file not found: {}", self.path.display());
        }

        for player in &self.players {
            let run = Command::new(player)
                .arg(&self.path)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .kill_on_drop(true)
                .status();

            match tokio::time::timeout(PLAY_TIMEOUT, run).await {
                Ok(Ok(status)) if status.success() => {
                    debug!(player = %player, "Played success sound");
                    return Ok(player.clone());
                }
                Ok(Ok(status)) => debug!(player = %player, %status, "Player failed, trying next"),
                Ok(Err(e)) if e.kind() == ErrorKind::NotFound => {
                    debug!(player = %player, "Player not installed")
                }
                Ok(Err(e)) => debug!(player = %player, error = %e, "Failed to start player"),
                Err(_) => debug!(player = %player, "Player timed out"),
            }
        }

        bail!("Could not play success sound: no suitable audio player found")
    }

    /// Play the sound, logging instead of failing.
    pub async fn play_best_effort(&self) {
        if let Err(e) = self.play().await {
            warn!(error = %e, "Success sound not played");
        }
    }
}
